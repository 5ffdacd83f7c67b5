use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("habit title must not be empty")]
    EmptyTitle,
    #[error("category name must not be empty")]
    EmptyCategoryName,
    #[error("journal content must not be empty")]
    EmptyContent,
    #[error("mood must be between 1 and 5, got {0}")]
    InvalidMood(u8),
    #[error("`{0}` is not a valid YYYY-MM-DD date")]
    MalformedDate(String),
    #[error("period end {end} is before start {start}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },
    #[error("unknown habit `{0}`")]
    UnknownHabit(Uuid),
    #[error("unknown category `{0}`")]
    UnknownCategory(Uuid),
    #[error("unknown journal entry `{0}`")]
    UnknownEntry(Uuid),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FreezeError {
    #[error("no streak freezes available")]
    InsufficientFreezes,
    #[error("cannot freeze {day}, it is after {today}")]
    FutureDay { day: NaiveDate, today: NaiveDate },
    #[error("cannot freeze {day}, the habit was created on {created_on}")]
    BeforeCreation {
        day: NaiveDate,
        created_on: NaiveDate,
    },
    #[error("{0} is already completed or frozen")]
    AlreadyCovered(NaiveDate),
    #[error("unknown streak freeze `{0}`")]
    UnknownFreeze(Uuid),
    #[error("unknown habit `{0}`")]
    UnknownHabit(Uuid),
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup is not a readable snapshot document: {0}")]
    MalformedFormat(String),
    #[error("unsupported backup version {}", version_label(.0))]
    UnsupportedVersion(Option<i64>),
    #[error("backup data is inconsistent: {0}")]
    CorruptedData(String),
    #[error("failed to encode backup: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("backup directory `{}` does not exist", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("failed to write backup `{}`: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no backups found in `{}`", .0.display())]
    NoBackups(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Freeze(#[from] FreezeError),
    #[error(transparent)]
    Backup(#[from] BackupError),
}

fn version_label(version: &Option<i64>) -> String {
    match version {
        Some(version) => version.to_string(),
        None => "(missing)".to_string(),
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
