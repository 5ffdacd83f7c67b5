use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use habit_core::error::{BackupError, CoreError};
use habit_core::{HabitService, RestoreMode};

pub const DEFAULT_RETENTION: usize = 7;

const FILE_PREFIX: &str = "habits-";
const FILE_EXTENSION: &str = "json";
const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const STAMP_LEN: usize = "YYYYMMDD-HHMMSS".len();

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutoBackupSchedule {
    #[default]
    Never,
    Daily,
    Weekly,
}

impl FromStr for AutoBackupSchedule {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "never" | "none" | "off" => Ok(AutoBackupSchedule::Never),
            "daily" => Ok(AutoBackupSchedule::Daily),
            "weekly" => Ok(AutoBackupSchedule::Weekly),
            other => Err(format!("unknown backup schedule `{other}`")),
        }
    }
}

impl AutoBackupSchedule {
    /// Whether a backup is owed, comparing local calendar days or ISO weeks.
    pub fn is_due(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        self.is_due_in(&Local, last, now)
    }

    fn is_due_in<Tz: TimeZone>(
        &self,
        tz: &Tz,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(last) = last else {
            return *self != AutoBackupSchedule::Never;
        };
        let last = last.with_timezone(tz).date_naive();
        let now = now.with_timezone(tz).date_naive();
        match self {
            AutoBackupSchedule::Never => false,
            AutoBackupSchedule::Daily => last != now,
            AutoBackupSchedule::Weekly => last.iso_week() != now.iso_week(),
        }
    }
}

/// A backup file found in the backup directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Orders backups written within the same second; `0` for the first.
    pub sequence: u32,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupJob {
    pub kind: BackupJobKind,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackupJobKind {
    Manual,
    Scheduled,
    Prune,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub kind: BackupJobKind,
    pub entry: Option<BackupEntry>,
    pub pruned: usize,
}

impl BackupReport {
    pub fn written(kind: BackupJobKind, entry: BackupEntry, pruned: usize) -> Self {
        Self {
            kind,
            entry: Some(entry),
            pruned,
        }
    }

    pub fn pruned(pruned: usize) -> Self {
        Self {
            kind: BackupJobKind::Prune,
            entry: None,
            pruned,
        }
    }
}

/// Owns the backup directory: writing, listing, pruning and restoring snapshots.
#[derive(Debug)]
pub struct BackupManager {
    dir: PathBuf,
    retention: usize,
    schedule: AutoBackupSchedule,
    last_backup_at: Option<DateTime<Utc>>,
    pending_jobs: VecDeque<BackupJob>,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retention: DEFAULT_RETENTION,
            schedule: AutoBackupSchedule::Never,
            last_backup_at: None,
            pending_jobs: VecDeque::new(),
        }
    }

    /// Keeps at least one backup whatever is asked for.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn with_schedule(mut self, schedule: AutoBackupSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn schedule(&self) -> AutoBackupSchedule {
        self.schedule
    }

    pub fn last_backup_at(&self) -> Option<DateTime<Utc>> {
        self.last_backup_at
    }

    /// Seeds the schedule from the newest backup already on disk.
    pub fn refresh_last_backup(&mut self) {
        if let Ok(entries) = self.list_backups() {
            self.last_backup_at = entries.first().map(|entry| entry.created_at);
        }
    }

    /// Writes a snapshot of `service` as `habits-YYYYMMDD-HHMMSS.json`, then prunes.
    #[instrument(skip(self, service), fields(dir = %self.dir.display()))]
    pub fn create_backup(
        &mut self,
        service: &HabitService,
        now: DateTime<Utc>,
    ) -> Result<BackupEntry, BackupError> {
        let bytes = service.export_snapshot().to_bytes()?;
        if let Err(source) = fs::create_dir_all(&self.dir) {
            return Err(BackupError::WriteFailed {
                path: self.dir.clone(),
                source,
            });
        }

        let (path, sequence) = self.next_backup_path(now)?;
        write_atomic(&path, &bytes)?;
        self.last_backup_at = Some(now);
        info!(path = %path.display(), bytes = bytes.len(), "backup written");

        let pruned = self.prune()?;
        if pruned > 0 {
            debug!(pruned, "old backups removed");
        }
        Ok(BackupEntry {
            path,
            created_at: now,
            sequence,
            size_bytes: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
        })
    }

    /// Backups in the directory, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>, BackupError> {
        if !self.dir.is_dir() {
            return Err(BackupError::DirectoryNotFound(self.dir.clone()));
        }
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, "skipping unreadable backup entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some((created_at, sequence)) = parse_backup_name(entry.path()) else {
                continue;
            };
            let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            entries.push(BackupEntry {
                path: entry.into_path(),
                created_at,
                sequence,
                size_bytes,
            });
        }
        entries.sort_by(|a, b| {
            (b.created_at, b.sequence)
                .cmp(&(a.created_at, a.sequence))
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(entries)
    }

    /// Deletes backups beyond the retention count and returns how many went.
    pub fn prune(&self) -> Result<usize, BackupError> {
        let entries = self.list_backups()?;
        let mut removed = 0;
        for entry in entries.iter().skip(self.retention) {
            fs::remove_file(&entry.path)?;
            removed += 1;
        }
        Ok(removed)
    }

    #[instrument(skip(self, service))]
    pub fn restore_latest(
        &self,
        service: &HabitService,
        mode: RestoreMode,
    ) -> Result<BackupEntry, CoreError> {
        let latest = self
            .list_backups()?
            .into_iter()
            .next()
            .ok_or_else(|| BackupError::NoBackups(self.dir.clone()))?;
        self.restore_file(service, &latest.path, mode)?;
        Ok(latest)
    }

    /// Restores from any snapshot file; the service is unchanged on failure.
    #[instrument(skip(self, service, path), fields(path = %path.as_ref().display()))]
    pub fn restore_file(
        &self,
        service: &HabitService,
        path: impl AsRef<Path>,
        mode: RestoreMode,
    ) -> Result<(), CoreError> {
        let bytes = fs::read(path.as_ref()).map_err(BackupError::from)?;
        service.restore_from_backup(&bytes, mode)?;
        info!(?mode, "backup restored");
        Ok(())
    }

    pub fn request_backup(&mut self, now: DateTime<Utc>) {
        self.pending_jobs.push_back(BackupJob {
            kind: BackupJobKind::Manual,
            requested_at: now,
        });
    }

    pub fn request_prune(&mut self, now: DateTime<Utc>) {
        self.pending_jobs.push_back(BackupJob {
            kind: BackupJobKind::Prune,
            requested_at: now,
        });
    }

    /// Queues a scheduled backup when one is owed and none is pending.
    pub fn schedule_if_due(&mut self, now: DateTime<Utc>) -> bool {
        self.schedule_if_due_in(&Local, now)
    }

    fn schedule_if_due_in<Tz: TimeZone>(&mut self, tz: &Tz, now: DateTime<Utc>) -> bool {
        let already_queued = self
            .pending_jobs
            .iter()
            .any(|job| job.kind == BackupJobKind::Scheduled);
        if already_queued || !self.schedule.is_due_in(tz, self.last_backup_at, now) {
            return false;
        }
        self.pending_jobs.push_back(BackupJob {
            kind: BackupJobKind::Scheduled,
            requested_at: now,
        });
        true
    }

    pub fn dequeue_job(&mut self) -> Option<BackupJob> {
        self.pending_jobs.pop_front()
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending_jobs.len()
    }

    #[instrument(skip(self, service))]
    pub fn perform_job(
        &mut self,
        job: BackupJob,
        service: &HabitService,
        now: DateTime<Utc>,
    ) -> Result<BackupReport, BackupError> {
        match job.kind {
            BackupJobKind::Manual | BackupJobKind::Scheduled => {
                let entry = self.create_backup(service, now)?;
                Ok(BackupReport::written(job.kind, entry, 0))
            }
            BackupJobKind::Prune => Ok(BackupReport::pruned(self.prune()?)),
        }
    }

    /// Picks a name one sequence past every backup already stamped with `now`'s second.
    fn next_backup_path(&self, now: DateTime<Utc>) -> Result<(PathBuf, u32), BackupError> {
        let stamp = now.format(STAMP_FORMAT).to_string();
        let sequence = self
            .list_backups()?
            .iter()
            .filter(|entry| entry.created_at.format(STAMP_FORMAT).to_string() == stamp)
            .map(|entry| entry.sequence.saturating_add(1))
            .max()
            .unwrap_or(0);
        let name = if sequence == 0 {
            format!("{FILE_PREFIX}{stamp}.{FILE_EXTENSION}")
        } else {
            format!("{FILE_PREFIX}{stamp}-{sequence}.{FILE_EXTENSION}")
        };
        Ok((self.dir.join(name), sequence))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BackupError> {
    let tmp = path.with_extension("tmp");
    let write = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    write.map_err(|source| {
        let _ = fs::remove_file(&tmp);
        BackupError::WriteFailed {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Timestamp and same-second sequence encoded in a backup file name.
///
/// Accepts `habits-YYYYMMDD-HHMMSS.json` and `habits-YYYYMMDD-HHMMSS-N.json`;
/// anything else is a foreign file and yields `None`.
fn parse_backup_name(path: &Path) -> Option<(DateTime<Utc>, u32)> {
    if path.extension()?.to_str()? != FILE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix(FILE_PREFIX)?;
    let stamp = rest.get(..STAMP_LEN)?;
    let sequence = match rest.get(STAMP_LEN..)? {
        "" => 0,
        suffix => {
            let digits = suffix.strip_prefix('-')?;
            if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
                return None;
            }
            digits.parse().ok()?
        }
    };
    let created_at = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .ok()?
        .and_utc();
    Some((created_at, sequence))
}
