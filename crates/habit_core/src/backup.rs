use std::collections::HashSet;
use std::hash::Hash;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::data::HabitData;
use crate::error::BackupError;
use crate::freeze::StreakFreeze;
use crate::habit::{Category, Habit, HabitId};
use crate::journal::JournalEntry;
use crate::ledger::Completion;

/// The only snapshot layout this build reads and writes.
pub const BACKUP_VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub habits: Vec<Habit>,
    #[serde(default)]
    pub categories: Vec<Category>,
    pub completions: Vec<Completion>,
    pub journal_entries: Vec<JournalEntry>,
    pub streak_freezes: Vec<StreakFreeze>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestoreMode {
    /// Discard current state in favour of the snapshot.
    #[default]
    Replace,
    /// Merge by id; snapshot records win on collision.
    Merge,
}

pub fn export_snapshot(data: &HabitData) -> BackupSnapshot {
    BackupSnapshot {
        version: BACKUP_VERSION,
        timestamp: Utc::now(),
        habits: data.habits.clone(),
        categories: data.categories.clone(),
        completions: data.ledger.iter().cloned().collect(),
        journal_entries: data.journal.iter().cloned().collect(),
        streak_freezes: data.freezes.iter().cloned().collect(),
    }
}

impl BackupSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, BackupError> {
        serde_json::to_vec_pretty(self).map_err(BackupError::Encode)
    }

    pub fn into_data(self) -> HabitData {
        let mut data = HabitData {
            habits: self.habits,
            categories: self.categories,
            ledger: self.completions.into_iter().collect(),
            journal: self.journal_entries.into_iter().collect(),
            freezes: self.streak_freezes.into_iter().collect(),
        };
        data.sort_habits();
        data
    }
}

/// Parses and validates a snapshot document without applying it.
pub fn decode_snapshot(bytes: &[u8]) -> Result<BackupSnapshot, BackupError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| BackupError::MalformedFormat(err.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(BackupError::MalformedFormat(
            "top level is not an object".to_string(),
        ));
    };

    match object.get("version").map(Value::as_i64) {
        Some(Some(BACKUP_VERSION)) => {}
        Some(Some(other)) => return Err(BackupError::UnsupportedVersion(Some(other))),
        Some(None) | None => return Err(BackupError::UnsupportedVersion(None)),
    }

    let snapshot: BackupSnapshot = serde_json::from_value(value)
        .map_err(|err| BackupError::MalformedFormat(err.to_string()))?;
    check_consistency(&snapshot)?;
    Ok(snapshot)
}

/// Decodes `bytes` and produces the state that should replace `current`.
///
/// `current` is never modified, so a failed restore leaves it intact.
pub fn restore_from_backup(
    bytes: &[u8],
    current: &HabitData,
    mode: RestoreMode,
) -> Result<HabitData, BackupError> {
    let snapshot = decode_snapshot(bytes)?;
    let restored = match mode {
        RestoreMode::Replace => snapshot.into_data(),
        RestoreMode::Merge => {
            let merged = merge(current.clone(), snapshot);
            validate_data(&merged)?;
            merged
        }
    };
    info!(
        ?mode,
        habits = restored.habits.len(),
        completions = restored.ledger.len(),
        journal_entries = restored.journal.len(),
        streak_freezes = restored.freezes.len(),
        "restored backup"
    );
    Ok(restored)
}

fn merge(mut data: HabitData, snapshot: BackupSnapshot) -> HabitData {
    for habit in snapshot.habits {
        match data
            .habits
            .iter_mut()
            .find(|existing| existing.id == habit.id)
        {
            Some(existing) => *existing = habit,
            None => data.habits.push(habit),
        }
    }
    for category in snapshot.categories {
        match data
            .categories
            .iter_mut()
            .find(|existing| existing.id == category.id)
        {
            Some(existing) => *existing = category,
            None => data.categories.push(category),
        }
    }
    for completion in snapshot.completions {
        data.ledger.remove_by_id(completion.id);
        if let Some(displaced) = data.ledger.insert(completion) {
            warn!(
                habit_id = %displaced.habit_id,
                day = %displaced.date,
                "merge replaced a completion recorded for the same day"
            );
        }
    }
    for entry in snapshot.journal_entries {
        data.journal.upsert(entry);
    }
    for freeze in snapshot.streak_freezes {
        data.freezes.upsert(freeze);
    }
    data.sort_habits();
    data
}

/// Applies the snapshot consistency rules to in-memory state.
pub fn validate_data(data: &HabitData) -> Result<(), BackupError> {
    check_consistency(&export_snapshot(data))
}

fn check_consistency(snapshot: &BackupSnapshot) -> Result<(), BackupError> {
    let habit_ids = unique_ids(snapshot.habits.iter().map(|habit| habit.id), "habit")?;
    let category_ids = unique_ids(
        snapshot.categories.iter().map(|category| category.id),
        "category",
    )?;
    unique_ids(
        snapshot.completions.iter().map(|completion| completion.id),
        "completion",
    )?;
    unique_ids(
        snapshot.journal_entries.iter().map(|entry| entry.id),
        "journal entry",
    )?;
    unique_ids(
        snapshot.streak_freezes.iter().map(|freeze| freeze.id),
        "streak freeze",
    )?;

    for habit in &snapshot.habits {
        if habit.title.trim().is_empty() {
            return Err(corrupted(format!("habit {} has an empty title", habit.id)));
        }
        if let Some(category_id) = habit.category_id {
            if !category_ids.contains(&category_id) {
                return Err(corrupted(format!(
                    "habit {} references unknown category {}",
                    habit.id, category_id
                )));
            }
        }
    }

    let mut days: HashSet<(HabitId, NaiveDate)> = HashSet::new();
    for completion in &snapshot.completions {
        if !habit_ids.contains(&completion.habit_id) {
            return Err(corrupted(format!(
                "completion {} references unknown habit {}",
                completion.id, completion.habit_id
            )));
        }
        if !days.insert((completion.habit_id, completion.date)) {
            return Err(corrupted(format!(
                "habit {} has more than one completion on {}",
                completion.habit_id, completion.date
            )));
        }
    }

    for entry in &snapshot.journal_entries {
        if let Err(err) = entry.validate() {
            return Err(corrupted(format!("journal entry {}: {err}", entry.id)));
        }
    }

    for freeze in &snapshot.streak_freezes {
        if !habit_ids.contains(&freeze.habit_id) {
            return Err(corrupted(format!(
                "streak freeze {} references unknown habit {}",
                freeze.id, freeze.habit_id
            )));
        }
    }
    Ok(())
}

fn unique_ids<T, I>(ids: I, kind: &str) -> Result<HashSet<T>, BackupError>
where
    T: Eq + Hash + std::fmt::Display,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    for id in ids {
        if seen.contains(&id) {
            return Err(corrupted(format!("duplicate {kind} id {id}")));
        }
        seen.insert(id);
    }
    Ok(seen)
}

fn corrupted(message: String) -> BackupError {
    BackupError::CorruptedData(message)
}
