use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

pub const MIN_MOOD: u8 = 1;
pub const MAX_MOOD: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: Uuid,
    pub date: NaiveDate,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn new<I, S>(
        date: NaiveDate,
        content: &str,
        mood: Option<u8>,
        tags: I,
    ) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let content = normalize_content(content)?;
        let mood = validate_mood(mood)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            date,
            content,
            mood,
            tags: normalize_tags(tags),
            created_at: now,
            updated_at: now,
        })
    }

    /// Checks an entry that did not come through [`JournalEntry::new`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.content.trim().is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        validate_mood(self.mood)?;
        Ok(())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag.trim().to_lowercase())
    }
}

fn normalize_content(content: &str) -> Result<String, ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    Ok(trimmed.to_string())
}

fn validate_mood(mood: Option<u8>) -> Result<Option<u8>, ValidationError> {
    match mood {
        Some(value) if !(MIN_MOOD..=MAX_MOOD).contains(&value) => {
            Err(ValidationError::InvalidMood(value))
        }
        other => Ok(other),
    }
}

pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Journal entries ordered by day, then by creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: JournalEntry) {
        let position = self
            .entries
            .partition_point(|existing| entry_order(existing) <= entry_order(&entry));
        self.entries.insert(position, entry);
    }

    /// Inserts or replaces the entry with the same id.
    pub fn upsert(&mut self, entry: JournalEntry) {
        self.entries.retain(|existing| existing.id != entry.id);
        self.add(entry);
    }

    pub fn update<I, S>(
        &mut self,
        id: Uuid,
        content: &str,
        mood: Option<u8>,
        tags: I,
    ) -> Result<&JournalEntry, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let content = normalize_content(content)?;
        let mood = validate_mood(mood)?;
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(ValidationError::UnknownEntry(id))?;
        entry.content = content;
        entry.mood = mood;
        entry.tags = normalize_tags(tags);
        entry.updated_at = Utc::now();
        Ok(entry)
    }

    pub fn remove(&mut self, id: Uuid) -> Option<JournalEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, id: Uuid) -> Option<&JournalEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_on(&self, day: NaiveDate) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter().filter(move |entry| entry.date == day)
    }

    pub fn entries_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Iterator<Item = &JournalEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.date >= start && entry.date <= end)
    }

    pub fn entries_with_tag<'a>(&'a self, tag: &str) -> impl Iterator<Item = &'a JournalEntry> {
        let tag = tag.trim().to_lowercase();
        self.entries
            .iter()
            .filter(move |entry| entry.tags.contains(&tag))
    }

    pub fn all_tags(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .flat_map(|entry| entry.tags.iter().cloned())
            .collect()
    }

    /// Mean mood of rated entries in `[start, end]`.
    pub fn average_mood(&self, start: NaiveDate, end: NaiveDate) -> Option<f64> {
        let moods: Vec<u8> = self
            .entries_between(start, end)
            .filter_map(|entry| entry.mood)
            .collect();
        if moods.is_empty() {
            return None;
        }
        let total: u32 = moods.iter().map(|mood| u32::from(*mood)).sum();
        Some(f64::from(total) / moods.len() as f64)
    }
}

fn entry_order(entry: &JournalEntry) -> (NaiveDate, DateTime<Utc>) {
    (entry.date, entry.created_at)
}

impl FromIterator<JournalEntry> for Journal {
    fn from_iter<I: IntoIterator<Item = JournalEntry>>(iter: I) -> Self {
        let mut journal = Self::new();
        for entry in iter {
            journal.add(entry);
        }
        journal
    }
}
