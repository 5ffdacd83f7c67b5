use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::habit::{Habit, HabitId};
use crate::streak::CompletionRate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub id: Uuid,
    pub habit_id: HabitId,
    pub date: NaiveDate,
    pub completed: bool,
}

impl Completion {
    pub fn new(habit_id: HabitId, date: NaiveDate, completed: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            habit_id,
            date,
            completed,
        }
    }
}

/// Per-habit, per-day completion records.
///
/// Keyed by `(habit, day)` so a day can never hold two records for one habit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionLedger {
    records: BTreeMap<(HabitId, NaiveDate), Completion>,
}

impl CompletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the record for `(habit, day)`, creating a completed one when absent.
    /// Returns the completed state after the toggle.
    pub fn toggle(&mut self, habit_id: HabitId, day: NaiveDate) -> bool {
        let record = self
            .records
            .entry((habit_id, day))
            .and_modify(|record| record.completed = !record.completed)
            .or_insert_with(|| Completion::new(habit_id, day, true));
        debug!(%habit_id, %day, completed = record.completed, "toggled completion");
        record.completed
    }

    pub fn set_completed(&mut self, habit_id: HabitId, day: NaiveDate, completed: bool) {
        self.records
            .entry((habit_id, day))
            .and_modify(|record| record.completed = completed)
            .or_insert_with(|| Completion::new(habit_id, day, completed));
    }

    pub fn is_completed(&self, habit_id: HabitId, day: NaiveDate) -> bool {
        self.records
            .get(&(habit_id, day))
            .map(|record| record.completed)
            .unwrap_or(false)
    }

    pub fn get(&self, habit_id: HabitId, day: NaiveDate) -> Option<&Completion> {
        self.records.get(&(habit_id, day))
    }

    /// Share of `habits` completed on `day`; zero when there are no habits.
    pub fn completion_rate(&self, habits: &[Habit], day: NaiveDate) -> CompletionRate {
        let completed = habits
            .iter()
            .filter(|habit| self.is_completed(habit.id, day))
            .count();
        CompletionRate::new(count_u32(completed), count_u32(habits.len()))
    }

    /// Records for one habit, ordered by day ascending.
    pub fn completions_for(&self, habit_id: HabitId) -> impl Iterator<Item = &Completion> {
        self.records
            .range((habit_id, NaiveDate::MIN)..=(habit_id, NaiveDate::MAX))
            .map(|(_, record)| record)
    }

    pub fn completed_days(&self, habit_id: HabitId) -> impl Iterator<Item = NaiveDate> + '_ {
        self.completions_for(habit_id)
            .filter(|record| record.completed)
            .map(|record| record.date)
    }

    pub fn completed_count(&self, habit_id: HabitId) -> usize {
        self.completed_days(habit_id).count()
    }

    /// Inserts a record, displacing any existing record for the same habit and day.
    pub fn insert(&mut self, completion: Completion) -> Option<Completion> {
        self.records
            .insert((completion.habit_id, completion.date), completion)
    }

    pub fn remove_by_id(&mut self, id: Uuid) -> Option<Completion> {
        let key = self
            .records
            .iter()
            .find(|(_, record)| record.id == id)
            .map(|(key, _)| *key)?;
        self.records.remove(&key)
    }

    pub fn remove_habit(&mut self, habit_id: HabitId) -> usize {
        let before = self.records.len();
        self.records.retain(|(owner, _), _| *owner != habit_id);
        before - self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Completion> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<Completion> for CompletionLedger {
    fn from_iter<I: IntoIterator<Item = Completion>>(iter: I) -> Self {
        let mut ledger = Self::new();
        for completion in iter {
            ledger.insert(completion);
        }
        ledger
    }
}

pub(crate) fn count_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}
