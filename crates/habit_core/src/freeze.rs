use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::calendar;
use crate::error::FreezeError;
use crate::habit::{Habit, HabitId};

/// Most freezes a habit can hold at once.
pub const MAX_FREEZES: u8 = 3;
/// Days of elapsed time that regenerate one freeze.
pub const REGENERATION_DAYS: i64 = 7;

/// A day on which a habit's streak was protected instead of broken.
///
/// `used` freezes cover `date` and count against the pool from `used_on`.
/// A refunded freeze keeps its record with `used == false` and covers nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreakFreeze {
    pub id: Uuid,
    pub habit_id: HabitId,
    pub date: NaiveDate,
    pub reason: String,
    pub used: bool,
    pub used_on: NaiveDate,
}

impl StreakFreeze {
    pub fn used(
        habit_id: HabitId,
        date: NaiveDate,
        reason: impl Into<String>,
        used_on: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            habit_id,
            date,
            reason: reason.into(),
            used: true,
            used_on,
        }
    }
}

/// Rolling allowance replayed from a habit's freeze history.
///
/// The regeneration anchor starts at the creation day, moves forward seven
/// days per elapsed window, and resets to the consumption day on every use.
#[derive(Debug, Clone, Copy)]
struct Allowance {
    available: u8,
    anchor: NaiveDate,
}

impl Allowance {
    fn starting(anchor: NaiveDate) -> Self {
        Self {
            available: 0,
            anchor,
        }
    }

    fn accrue(&mut self, day: NaiveDate) {
        let elapsed = day.signed_duration_since(self.anchor).num_days();
        let windows = elapsed / REGENERATION_DAYS;
        if windows <= 0 {
            return;
        }
        let room = i64::from(MAX_FREEZES - self.available);
        let granted = windows.min(room);
        self.available += u8::try_from(granted).unwrap_or(0);
        self.anchor = calendar::add_days(self.anchor, windows * REGENERATION_DAYS).unwrap_or(day);
    }

    fn consume(&mut self, day: NaiveDate) {
        self.available = self.available.saturating_sub(1);
        self.anchor = self.anchor.max(day);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreezeLog {
    entries: Vec<StreakFreeze>,
}

impl FreezeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, freeze: StreakFreeze) {
        self.entries.push(freeze);
    }

    /// Inserts or replaces the freeze with the same id.
    pub fn upsert(&mut self, freeze: StreakFreeze) {
        match self.entries.iter_mut().find(|entry| entry.id == freeze.id) {
            Some(existing) => *existing = freeze,
            None => self.entries.push(freeze),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreakFreeze> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_habit(&self, habit_id: HabitId) -> impl Iterator<Item = &StreakFreeze> {
        self.entries
            .iter()
            .filter(move |entry| entry.habit_id == habit_id)
    }

    pub fn is_covered(&self, habit_id: HabitId, day: NaiveDate) -> bool {
        self.for_habit(habit_id)
            .any(|entry| entry.used && entry.date == day)
    }

    pub fn covered_days(&self, habit_id: HabitId) -> impl Iterator<Item = NaiveDate> + '_ {
        self.for_habit(habit_id)
            .filter(|entry| entry.used)
            .map(|entry| entry.date)
    }

    /// Freezes `habit` can spend on `today`, always within `0..=MAX_FREEZES`.
    pub fn available_freezes(&self, habit: &Habit, today: NaiveDate) -> u8 {
        let mut spent: Vec<NaiveDate> = self
            .for_habit(habit.id)
            .filter(|entry| entry.used && entry.used_on <= today)
            .map(|entry| entry.used_on)
            .collect();
        spent.sort_unstable();

        let mut allowance = Allowance::starting(habit.created_on());
        for day in spent {
            allowance.accrue(day);
            allowance.consume(day);
        }
        allowance.accrue(today);
        allowance.available
    }

    pub fn can_use_freeze(&self, habit: &Habit, today: NaiveDate) -> bool {
        self.available_freezes(habit, today) > 0
    }

    /// Spends one freeze to protect `day`. The log is untouched on failure.
    pub fn use_freeze(
        &mut self,
        habit: &Habit,
        day: NaiveDate,
        reason: &str,
        today: NaiveDate,
    ) -> Result<StreakFreeze, FreezeError> {
        if day > today {
            return Err(FreezeError::FutureDay { day, today });
        }
        if !habit.is_applicable_on(day) {
            return Err(FreezeError::BeforeCreation {
                day,
                created_on: habit.created_on(),
            });
        }
        if self.is_covered(habit.id, day) {
            return Err(FreezeError::AlreadyCovered(day));
        }
        let available = self.available_freezes(habit, today);
        if available == 0 {
            debug!(habit_id = %habit.id, %day, "freeze requested with empty pool");
            return Err(FreezeError::InsufficientFreezes);
        }
        let freeze = StreakFreeze::used(habit.id, day, reason.trim(), today);
        info!(
            habit_id = %habit.id,
            %day,
            remaining = available - 1,
            "streak freeze used"
        );
        self.entries.push(freeze.clone());
        Ok(freeze)
    }

    /// Returns a spent freeze to the pool; its day is no longer covered.
    pub fn refund_freeze(&mut self, freeze_id: Uuid) -> Result<StreakFreeze, FreezeError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == freeze_id)
            .ok_or(FreezeError::UnknownFreeze(freeze_id))?;
        entry.used = false;
        Ok(entry.clone())
    }

    pub fn remove_habit(&mut self, habit_id: HabitId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.habit_id != habit_id);
        before - self.entries.len()
    }
}

impl FromIterator<StreakFreeze> for FreezeLog {
    fn from_iter<I: IntoIterator<Item = StreakFreeze>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
