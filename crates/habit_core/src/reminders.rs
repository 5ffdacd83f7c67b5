use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::habit::{Habit, HabitId};

/// A daily reminder for one habit, fired at `time` local.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRequest {
    pub habit_id: HabitId,
    pub title: String,
    pub body: String,
    pub time: NaiveTime,
}

impl ReminderRequest {
    /// `None` when the habit has no reminder time.
    pub fn for_habit(habit: &Habit) -> Option<Self> {
        let time = habit.reminder_time?;
        Some(Self {
            habit_id: habit.id,
            title: format!("Habit: {}", habit.title),
            body: format!(
                "Time to {} ({})",
                habit.title.to_lowercase(),
                time.format("%H:%M")
            ),
            time,
        })
    }
}

/// Platform-specific notification adapters will implement this trait.
pub trait ReminderSink: Send + Sync {
    fn schedule(&self, reminder: ReminderRequest);
    fn clear_for_habit(&self, habit_id: HabitId);
}
