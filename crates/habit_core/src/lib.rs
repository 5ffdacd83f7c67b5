pub mod backup;
pub mod calendar;
pub mod data;
pub mod error;
pub mod export;
pub mod freeze;
pub mod habit;
pub mod journal;
pub mod ledger;
pub mod reminders;
pub mod service;
pub mod streak;

pub use crate::backup::{BackupSnapshot, RestoreMode};
pub use crate::data::HabitData;
pub use crate::error::{BackupError, CoreError, FreezeError, ValidationError};
pub use crate::habit::{Category, Habit, HabitId};
pub use crate::service::{HabitService, HabitServiceBuilder};
