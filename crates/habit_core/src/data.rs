use crate::freeze::FreezeLog;
use crate::habit::{Category, CategoryId, Habit, HabitId};
use crate::journal::Journal;
use crate::ledger::CompletionLedger;

/// Everything the application stores locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HabitData {
    pub habits: Vec<Habit>,
    pub categories: Vec<Category>,
    pub ledger: CompletionLedger,
    pub journal: Journal,
    pub freezes: FreezeLog,
}

impl HabitData {
    pub fn habit(&self, id: HabitId) -> Option<&Habit> {
        self.habits.iter().find(|habit| habit.id == id)
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    /// Habits in creation order.
    pub fn sort_habits(&mut self) {
        self.habits.sort_by_key(|h| (h.created_at, h.id));
    }
}
