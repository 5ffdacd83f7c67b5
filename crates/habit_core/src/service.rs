use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::backup::{self, BackupSnapshot, RestoreMode};
use crate::data::HabitData;
use crate::error::{BackupError, FreezeError, Result, ValidationError};
use crate::freeze::{FreezeLog, StreakFreeze};
use crate::habit::{Category, CategoryId, Habit, HabitId};
use crate::journal::{Journal, JournalEntry};
use crate::ledger::CompletionLedger;
use crate::reminders::{ReminderRequest, ReminderSink};
use crate::streak::{self, CompletionRate, HabitStats};

/// Habits, their categories and the completion ledger share one guard.
#[derive(Debug, Default)]
struct HabitStore {
    habits: Vec<Habit>,
    categories: Vec<Category>,
    ledger: CompletionLedger,
}

impl HabitStore {
    fn habit(&self, id: HabitId) -> Result<&Habit, ValidationError> {
        self.habits
            .iter()
            .find(|habit| habit.id == id)
            .ok_or(ValidationError::UnknownHabit(id))
    }
}

/// In-memory aggregate store for all habit data.
///
/// Habits are kept in creation order. Guards are always taken in the order
/// habits, journal, freezes.
pub struct HabitService {
    store: RwLock<HabitStore>,
    journal: RwLock<Journal>,
    freezes: RwLock<FreezeLog>,
    reminder_sink: Option<Box<dyn ReminderSink>>,
}

pub struct HabitServiceBuilder {
    data: HabitData,
    reminder_sink: Option<Box<dyn ReminderSink>>,
}

impl Default for HabitServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HabitServiceBuilder {
    pub fn new() -> Self {
        Self {
            data: HabitData::default(),
            reminder_sink: None,
        }
    }

    pub fn with_data(mut self, data: HabitData) -> Self {
        self.data = data;
        self
    }

    pub fn with_reminder_sink(mut self, sink: Box<dyn ReminderSink>) -> Self {
        self.reminder_sink = Some(sink);
        self
    }

    /// Fails with [`BackupError::CorruptedData`] when the initial data is inconsistent.
    pub fn build(self) -> Result<HabitService, BackupError> {
        backup::validate_data(&self.data)?;
        let mut data = self.data;
        data.sort_habits();
        let service = HabitService {
            store: RwLock::new(HabitStore {
                habits: data.habits,
                categories: data.categories,
                ledger: data.ledger,
            }),
            journal: RwLock::new(data.journal),
            freezes: RwLock::new(data.freezes),
            reminder_sink: self.reminder_sink,
        };
        service.schedule_all_reminders();
        Ok(service)
    }
}

impl HabitService {
    pub fn builder() -> HabitServiceBuilder {
        HabitServiceBuilder::new()
    }

    // Commands

    #[instrument(skip(self, habit), fields(habit_id = %habit.id))]
    pub fn add_habit(&self, habit: Habit) -> Result<Habit> {
        let mut store = self.store.write();
        if let Some(category_id) = habit.category_id {
            if !store.categories.iter().any(|c| c.id == category_id) {
                return Err(ValidationError::UnknownCategory(category_id).into());
            }
        }
        if store.habits.iter().any(|existing| existing.id == habit.id) {
            debug!("replacing habit with the same id");
            store.habits.retain(|existing| existing.id != habit.id);
        }
        store.habits.push(habit.clone());
        store.habits.sort_by_key(|h| (h.created_at, h.id));
        drop(store);

        info!(title = %habit.title, "habit added");
        self.schedule_reminder(&habit);
        Ok(habit)
    }

    #[instrument(skip(self))]
    pub fn rename_habit(&self, habit_id: HabitId, title: &str) -> Result<Habit> {
        let mut store = self.store.write();
        let habit = store
            .habits
            .iter_mut()
            .find(|habit| habit.id == habit_id)
            .ok_or(ValidationError::UnknownHabit(habit_id))?;
        habit.rename(title)?;
        Ok(habit.clone())
    }

    /// Removes the habit along with its completions and freezes.
    #[instrument(skip(self))]
    pub fn delete_habit(&self, habit_id: HabitId) -> Result<Habit> {
        let mut store = self.store.write();
        let index = store
            .habits
            .iter()
            .position(|habit| habit.id == habit_id)
            .ok_or(ValidationError::UnknownHabit(habit_id))?;
        let habit = store.habits.remove(index);
        let completions = store.ledger.remove_habit(habit_id);
        let freezes = self.freezes.write().remove_habit(habit_id);
        drop(store);

        info!(completions, freezes, "habit deleted");
        if let Some(sink) = &self.reminder_sink {
            sink.clear_for_habit(habit_id);
        }
        Ok(habit)
    }

    pub fn add_category(&self, name: &str, color: &str) -> Result<Category> {
        let category = Category::new(name, color)?;
        self.store.write().categories.push(category.clone());
        info!(category_id = %category.id, name = %category.name, "category added");
        Ok(category)
    }

    /// Deletes a category; habits that referenced it become uncategorised.
    pub fn delete_category(&self, category_id: CategoryId) -> Result<Category> {
        let mut store = self.store.write();
        let index = store
            .categories
            .iter()
            .position(|category| category.id == category_id)
            .ok_or(ValidationError::UnknownCategory(category_id))?;
        let category = store.categories.remove(index);
        for habit in store
            .habits
            .iter_mut()
            .filter(|habit| habit.category_id == Some(category_id))
        {
            habit.category_id = None;
        }
        Ok(category)
    }

    /// Flips the completion for `(habit, day)` and returns the new state.
    #[instrument(skip(self))]
    pub fn toggle(&self, habit_id: HabitId, day: NaiveDate) -> Result<bool> {
        let mut store = self.store.write();
        store.habit(habit_id)?;
        Ok(store.ledger.toggle(habit_id, day))
    }

    pub fn set_completed(&self, habit_id: HabitId, day: NaiveDate, completed: bool) -> Result<()> {
        let mut store = self.store.write();
        store.habit(habit_id)?;
        store.ledger.set_completed(habit_id, day, completed);
        Ok(())
    }

    /// Spends a freeze on `day`. Completed days need no protection.
    #[instrument(skip(self, reason))]
    pub fn use_freeze(
        &self,
        habit_id: HabitId,
        day: NaiveDate,
        reason: &str,
        today: NaiveDate,
    ) -> Result<StreakFreeze> {
        let store = self.store.read();
        let habit = store
            .habits
            .iter()
            .find(|habit| habit.id == habit_id)
            .ok_or(FreezeError::UnknownHabit(habit_id))?;
        if store.ledger.is_completed(habit_id, day) {
            return Err(FreezeError::AlreadyCovered(day).into());
        }
        let freeze = self.freezes.write().use_freeze(habit, day, reason, today)?;
        Ok(freeze)
    }

    pub fn refund_freeze(&self, freeze_id: Uuid) -> Result<StreakFreeze> {
        let freeze = self.freezes.write().refund_freeze(freeze_id)?;
        info!(%freeze_id, habit_id = %freeze.habit_id, "streak freeze refunded");
        Ok(freeze)
    }

    pub fn add_journal_entry<I, S>(
        &self,
        date: NaiveDate,
        content: &str,
        mood: Option<u8>,
        tags: I,
    ) -> Result<JournalEntry>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = JournalEntry::new(date, content, mood, tags)?;
        self.journal.write().add(entry.clone());
        debug!(entry_id = %entry.id, %date, "journal entry added");
        Ok(entry)
    }

    pub fn update_journal_entry<I, S>(
        &self,
        entry_id: Uuid,
        content: &str,
        mood: Option<u8>,
        tags: I,
    ) -> Result<JournalEntry>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut journal = self.journal.write();
        let entry = journal.update(entry_id, content, mood, tags)?;
        Ok(entry.clone())
    }

    pub fn delete_journal_entry(&self, entry_id: Uuid) -> Result<JournalEntry> {
        let entry = self
            .journal
            .write()
            .remove(entry_id)
            .ok_or(ValidationError::UnknownEntry(entry_id))?;
        Ok(entry)
    }

    /// Decodes `bytes` and swaps the result in; on error nothing changes.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn restore_from_backup(&self, bytes: &[u8], mode: RestoreMode) -> Result<()> {
        let mut store = self.store.write();
        let mut journal = self.journal.write();
        let mut freezes = self.freezes.write();

        let current = HabitData {
            habits: store.habits.clone(),
            categories: store.categories.clone(),
            ledger: store.ledger.clone(),
            journal: journal.clone(),
            freezes: freezes.clone(),
        };
        let restored = backup::restore_from_backup(bytes, &current, mode)?;

        let previous: Vec<HabitId> = store.habits.iter().map(|habit| habit.id).collect();
        *store = HabitStore {
            habits: restored.habits,
            categories: restored.categories,
            ledger: restored.ledger,
        };
        *journal = restored.journal;
        *freezes = restored.freezes;
        drop(freezes);
        drop(journal);
        drop(store);

        if let Some(sink) = &self.reminder_sink {
            for habit_id in previous {
                sink.clear_for_habit(habit_id);
            }
        }
        self.schedule_all_reminders();
        Ok(())
    }

    // Queries

    pub fn habits(&self) -> Vec<Habit> {
        self.store.read().habits.clone()
    }

    pub fn habit(&self, habit_id: HabitId) -> Option<Habit> {
        self.store.read().habit(habit_id).ok().cloned()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.store.read().categories.clone()
    }

    pub fn is_completed(&self, habit_id: HabitId, day: NaiveDate) -> bool {
        self.store.read().ledger.is_completed(habit_id, day)
    }

    /// Share of all habits completed on `day`.
    pub fn completion_rate(&self, day: NaiveDate) -> CompletionRate {
        let store = self.store.read();
        store.ledger.completion_rate(&store.habits, day)
    }

    pub fn current_streak(&self, habit_id: HabitId, today: NaiveDate) -> Result<u32> {
        let store = self.store.read();
        let habit = store.habit(habit_id)?;
        let freezes = self.freezes.read();
        let current = streak::current_streak(habit, &store.ledger, &freezes, today);
        Ok(current)
    }

    pub fn best_streak(&self, habit_id: HabitId) -> Result<u32> {
        let store = self.store.read();
        let habit = store.habit(habit_id)?;
        let freezes = self.freezes.read();
        Ok(streak::best_streak(habit, &store.ledger, &freezes))
    }

    pub fn period_completion_rate(
        &self,
        habit_id: HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CompletionRate> {
        let store = self.store.read();
        let habit = store.habit(habit_id)?;
        let rate = streak::period_completion_rate(habit, &store.ledger, start, end)?;
        Ok(rate)
    }

    pub fn available_freezes(&self, habit_id: HabitId, today: NaiveDate) -> Result<u8> {
        let store = self.store.read();
        let habit = store
            .habits
            .iter()
            .find(|habit| habit.id == habit_id)
            .ok_or(FreezeError::UnknownHabit(habit_id))?;
        Ok(self.freezes.read().available_freezes(habit, today))
    }

    pub fn freezes_for(&self, habit_id: HabitId) -> Vec<StreakFreeze> {
        self.freezes.read().for_habit(habit_id).cloned().collect()
    }

    pub fn habit_stats(&self, habit_id: HabitId, today: NaiveDate) -> Result<HabitStats> {
        let store = self.store.read();
        let habit = store.habit(habit_id)?;
        let freezes = self.freezes.read();
        Ok(streak::summarize(habit, &store.ledger, &freezes, today))
    }

    /// One-line history per habit, `days` characters wide.
    pub fn history_graph(
        &self,
        habit_id: HabitId,
        days: usize,
        today: NaiveDate,
    ) -> Result<String> {
        let store = self.store.read();
        let habit = store.habit(habit_id)?;
        let freezes = self.freezes.read();
        let graph = streak::history_graph(habit, &store.ledger, &freezes, days, today);
        Ok(graph)
    }

    pub fn journal_entries(&self) -> Vec<JournalEntry> {
        self.journal.read().iter().cloned().collect()
    }

    pub fn journal_entries_with_tag(&self, tag: &str) -> Vec<JournalEntry> {
        let journal = self.journal.read();
        journal.entries_with_tag(tag).cloned().collect()
    }

    pub fn export_snapshot(&self) -> BackupSnapshot {
        backup::export_snapshot(&self.data())
    }

    /// A consistent copy of everything the service holds.
    pub fn data(&self) -> HabitData {
        let store = self.store.read();
        let journal = self.journal.read();
        let freezes = self.freezes.read();
        HabitData {
            habits: store.habits.clone(),
            categories: store.categories.clone(),
            ledger: store.ledger.clone(),
            journal: journal.clone(),
            freezes: freezes.clone(),
        }
    }

    fn schedule_reminder(&self, habit: &Habit) {
        let Some(sink) = &self.reminder_sink else {
            return;
        };
        if let Some(request) = ReminderRequest::for_habit(habit) {
            debug!(habit_id = %habit.id, time = %request.time, "scheduling reminder");
            sink.schedule(request);
        }
    }

    fn schedule_all_reminders(&self) {
        if self.reminder_sink.is_none() {
            return;
        }
        for habit in self.habits() {
            self.schedule_reminder(&habit);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveTime;
    use parking_lot::Mutex;

    use super::*;
    use crate::error::CoreError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum SinkEvent {
        Scheduled(HabitId),
        Cleared(HabitId),
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<SinkEvent>>>,
    }

    impl ReminderSink for RecordingSink {
        fn schedule(&self, reminder: ReminderRequest) {
            let event = SinkEvent::Scheduled(reminder.habit_id);
            self.events.lock().push(event);
        }

        fn clear_for_habit(&self, habit_id: HabitId) {
            self.events.lock().push(SinkEvent::Cleared(habit_id));
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn service() -> HabitService {
        HabitService::builder().build().unwrap()
    }

    fn add(service: &HabitService, title: &str) -> Habit {
        service
            .add_habit(Habit::builder(title).created_on(day(1)).build().unwrap())
            .unwrap()
    }

    #[test]
    fn toggling_drives_streaks_and_rates() {
        let service = service();
        let run = add(&service, "Run");
        add(&service, "Read");

        for d in [1, 2, 3, 5] {
            assert!(service.toggle(run.id, day(d)).unwrap());
        }
        assert_eq!(service.current_streak(run.id, day(5)).unwrap(), 1);
        assert_eq!(service.best_streak(run.id).unwrap(), 3);
        assert_eq!(service.completion_rate(day(5)), CompletionRate::new(1, 2));
        let week = service.period_completion_rate(run.id, day(1), day(7));
        assert_eq!(week.unwrap(), CompletionRate::new(4, 7));

        assert!(!service.toggle(run.id, day(5)).unwrap());
        assert_eq!(service.current_streak(run.id, day(5)).unwrap(), 0);
    }

    #[test]
    fn unknown_habit_is_reported() {
        let service = service();
        let missing = Uuid::new_v4();
        assert!(matches!(
            service.toggle(missing, day(1)),
            Err(CoreError::Validation(ValidationError::UnknownHabit(id))) if id == missing
        ));
        assert!(matches!(
            service.use_freeze(missing, day(1), "", day(2)),
            Err(CoreError::Freeze(FreezeError::UnknownHabit(_)))
        ));
    }

    #[test]
    fn freeze_cannot_cover_a_completed_day() {
        let service = service();
        let run = add(&service, "Run");
        service.set_completed(run.id, day(9), true).unwrap();

        assert_eq!(service.available_freezes(run.id, day(10)).unwrap(), 1);
        assert!(matches!(
            service.use_freeze(run.id, day(9), "sick", day(10)),
            Err(CoreError::Freeze(FreezeError::AlreadyCovered(_)))
        ));

        let freeze = service.use_freeze(run.id, day(8), "sick", day(10)).unwrap();
        assert_eq!(service.available_freezes(run.id, day(10)).unwrap(), 0);
        assert_eq!(service.current_streak(run.id, day(9)).unwrap(), 2);

        service.refund_freeze(freeze.id).unwrap();
        assert_eq!(service.available_freezes(run.id, day(10)).unwrap(), 1);
        assert_eq!(service.current_streak(run.id, day(9)).unwrap(), 1);
    }

    #[test]
    fn delete_habit_cascades_and_clears_reminders() {
        let sink = RecordingSink::default();
        let service = HabitService::builder()
            .with_reminder_sink(Box::new(sink.clone()))
            .build()
            .unwrap();

        let time = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let walk = service
            .add_habit(
                Habit::builder("Walk")
                    .created_on(day(1))
                    .reminder(time)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let quiet = add(&service, "Floss");
        service.toggle(walk.id, day(4)).unwrap();
        service.use_freeze(walk.id, day(3), "rain", day(9)).unwrap();

        service.delete_habit(walk.id).unwrap();
        assert!(service.habit(walk.id).is_none());
        assert!(!service.is_completed(walk.id, day(4)));
        assert!(service.freezes_for(walk.id).is_empty());
        assert_eq!(service.habits(), vec![quiet]);
        assert_eq!(
            *sink.events.lock(),
            vec![SinkEvent::Scheduled(walk.id), SinkEvent::Cleared(walk.id)]
        );
    }

    #[test]
    fn categories_validate_and_detach_on_delete() {
        let service = service();
        let orphan = Habit::builder("Stretch")
            .category(Uuid::new_v4())
            .build()
            .unwrap();
        assert!(matches!(
            service.add_habit(orphan),
            Err(CoreError::Validation(ValidationError::UnknownCategory(_)))
        ));

        let health = service.add_category("Health", "green").unwrap();
        let stretch = Habit::builder("Stretch")
            .category(health.id)
            .build()
            .unwrap();
        let stretch = service.add_habit(stretch).unwrap();
        service.delete_category(health.id).unwrap();
        assert_eq!(service.habit(stretch.id).unwrap().category_id, None);
        assert!(service.categories().is_empty());
    }

    #[test]
    fn journal_commands_round_trip() {
        let service = service();
        let entry = service
            .add_journal_entry(day(2), "Long run", Some(4), ["Running"])
            .unwrap();
        let no_tags: [&str; 0] = [];
        let rejected = service.update_journal_entry(entry.id, "", None, no_tags);
        assert!(rejected.is_err());

        let updated = service
            .update_journal_entry(entry.id, "Long run, windy", Some(3), ["running"])
            .unwrap();
        assert_eq!(updated.content, "Long run, windy");
        assert_eq!(service.journal_entries_with_tag("RUNNING").len(), 1);

        service.delete_journal_entry(entry.id).unwrap();
        assert!(service.journal_entries().is_empty());
        assert!(service.delete_journal_entry(entry.id).is_err());
    }

    #[test]
    fn failed_restore_leaves_state_untouched() {
        let service = service();
        let run = add(&service, "Run");
        service.toggle(run.id, day(2)).unwrap();
        let before = service.data();

        assert!(matches!(
            service.restore_from_backup(b"not json", RestoreMode::Replace),
            Err(CoreError::Backup(BackupError::MalformedFormat(_)))
        ));
        let err = service
            .restore_from_backup(br#"{"version": 999}"#, RestoreMode::Replace)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Backup(BackupError::UnsupportedVersion(Some(999)))
        ));
        assert_eq!(service.data(), before);
    }

    #[test]
    fn restore_replaces_state_and_reschedules_reminders() {
        let sink = RecordingSink::default();
        let service = HabitService::builder()
            .with_reminder_sink(Box::new(sink.clone()))
            .build()
            .unwrap();
        let time = NaiveTime::from_hms_opt(21, 15, 0).unwrap();
        let read = service
            .add_habit(Habit::builder("Read").reminder(time).build().unwrap())
            .unwrap();
        service.toggle(read.id, day(3)).unwrap();
        let bytes = service.export_snapshot().to_bytes().unwrap();
        let saved = service.data();

        let extra = add(&service, "Extra");
        service.toggle(read.id, day(4)).unwrap();
        sink.events.lock().clear();

        service
            .restore_from_backup(&bytes, RestoreMode::Replace)
            .unwrap();
        assert_eq!(service.data(), saved);
        let events = sink.events.lock().clone();
        assert!(events.contains(&SinkEvent::Cleared(extra.id)));
        assert_eq!(events.last(), Some(&SinkEvent::Scheduled(read.id)));
    }

    #[test]
    fn builder_rejects_inconsistent_data() {
        let habit = Habit::builder("Run").build().unwrap();
        let mut data = HabitData::default();
        data.ledger.toggle(habit.id, day(1));
        assert!(matches!(
            HabitService::builder().with_data(data).build(),
            Err(BackupError::CorruptedData(_))
        ));
    }
}
