use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use habit_backup::BackupManager;
use habit_core::backup::decode_snapshot;
use habit_core::calendar;
use habit_core::export;
use habit_core::reminders::{ReminderRequest, ReminderSink};
use habit_core::{Habit, HabitData, HabitId, HabitService, RestoreMode};
use tracing::{debug, info, warn};

use crate::cli::{BackupAction, Cli, Command, JournalAction};
use crate::config::AppConfig;

/// Without a platform scheduler, reminders are only logged.
struct LogReminderSink;

impl ReminderSink for LogReminderSink {
    fn schedule(&self, reminder: ReminderRequest) {
        debug!(
            habit_id = %reminder.habit_id,
            time = %reminder.time,
            title = %reminder.title,
            "reminder registered"
        );
    }

    fn clear_for_habit(&self, habit_id: HabitId) {
        debug!(%habit_id, "reminders cleared");
    }
}

/// Loads the data file, runs commands against the service and persists changes.
pub struct HabitApp {
    config: AppConfig,
    service: HabitService,
    backups: BackupManager,
}

impl HabitApp {
    pub fn open(config: AppConfig) -> Result<Self> {
        let data = load_data(&config.data_file())?;
        let service = HabitService::builder()
            .with_data(data)
            .with_reminder_sink(Box::new(LogReminderSink))
            .build()
            .with_context(|| format!("invalid data in {}", config.data_file().display()))?;

        let mut backups = BackupManager::new(config.backup_dir())
            .with_retention(config.backup_retention())
            .with_schedule(config.auto_backup());
        backups.refresh_last_backup();

        Ok(Self {
            config,
            service,
            backups,
        })
    }

    pub fn service(&self) -> &HabitService {
        &self.service
    }

    pub fn save(&self) -> Result<()> {
        let path = self.config.data_file();
        let bytes = self
            .service
            .export_snapshot()
            .to_bytes()
            .context("failed to encode habit data")?;
        fs::create_dir_all(&self.config.data_dir)
            .with_context(|| format!("failed to create {}", self.config.data_dir.display()))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "data saved");
        Ok(())
    }

    /// Finds a habit by id or by case-insensitive title.
    pub fn resolve_habit(&self, key: &str) -> Result<Habit> {
        let key = key.trim();
        let habits = self.service.habits();
        if let Ok(id) = key.parse::<HabitId>() {
            if let Some(habit) = habits.iter().find(|habit| habit.id == id) {
                return Ok(habit.clone());
            }
        }
        let wanted = key.to_lowercase();
        let mut matches = habits
            .into_iter()
            .filter(|habit| habit.title.to_lowercase() == wanted);
        match (matches.next(), matches.next()) {
            (Some(habit), None) => Ok(habit),
            (Some(_), Some(_)) => bail!("more than one habit is titled `{key}`, use its id"),
            (None, _) => bail!("no habit matches `{key}`"),
        }
    }

    pub fn execute(
        &mut self,
        command: Command,
        today: NaiveDate,
        now: DateTime<Utc>,
        out: &mut impl Write,
    ) -> Result<()> {
        let dirty = match command {
            Command::Today => {
                self.print_today(today, out)?;
                false
            }
            Command::Add {
                title,
                icon,
                color,
                reminder,
            } => {
                let mut builder = Habit::builder(title);
                if let Some(icon) = icon {
                    builder = builder.icon(icon);
                }
                if let Some(color) = color {
                    builder = builder.color(color);
                }
                if let Some(time) = reminder {
                    builder = builder.reminder(time);
                }
                let habit = self.service.add_habit(builder.build()?)?;
                writeln!(out, "Added {} ({})", habit.title, habit.id)?;
                true
            }
            Command::Delete { habit } => {
                let habit = self.resolve_habit(&habit)?;
                self.service.delete_habit(habit.id)?;
                writeln!(out, "Deleted {}", habit.title)?;
                true
            }
            Command::Toggle { habit, date } => {
                let habit = self.resolve_habit(&habit)?;
                let day = date.unwrap_or(today);
                let completed = self.service.toggle(habit.id, day)?;
                let mark = if completed { "done" } else { "not done" };
                writeln!(
                    out,
                    "{} {} for {}",
                    habit.title,
                    mark,
                    calendar::relative_label(day, today)
                )?;
                true
            }
            Command::Stats { habit, from, to } => {
                let habit = self.resolve_habit(&habit)?;
                self.print_stats(&habit, from, to, today, out)?;
                false
            }
            Command::Freeze {
                habit,
                date,
                reason,
            } => {
                let habit = self.resolve_habit(&habit)?;
                self.service.use_freeze(habit.id, date, &reason, today)?;
                let left = self.service.available_freezes(habit.id, today)?;
                writeln!(
                    out,
                    "Froze {} on {} ({} left)",
                    habit.title,
                    calendar::format_day(date),
                    left
                )?;
                true
            }
            Command::Journal { action } => self.journal(action, today, out)?,
            Command::Export { format, out: path } => {
                let text = export::render(&self.service.export_snapshot(), format, today)?;
                match path {
                    Some(path) => {
                        fs::write(&path, text)
                            .with_context(|| format!("failed to write {}", path.display()))?;
                        writeln!(out, "Exported to {}", path.display())?;
                    }
                    None => write!(out, "{text}")?,
                }
                false
            }
            Command::Backup { action } => self.backup(action, now, out)?,
        };

        if dirty {
            self.save()?;
        }
        self.run_due_backups(now);
        Ok(())
    }

    fn print_today(&self, today: NaiveDate, out: &mut impl Write) -> Result<()> {
        let habits = self.service.habits();
        let rate = self.service.completion_rate(today);
        writeln!(out, "{} - {} done", calendar::format_day(today), rate)?;
        if habits.is_empty() {
            writeln!(out, "No habits yet. Add one with `habits add <title>`.")?;
        }
        for habit in habits {
            let done = self.service.is_completed(habit.id, today);
            let streak = self.service.current_streak(habit.id, today)?;
            let graph = self
                .service
                .history_graph(habit.id, self.config.history_days(), today)?;
            writeln!(
                out,
                "[{}] {:<24} {:>3}d  {}",
                if done { "x" } else { " " },
                habit.title,
                streak,
                graph
            )?;
        }
        Ok(())
    }

    fn print_stats(
        &self,
        habit: &Habit,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        today: NaiveDate,
        out: &mut impl Write,
    ) -> Result<()> {
        let end = to.unwrap_or(today);
        let start = match from {
            Some(start) => start,
            None => calendar::add_days(end, -29).context("date out of range")?,
        };
        let stats = self.service.habit_stats(habit.id, today)?;
        let period = self.service.period_completion_rate(habit.id, start, end)?;
        writeln!(out, "{}", habit.title)?;
        writeln!(out, "  current streak: {}", stats.current_streak)?;
        writeln!(out, "  best streak:    {}", stats.best_streak)?;
        writeln!(out, "  completions:    {}", stats.total_completions)?;
        writeln!(
            out,
            "  {} to {}: {}",
            calendar::format_day(start),
            calendar::format_day(end),
            period
        )?;
        writeln!(
            out,
            "  freezes left:   {}",
            self.service.available_freezes(habit.id, today)?
        )?;
        Ok(())
    }

    fn journal(
        &self,
        action: JournalAction,
        today: NaiveDate,
        out: &mut impl Write,
    ) -> Result<bool> {
        match action {
            JournalAction::Add {
                content,
                mood,
                tags,
                date,
            } => {
                let entry = self.service.add_journal_entry(
                    date.unwrap_or(today),
                    &content,
                    mood,
                    &tags,
                )?;
                writeln!(out, "Saved entry for {}", calendar::format_day(entry.date))?;
                Ok(true)
            }
            JournalAction::List { tag } => {
                let entries = match tag {
                    Some(tag) => self.service.journal_entries_with_tag(&tag),
                    None => self.service.journal_entries(),
                };
                for entry in entries.iter().rev() {
                    let mood = entry
                        .mood
                        .map(|mood| format!(" [{mood}/5]"))
                        .unwrap_or_default();
                    writeln!(
                        out,
                        "{}{} {}",
                        calendar::format_day(entry.date),
                        mood,
                        entry.content
                    )?;
                }
                Ok(false)
            }
        }
    }

    fn backup(
        &mut self,
        action: BackupAction,
        now: DateTime<Utc>,
        out: &mut impl Write,
    ) -> Result<bool> {
        match action {
            BackupAction::Create => {
                let entry = self.backups.create_backup(&self.service, now)?;
                writeln!(out, "Backup written to {}", entry.path.display())?;
                Ok(false)
            }
            BackupAction::List => {
                for entry in self.backups.list_backups()? {
                    let created = entry.created_at.with_timezone(&Local);
                    writeln!(
                        out,
                        "{}  {:>8} bytes  {}",
                        created.format("%Y-%m-%d %H:%M:%S"),
                        entry.size_bytes,
                        entry.path.display()
                    )?;
                }
                Ok(false)
            }
            BackupAction::Restore { file, merge } => {
                let mode = if merge {
                    RestoreMode::Merge
                } else {
                    RestoreMode::Replace
                };
                let source = match file {
                    Some(path) => {
                        self.backups.restore_file(&self.service, &path, mode)?;
                        path
                    }
                    None => self.backups.restore_latest(&self.service, mode)?.path,
                };
                writeln!(out, "Restored from {}", source.display())?;
                Ok(true)
            }
        }
    }

    /// Best effort; a failed automatic backup must not fail the command.
    fn run_due_backups(&mut self, now: DateTime<Utc>) {
        self.backups.schedule_if_due(now);
        while let Some(job) = self.backups.dequeue_job() {
            match self.backups.perform_job(job, &self.service, now) {
                Ok(report) => {
                    info!(kind = ?report.kind, pruned = report.pruned, "backup job finished")
                }
                Err(err) => warn!(%err, "backup job failed"),
            }
        }
    }
}

fn load_data(path: &Path) -> Result<HabitData> {
    if !path.exists() {
        info!(path = %path.display(), "no data file yet, starting empty");
        return Ok(HabitData::default());
    }
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot = decode_snapshot(&bytes)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(snapshot.into_data())
}

pub fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let mut app = HabitApp::open(config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    app.execute(cli.command, calendar::today(), Utc::now(), &mut out)
}
