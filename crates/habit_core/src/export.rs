use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::backup::BackupSnapshot;
use crate::calendar;
use crate::error::BackupError;
use crate::journal::JournalEntry;
use crate::streak;

/// Days of history drawn in the Markdown digest.
const DIGEST_HISTORY_DAYS: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format `{other}`")),
        }
    }
}

pub fn render(
    snapshot: &BackupSnapshot,
    format: ExportFormat,
    today: NaiveDate,
) -> Result<String, BackupError> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(snapshot).map_err(BackupError::Encode),
        ExportFormat::Markdown => Ok(to_markdown(snapshot, today)),
        ExportFormat::Csv => Ok(to_csv(snapshot)),
    }
}

/// Human-readable digest: one section per habit, then the journal by day.
pub fn to_markdown(snapshot: &BackupSnapshot, today: NaiveDate) -> String {
    let data = snapshot.clone().into_data();
    let mut out = String::new();
    let _ = writeln!(out, "# Habit report ({})", calendar::format_day(today));
    let _ = writeln!(out);

    if data.habits.is_empty() {
        let _ = writeln!(out, "_No habits yet._");
    }
    for habit in &data.habits {
        let stats = streak::summarize(habit, &data.ledger, &data.freezes, today);
        let graph = streak::history_graph(
            habit,
            &data.ledger,
            &data.freezes,
            DIGEST_HISTORY_DAYS,
            today,
        );
        let _ = writeln!(out, "## {}", habit.title);
        let _ = writeln!(out);
        if let Some(category) = habit.category_id.and_then(|id| data.category(id)) {
            let _ = writeln!(out, "- Category: {}", category.name);
        }
        let _ = writeln!(
            out,
            "- Current streak: {}",
            plural_days(stats.current_streak)
        );
        let _ = writeln!(out, "- Best streak: {}", plural_days(stats.best_streak));
        let _ = writeln!(out, "- Last 30 days: {}", stats.last_30_days);
        let _ = writeln!(out, "- History: `{}`", graph);
        let _ = writeln!(out);
    }

    let mut by_day: BTreeMap<NaiveDate, Vec<&JournalEntry>> = BTreeMap::new();
    for entry in data.journal.iter() {
        by_day.entry(entry.date).or_default().push(entry);
    }
    if !by_day.is_empty() {
        let _ = writeln!(out, "# Journal");
        let _ = writeln!(out);
    }
    for (day, entries) in by_day.iter().rev() {
        let _ = writeln!(
            out,
            "## {} ({})",
            calendar::format_day(*day),
            calendar::relative_label(*day, today)
        );
        let _ = writeln!(out);
        for entry in entries {
            let mut meta = Vec::new();
            if let Some(mood) = entry.mood {
                meta.push(format!("mood {mood}/5"));
            }
            if !entry.tags.is_empty() {
                let tags: Vec<String> = entry.tags.iter().map(|tag| format!("#{tag}")).collect();
                meta.push(tags.join(" "));
            }
            if meta.is_empty() {
                let _ = writeln!(out, "- {}", entry.content);
            } else {
                let _ = writeln!(out, "- {} ({})", entry.content, meta.join(", "));
            }
        }
        let _ = writeln!(out);
    }
    out
}

const CSV_HEADER: &str = "kind,id,habit_id,date,completed,title,content,mood,tags,reason";

/// Flat projection: one row per habit, completion, journal entry and freeze.
pub fn to_csv(snapshot: &BackupSnapshot) -> String {
    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push('\n');

    for habit in &snapshot.habits {
        push_row(
            &mut out,
            [
                "habit".to_string(),
                habit.id.to_string(),
                habit.id.to_string(),
                calendar::format_day(habit.created_on()),
                String::new(),
                habit.title.clone(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ],
        );
    }
    for completion in &snapshot.completions {
        push_row(
            &mut out,
            [
                "completion".to_string(),
                completion.id.to_string(),
                completion.habit_id.to_string(),
                calendar::format_day(completion.date),
                completion.completed.to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ],
        );
    }
    for entry in &snapshot.journal_entries {
        push_row(
            &mut out,
            [
                "journal".to_string(),
                entry.id.to_string(),
                String::new(),
                calendar::format_day(entry.date),
                String::new(),
                String::new(),
                entry.content.clone(),
                entry.mood.map(|mood| mood.to_string()).unwrap_or_default(),
                entry.tags.iter().cloned().collect::<Vec<_>>().join(";"),
                String::new(),
            ],
        );
    }
    for freeze in &snapshot.streak_freezes {
        push_row(
            &mut out,
            [
                "freeze".to_string(),
                freeze.id.to_string(),
                freeze.habit_id.to_string(),
                calendar::format_day(freeze.date),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                freeze.reason.clone(),
            ],
        );
    }
    out
}

fn push_row<const N: usize>(out: &mut String, cells: [String; N]) {
    let row: Vec<String> = cells.iter().map(|cell| csv_escape(cell)).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn plural_days(count: u32) -> String {
    format!("{} day{}", count, if count == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::export_snapshot;
    use crate::data::HabitData;
    use crate::freeze::StreakFreeze;
    use crate::habit::Habit;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, d).unwrap()
    }

    fn sample() -> BackupSnapshot {
        let habit = Habit::builder("Water plants")
            .created_on(day(1))
            .build()
            .unwrap();
        let mut data = HabitData {
            habits: vec![habit.clone()],
            ..HabitData::default()
        };
        for d in [day(8), day(9), day(10)] {
            data.ledger.toggle(habit.id, d);
        }
        let freeze = StreakFreeze::used(habit.id, day(7), "away, \"holiday\"", day(8));
        data.freezes.push(freeze);
        let note = "Repotted the fern, finally";
        let entry = JournalEntry::new(day(10), note, Some(4), ["garden"]).unwrap();
        data.journal.add(entry);
        export_snapshot(&data)
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("JSON".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert_eq!("md".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!(" csv ".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Markdown.extension(), "md");
    }

    #[test]
    fn markdown_digest_lists_streaks_and_journal() {
        let text = to_markdown(&sample(), day(10));
        assert!(text.starts_with("# Habit report (2026-09-10)"));
        assert!(text.contains("## Water plants"));
        assert!(text.contains("- Current streak: 4 days"));
        assert!(text.contains("- Best streak: 4 days"));
        assert!(text.contains("`____......*XXX`"));
        assert!(text.contains("## 2026-09-10 (Today)"));
        let journal_line = "- Repotted the fern, finally (mood 4/5, #garden)";
        assert!(text.contains(journal_line));
    }

    #[test]
    fn csv_escapes_and_counts_rows() {
        let text = to_csv(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 1 + 1 + 3 + 1 + 1);
        assert!(text.contains("\"Repotted the fern, finally\""));
        assert!(text.contains("\"away, \"\"holiday\"\"\""));
        let completion = lines
            .iter()
            .find(|line| line.contains(",2026-09-09,true,"))
            .unwrap();
        assert!(completion.starts_with("completion,"));
    }

    #[test]
    fn json_render_is_the_snapshot() {
        let snapshot = sample();
        let text = render(&snapshot, ExportFormat::Json, day(10)).unwrap();
        let parsed: BackupSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
