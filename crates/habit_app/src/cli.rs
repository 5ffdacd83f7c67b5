use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use habit_core::calendar::parse_date;
use habit_core::export::ExportFormat;

#[derive(Debug, Parser)]
#[command(name = "habits", version, about = "Daily habit tracker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Today's habits with streaks and history
    Today,
    /// Add a habit
    Add {
        title: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
        /// Daily reminder time, HH:MM
        #[arg(long, value_parser = parse_time)]
        reminder: Option<NaiveTime>,
    },
    /// Delete a habit with its history
    Delete { habit: String },
    /// Flip a habit's completion for a day (default today)
    Toggle {
        habit: String,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Streaks and completion rate for one habit
    Stats {
        habit: String,
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
    },
    /// Spend a streak freeze on a missed day
    Freeze {
        habit: String,
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Journal entries
    Journal {
        #[command(subcommand)]
        action: JournalAction,
    },
    /// Write all data as JSON, Markdown or CSV
    Export {
        #[arg(long, default_value = "markdown")]
        format: ExportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Backup management
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum JournalAction {
    /// Add an entry (default today)
    Add {
        content: String,
        #[arg(long)]
        mood: Option<u8>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// List entries, optionally by tag
    List {
        #[arg(long)]
        tag: Option<String>,
    },
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum BackupAction {
    /// Write a backup now
    Create,
    /// List backups, newest first
    List,
    /// Restore the newest backup or a given file
    Restore {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Merge into current data instead of replacing it
        #[arg(long)]
        merge: bool,
    },
}

fn parse_time(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "habits", "journal", "add", "Good day", "--mood", "4", "--tag", "work", "--tag", "gym",
        ])
        .unwrap();
        let expected = Command::Journal {
            action: JournalAction::Add {
                content: "Good day".to_string(),
                mood: Some(4),
                tags: vec!["work".to_string(), "gym".to_string()],
                date: None,
            },
        };
        assert_eq!(cli.command, expected);
    }

    #[test]
    fn validates_dates_times_and_formats() {
        let cli = Cli::try_parse_from(["habits", "add", "Run", "--reminder", "07:15"]).unwrap();
        let expected = Command::Add {
            title: "Run".to_string(),
            icon: None,
            color: None,
            reminder: NaiveTime::from_hms_opt(7, 15, 0),
        };
        assert_eq!(cli.command, expected);

        assert!(Cli::try_parse_from(["habits", "toggle", "Run", "--date", "2026-02-29"]).is_err());
        assert!(Cli::try_parse_from(["habits", "export", "--format", "xml"]).is_err());
        let cli = Cli::try_parse_from(["habits", "export", "--format", "csv"]).unwrap();
        let expected = Command::Export {
            format: ExportFormat::Csv,
            out: None,
        };
        assert_eq!(cli.command, expected);
    }
}
