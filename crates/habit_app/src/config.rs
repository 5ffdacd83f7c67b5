use std::path::PathBuf;

use anyhow::Result;
use habit_backup::{AutoBackupSchedule, DEFAULT_RETENTION};
use tracing::{info, warn};

pub const DATA_FILE_NAME: &str = "habits.json";
/// Widest history graph the digest will draw.
pub const MAX_HISTORY_DAYS: usize = 366;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub(crate) data_dir: PathBuf,
    pub(crate) backup_dir: Option<PathBuf>,
    pub(crate) backup_retention: usize,
    pub(crate) auto_backup: AutoBackupSchedule,
    pub(crate) history_days: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Builds the config from any key lookup; unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("HABITS_DATA_DIR").filter(|dir| !dir.trim().is_empty()) {
            info!(path = %dir, "using data directory");
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("HABITS_BACKUP_DIR").filter(|dir| !dir.trim().is_empty()) {
            config.backup_dir = Some(PathBuf::from(dir));
        }
        if let Some(retention) = lookup("HABITS_BACKUP_RETENTION") {
            match retention.trim().parse::<usize>() {
                Ok(value) if value > 0 => config.backup_retention = value,
                _ => warn!(value = %retention, "ignoring invalid HABITS_BACKUP_RETENTION"),
            }
        }
        if let Some(schedule) = lookup("HABITS_AUTO_BACKUP") {
            match schedule.parse::<AutoBackupSchedule>() {
                Ok(value) => config.auto_backup = value,
                Err(err) => warn!(%err, "ignoring invalid HABITS_AUTO_BACKUP"),
            }
        }
        if let Some(days) = lookup("HABITS_HISTORY_DAYS") {
            match days.trim().parse::<usize>() {
                Ok(value) if value > MAX_HISTORY_DAYS => {
                    warn!(value, max = MAX_HISTORY_DAYS, "capping HABITS_HISTORY_DAYS");
                    config.history_days = MAX_HISTORY_DAYS;
                }
                Ok(value) if value > 0 => config.history_days = value,
                _ => warn!(value = %days, "ignoring invalid HABITS_HISTORY_DAYS"),
            }
        }
        config
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn data_file(&self) -> PathBuf {
        self.data_dir.join(DATA_FILE_NAME)
    }

    /// Backups live under the data directory unless overridden.
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backups"))
    }

    pub fn backup_retention(&self) -> usize {
        self.backup_retention
    }

    pub fn auto_backup(&self) -> AutoBackupSchedule {
        self.auto_backup
    }

    pub fn history_days(&self) -> usize {
        self.history_days
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".habits"),
            backup_dir: None,
            backup_retention: DEFAULT_RETENTION,
            auto_backup: AutoBackupSchedule::Never,
            history_days: 14,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config, AppConfig::default());
        let home = PathBuf::from(".habits");
        assert_eq!(config.backup_dir(), home.join("backups"));
        assert_eq!(config.data_file(), home.join("habits.json"));
    }

    #[test]
    fn environment_overrides_and_invalid_values_are_ignored() {
        let config = AppConfig::from_lookup(lookup(&[
            ("HABITS_DATA_DIR", "/tmp/h"),
            ("HABITS_BACKUP_DIR", "/tmp/b"),
            ("HABITS_BACKUP_RETENTION", "0"),
            ("HABITS_AUTO_BACKUP", "Weekly"),
            ("HABITS_HISTORY_DAYS", "thirty"),
        ]));
        assert_eq!(config.data_file(), PathBuf::from("/tmp/h/habits.json"));
        assert_eq!(config.backup_dir(), PathBuf::from("/tmp/b"));
        assert_eq!(config.backup_retention(), DEFAULT_RETENTION);
        assert_eq!(config.auto_backup(), AutoBackupSchedule::Weekly);
        assert_eq!(config.history_days(), 14);
    }

    #[test]
    fn history_days_are_capped() {
        let huge = [("HABITS_HISTORY_DAYS", "18446744073709551615")];
        let config = AppConfig::from_lookup(lookup(&huge));
        assert_eq!(config.history_days(), MAX_HISTORY_DAYS);

        let config = AppConfig::from_lookup(lookup(&[("HABITS_HISTORY_DAYS", "30")]));
        assert_eq!(config.history_days(), 30);
    }
}
