use crate::clock::offset_from_minutes;
use crate::errors::{AppError, AppResult};
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const TIME_FORMAT: &str = "%H:%M";
pub const MIN_EXPORT_SIDE: u32 = 200;
pub const MAX_EXPORT_SIDE: u32 = 4000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    /// Offset of the team's local time from UTC. Day boundaries and the
    /// scheduled jobs use it.
    pub utc_offset_minutes: i32,
    pub daily_snapshot_time: String,
    pub retention_day_of_month: u32,
    pub retention_time: String,
    pub retention_months: u32,
    pub export_width: u32,
    pub export_height: u32,
    pub task_event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("burndown.sqlite"),
            log_dir: PathBuf::from("logs"),
            utc_offset_minutes: -240,
            daily_snapshot_time: "23:55".to_string(),
            retention_day_of_month: 1,
            retention_time: "02:00".to_string(),
            retention_months: 6,
            export_width: 1200,
            export_height: 600,
            task_event_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("cannot read {}: {}", path.display(), error)))?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults when no file is given; a given file must exist.
    pub fn load_or_default(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        self.utc_offset()?;
        self.daily_snapshot_at()?;
        self.retention_at()?;
        if !(1..=28).contains(&self.retention_day_of_month) {
            return Err(AppError::Config(format!(
                "retentionDayOfMonth must be between 1 and 28, got {}",
                self.retention_day_of_month
            )));
        }
        Ok(())
    }

    pub fn utc_offset(&self) -> AppResult<FixedOffset> {
        offset_from_minutes(self.utc_offset_minutes)
    }

    pub fn daily_snapshot_at(&self) -> AppResult<NaiveTime> {
        parse_time_of_day("dailySnapshotTime", &self.daily_snapshot_time)
    }

    pub fn retention_at(&self) -> AppResult<NaiveTime> {
        parse_time_of_day("retentionTime", &self.retention_time)
    }

    pub fn export_size(&self, width: Option<u32>, height: Option<u32>) -> (u32, u32) {
        (
            clamp_export_side(width.unwrap_or(self.export_width)),
            clamp_export_side(height.unwrap_or(self.export_height)),
        )
    }
}

pub fn clamp_export_side(value: u32) -> u32 {
    value.clamp(MIN_EXPORT_SIDE, MAX_EXPORT_SIDE)
}

fn parse_time_of_day(field: &str, raw: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
        .map_err(|error| AppError::Config(format!("{} '{}' is not HH:MM: {}", field, raw, error)))
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;
    use chrono::NaiveTime;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "dailySnapshotTime: \"22:30\"\nretentionMonths: 3\n").expect("write config");

        let config = EngineConfig::load(&path).expect("load config");
        assert_eq!(config.daily_snapshot_at().expect("time"), NaiveTime::from_hms_opt(22, 30, 0).unwrap());
        assert_eq!(config.retention_months, 3);
        assert_eq!(config.utc_offset_minutes, -240);
        assert_eq!(config.export_size(None, None), (1200, 600));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "dailySnapshotTime: \"late\"\n").expect("write config");
        assert!(EngineConfig::load(&path).is_err());

        std::fs::write(&path, "retentionDayOfMonth: 31\n").expect("write config");
        assert!(EngineConfig::load(&path).is_err());

        assert!(EngineConfig::load(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn export_size_is_clamped() {
        let config = EngineConfig::default();
        assert_eq!(config.export_size(Some(10), Some(99_999)), (200, 4000));
    }
}
