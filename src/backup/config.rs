//! Typed run configuration and its providers.
//!
//! The configuration is an immutable value: the job fetches a fresh copy from
//! its [`ConfigProvider`] at the start of every run and passes it by value
//! through the call chain, so edits to sources, target, format or retention
//! take effect without a restart. Source paths are checked at run time, not
//! here; load-time validation covers only what must hold before any job runs.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::schedule::ScheduleSpec;
use crate::backup::snapshot::SnapshotFormat;
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::Validate;

#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    #[validate(length(min = 1, message = "at least one source directory is required"))]
    source_directories: Vec<PathBuf>,
    #[builder(into)]
    target_directory: PathBuf,
    compress: bool,
    #[serde(default)]
    #[builder(default)]
    compress_format: SnapshotFormat,
    #[validate(range(min = 1))]
    retention_count: usize,
    #[validate(nested)]
    schedule: ScheduleSpec,
}

impl BackupConfig {
    /// Effective snapshot format: `compress: false` always means a plain
    /// directory copy, whatever `compress_format` says.
    pub fn mode(&self) -> SnapshotFormat {
        if self.compress {
            self.compress_format
        } else {
            SnapshotFormat::Copy
        }
    }
}

/// Supplies a validated configuration snapshot on demand; re-queried by the
/// job before each run.
pub trait ConfigProvider {
    fn fetch(&self) -> Result<BackupConfig>;
}

/// Reads the configuration from a YAML file, or JSON when the file carries a
/// `.json` extension.
#[derive(Clone, Debug)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for FileConfigProvider {
    fn fetch(&self) -> Result<BackupConfig> {
        let config = File::open(&self.path)
            .map_err(Error::from)
            .and_then(|f| {
                if self.path.extension().is_some_and(|ext| ext == "json") {
                    serde_json::from_reader::<_, BackupConfig>(f).map_err(Error::from)
                } else {
                    serde_yml::from_reader::<_, BackupConfig>(f).map_err(Error::from)
                }
                .with_msg(format!("Parse config failed: {:?}", &self.path))
            })?;

        config
            .validate()
            .map_err(Error::from)
            .with_msg(format!("Config validation failed: {:?}", &self.path))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::schedule::{CronSchedule, IntervalSchedule};
    use tempfile::TempDir;

    static YAML_CONFIG: &str = "\
source_directories:
  - /data/app
  - /data/db
target_directory: /backups
compress: true
compress_format: tar_gz
retention_count: 7
schedule:
  cron:
    times: [\"02:00\", \"14:00\"]
";

    static JSON_CONFIG: &str = r#"{
  "source_directories": ["/data/app"],
  "target_directory": "/backups",
  "compress": false,
  "compress_format": "zip",
  "retention_count": 3,
  "schedule": {"interval": {"hours": 6}}
}"#;

    fn interval_spec() -> ScheduleSpec {
        IntervalSchedule::builder().hours(1).build().into()
    }

    #[test]
    fn test_yaml_config_parses_and_validates() {
        let config: BackupConfig = serde_yml::from_str(YAML_CONFIG).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.source_directories().len(), 2);
        assert_eq!(config.target_directory(), &PathBuf::from("/backups"));
        assert_eq!(*config.retention_count(), 7);
        assert_eq!(config.mode(), SnapshotFormat::TarGz);
        match config.schedule() {
            ScheduleSpec::Cron(cron) => assert_eq!(cron.times().len(), 2),
            _ => panic!("Expected cron schedule"),
        }
    }

    #[test]
    fn test_mode_ignores_format_without_compress() {
        let config: BackupConfig = serde_json::from_str(JSON_CONFIG).unwrap();
        assert_eq!(config.mode(), SnapshotFormat::Copy);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = format!("{YAML_CONFIG}encryption: aes\n");
        assert!(serde_yml::from_str::<BackupConfig>(&yaml).is_err());
    }

    #[test]
    fn test_zero_retention_rejected() {
        let config = BackupConfig::builder()
            .source_directories(vec![PathBuf::from("/data")])
            .target_directory("/backups")
            .compress(false)
            .retention_count(0)
            .schedule(interval_spec())
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_sources_rejected() {
        let config = BackupConfig::builder()
            .source_directories(vec![])
            .target_directory("/backups")
            .compress(false)
            .retention_count(1)
            .schedule(interval_spec())
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected_through_nested_validation() {
        let config = BackupConfig::builder()
            .source_directories(vec![PathBuf::from("/data")])
            .target_directory("/backups")
            .compress(false)
            .retention_count(1)
            .schedule(IntervalSchedule::default().into())
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_cron_times_rejected_through_nested_validation() {
        let config = BackupConfig::builder()
            .source_directories(vec![PathBuf::from("/data")])
            .target_directory("/backups")
            .compress(false)
            .retention_count(1)
            .schedule(CronSchedule::builder().times(vec![]).build().into())
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_time_of_day_fails_at_parse() {
        let yaml = YAML_CONFIG.replace("14:00", "26:00");
        assert!(serde_yml::from_str::<BackupConfig>(&yaml).is_err());
    }

    #[test]
    fn test_file_provider_yaml_and_json() {
        let dir = TempDir::new().unwrap();

        let yaml_path = dir.path().join("config.yml");
        std::fs::write(&yaml_path, YAML_CONFIG).unwrap();
        let config = FileConfigProvider::new(&yaml_path).fetch().unwrap();
        assert_eq!(config.mode(), SnapshotFormat::TarGz);

        let json_path = dir.path().join("config.json");
        std::fs::write(&json_path, JSON_CONFIG).unwrap();
        let config = FileConfigProvider::new(&json_path).fetch().unwrap();
        assert_eq!(*config.retention_count(), 3);
    }

    #[test]
    fn test_file_provider_picks_up_edits_between_fetches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, YAML_CONFIG).unwrap();

        let provider = FileConfigProvider::new(&path);
        assert_eq!(*provider.fetch().unwrap().retention_count(), 7);

        std::fs::write(&path, YAML_CONFIG.replace("retention_count: 7", "retention_count: 2")).unwrap();
        assert_eq!(*provider.fetch().unwrap().retention_count(), 2);
    }

    #[test]
    fn test_file_provider_missing_file() {
        let provider = FileConfigProvider::new("/nonexistent/config.yml");
        assert!(provider.fetch().is_err());
    }

    #[test]
    fn test_file_provider_invalid_config_is_a_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, YAML_CONFIG.replace("retention_count: 7", "retention_count: 0")).unwrap();

        let err = FileConfigProvider::new(&path).fetch().unwrap_err();
        assert!(err.to_string().contains("Config validation failed"));
    }
}
