//! One backup run, end to end.
//!
//! A run fetches a fresh config, snapshots the sources, prunes the target
//! root, and reports a single summary line. Pruning always runs, even when
//! no source was backed up; a run's failures are visible only through the
//! summary and the log, the service keeps going.

use crate::backup::archive::{self, SourceFailure};
use crate::backup::config::ConfigProvider;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention;
use chrono::{DateTime, Local};
use itertools::Itertools;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Per-run report; consumed by the summary log line, never persisted.
#[derive(Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub sources_attempted: usize,
    pub failures: Vec<SourceFailure>,
    pub files: u64,
    pub bytes: u64,
    pub duration: Duration,
    pub snapshot: Option<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            started_at = %self.started_at.format("%Y-%m-%d %H:%M:%S"),
            sources = self.sources_attempted,
            failed = self.failures.len(),
            failures = %self.failures.iter().join("; "),
            files = self.files,
            bytes = self.bytes,
            duration_ms = self.duration.as_millis() as u64,
            snapshot = ?self.snapshot,
            pruned = self.deleted.len(),
            "Backup run complete"
        );
    }
}

pub struct BackupJob<P> {
    provider: P,
}

impl<P: ConfigProvider> BackupJob<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Executes one run. Only a config-fetch failure is returned as `Err`;
    /// archive and prune failures are recorded in the summary and logged.
    pub fn run_once(&self) -> Result<RunSummary> {
        let started_at = Local::now();
        let clock = Instant::now();

        let config = self
            .provider
            .fetch()
            .with_msg("Refreshing config for this run")?;
        let sources_attempted = config.source_directories().len();

        let (snapshot, files, bytes, failures) = match archive::build(
            config.source_directories(),
            config.target_directory(),
            config.mode(),
            &started_at,
        ) {
            Ok(outcome) => (
                Some(outcome.snapshot),
                outcome.files,
                outcome.bytes,
                outcome.failures,
            ),
            Err(e) => {
                warn!("Snapshot creation failed, nothing written this run: {e}");
                let failures = config
                    .source_directories()
                    .iter()
                    .map(|path| SourceFailure {
                        path: path.clone(),
                        reason: e.to_string(),
                    })
                    .collect();
                (None, 0, 0, failures)
            }
        };

        let deleted =
            match retention::prune(config.target_directory(), *config.retention_count()) {
                Ok(deleted) => deleted,
                Err(e) => {
                    warn!("Pruning {:?} failed: {e}", config.target_directory());
                    Vec::new()
                }
            };

        let summary = RunSummary {
            started_at,
            sources_attempted,
            failures,
            files,
            bytes,
            duration: clock.elapsed(),
            snapshot,
            deleted,
        };
        summary.log();
        Ok(summary)
    }
}
