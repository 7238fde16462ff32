//! # snapkeep
//!
//! A scheduled backup tool that snapshots directories into a
//! retention-managed archive area.
//!
//! ## Features
//!
//! - **Scheduled Runs**: fixed times of day or a recurring interval
//! - **Three Snapshot Formats**: directory copy, zip, tar.gz
//! - **Retention Management**: keep the N most recent snapshots, evict the rest
//! - **Partial-Failure Isolation**: one bad source never aborts the run
//! - **Live Reconfiguration**: config is re-read before every run
//!
//! ## Quick Start
//!
//! ```no_run
//! use snapkeep::backup::config::{ConfigProvider, FileConfigProvider};
//! use snapkeep::backup::job::BackupJob;
//! use snapkeep::backup::schedule::Scheduler;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! // Load configuration from a YAML file
//! let provider = FileConfigProvider::new("config.yml");
//! let config = provider.fetch()?;
//!
//! // Run the backup loop until shutdown
//! let shutdown = Arc::new(AtomicBool::new(false));
//! let scheduler = Scheduler::new(config.schedule().clone(), shutdown);
//! let job = BackupJob::new(provider);
//! scheduler.run(|| job.run_once().map(|_| ()))?;
//! # Ok::<(), snapkeep::backup::result_error::error::Error>(())
//! ```

pub mod backup;
