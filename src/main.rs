use clap::Parser;
use snapkeep::backup::config::{ConfigProvider, FileConfigProvider};
use snapkeep::backup::job::BackupJob;
use snapkeep::backup::schedule::Scheduler;
use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Simple program to snapshot directories on a schedule and expire old snapshots
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let provider = FileConfigProvider::new(&args.config);
    let config = match provider.fetch() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        error!("Installing shutdown handler failed: {e}");
        exit(1);
    }

    let scheduler = Scheduler::new(config.schedule().clone(), shutdown);
    let job = BackupJob::new(provider);
    match scheduler.run(|| job.run_once().map(|_| ())) {
        Ok(()) => info!("Scheduler stopped, exiting"),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
