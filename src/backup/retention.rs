//! Count-based retention.
//!
//! Immediate children of the target root whose names parse under the
//! snapshot naming scheme are ordered by that name-derived timestamp and
//! deleted from the oldest end until at most `keep_count` remain. Name
//! ordering is authoritative; filesystem mtime only breaks ties, since
//! metadata is unreliable across clock changes and copies.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::snapshot::parse_stamp;
use chrono::NaiveDateTime;
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

struct SnapshotEntry {
    path: PathBuf,
    stamp: NaiveDateTime,
    modified: Option<SystemTime>,
}

/// Deletes the oldest snapshot entries under `target_root` until at most
/// `keep_count` remain; returns the deleted paths, oldest first.
///
/// Each deletion is independent: one failed deletion is logged and the loop
/// moves on to the next-oldest candidate. Running prune again without new
/// snapshots in between deletes nothing.
pub fn prune(target_root: &Path, keep_count: usize) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(target_root)?
        .filter_map(|r| r.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let stamp = parse_stamp(name.to_str()?)?;
            let modified = entry.metadata().and_then(|m| m.modified()).ok();
            Some(SnapshotEntry {
                path: entry.path(),
                stamp,
                modified,
            })
        })
        .sorted_unstable_by_key(|entry| (entry.stamp, entry.modified))
        .collect_vec();

    if entries.len() <= keep_count {
        return Ok(Vec::new());
    }

    let excess = entries.len() - keep_count;
    let mut deleted = Vec::new();
    for entry in &entries[..excess] {
        match delete_entry(&entry.path) {
            Ok(()) => {
                info!("Removed out-of-retention snapshot {:?}", entry.path);
                deleted.push(entry.path.clone());
            }
            Err(e) => warn!("{e}"),
        }
    }
    Ok(deleted)
}

fn delete_entry(path: &Path) -> Result<()> {
    let res = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    res.map_err(|e| Error::RetentionDelete {
        path: path.to_path_buf(),
        source: e,
    })
}
