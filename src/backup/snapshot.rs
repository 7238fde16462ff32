//! Snapshot naming scheme.
//!
//! Every run produces one snapshot under `target/<YYYY-MM-DD>/`, named
//! `backup-<YYYY-MM-DD>_<HH-MM-SS>` plus the format's file extension. The
//! timestamp embedded in the name is the authoritative creation time; other
//! tooling (retention, restore scripts) orders snapshots by parsing it back
//! out of the name.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub static DATE_FORMAT: &str = "%Y-%m-%d";
pub static STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
static NAME_PREFIX: &str = "backup-";
static STAMP_LEN: usize = 19;

/// On-disk layout of one snapshot.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    /// Plain directory tree, one subdirectory per source.
    #[default]
    Copy,
    Zip,
    TarGz,
}

impl SnapshotFormat {
    pub fn file_ext(&self) -> Option<&'static str> {
        match self {
            SnapshotFormat::Copy => None,
            SnapshotFormat::Zip => Some("zip"),
            SnapshotFormat::TarGz => Some("tar.gz"),
        }
    }
}

pub fn day_dir_name<O: Display, T: TimeZone<Offset = O>>(dt: &DateTime<T>) -> String {
    dt.format(DATE_FORMAT).to_string()
}

pub fn snapshot_name<O: Display, T: TimeZone<Offset = O>>(
    dt: &DateTime<T>,
    format: SnapshotFormat,
) -> String {
    let stem = format!("{}{}", NAME_PREFIX, dt.format(STAMP_FORMAT));
    match format.file_ext() {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

/// Parses the creation timestamp out of a snapshot entry name.
///
/// Accepts both the full `backup-<date>_<time>[.<ext>]` form and a bare
/// `YYYY-MM-DD` day directory (which maps to midnight). Anything else,
/// including in-progress `.tmp` entries, yields `None`.
pub fn parse_stamp(name: &str) -> Option<NaiveDateTime> {
    if let Some(rest) = name.strip_prefix(NAME_PREFIX) {
        let stamp = rest.get(..STAMP_LEN)?;
        let trailer = rest.get(STAMP_LEN..)?;
        if !trailer.is_empty() && !trailer.starts_with('.') {
            return None;
        }
        if trailer.ends_with(".tmp") {
            return None;
        }
        return NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok();
    }

    NaiveDate::parse_from_str(name, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
