//! Snapshot creation.
//!
//! One build produces one snapshot under `target/<date>/`: a directory tree
//! in copy mode, a single archive file in zip/tar.gz mode. The snapshot is
//! written under a `.tmp` name and renamed into place only after every
//! non-failed source is fully represented; a half-written entry is removed,
//! so retention never counts a truncated snapshot.
//!
//! Per-source failures (missing path, permission error, read error midway)
//! are recorded and skipped; the run continues with the remaining sources.
//! Only failures that affect the snapshot as a whole abort the build.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::snapshot::{day_dir_name, snapshot_name, SnapshotFormat};
use chrono::{DateTime, TimeZone};
use derive_more::Display;
use filetime::FileTime;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, IntoInnerError, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One skipped source and why.
#[derive(Clone, Debug, Display)]
#[display("{path:?}: {reason}")]
pub struct SourceFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// What one build produced.
#[derive(Debug)]
pub struct BuildOutcome {
    pub snapshot: PathBuf,
    pub files: u64,
    pub bytes: u64,
    pub failures: Vec<SourceFailure>,
}

#[derive(Default)]
struct Stats {
    files: u64,
    bytes: u64,
}

/// Snapshots `sources` under `target_root`, named from `at`.
pub fn build<O: std::fmt::Display, T: TimeZone<Offset = O>>(
    sources: &[PathBuf],
    target_root: &Path,
    format: SnapshotFormat,
    at: &DateTime<T>,
) -> Result<BuildOutcome> {
    let day_dir = target_root.join(day_dir_name(at));
    fs::create_dir_all(&day_dir).map_err(|e| archive_write(&day_dir, e))?;

    let name = snapshot_name(at, format);
    let final_path = day_dir.join(&name);
    let tmp_path = day_dir.join(format!("{name}.tmp"));

    let mut stats = Stats::default();
    let res = match format {
        SnapshotFormat::Copy => copy_sources(sources, &tmp_path, &mut stats),
        SnapshotFormat::Zip => build_zip(sources, &tmp_path, &mut stats),
        SnapshotFormat::TarGz => build_tar_gz(sources, &tmp_path, &mut stats),
    };

    let failures = match res {
        Ok(failures) => failures,
        Err(e) => {
            remove_half_written(&tmp_path);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&tmp_path, &final_path) {
        remove_half_written(&tmp_path);
        return Err(archive_write(&final_path, e));
    }

    info!("Created snapshot {:?}", final_path);
    Ok(BuildOutcome {
        snapshot: final_path,
        files: stats.files,
        bytes: stats.bytes,
        failures,
    })
}

fn archive_write(path: &Path, source: std::io::Error) -> Error {
    Error::ArchiveWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn remove_half_written(tmp_path: &Path) {
    if !tmp_path.exists() {
        return;
    }
    let res = if tmp_path.is_dir() {
        fs::remove_dir_all(tmp_path)
    } else {
        fs::remove_file(tmp_path)
    };
    if let Err(e) = res {
        warn!("Removing half-written snapshot {:?} failed: {e}", tmp_path);
    }
}

/// Runs `append` once per source, recording failures instead of aborting.
fn snapshot_sources<F>(sources: &[PathBuf], mut append: F) -> Vec<SourceFailure>
where
    F: FnMut(&Path, &OsStr) -> Result<()>,
{
    let mut failures = Vec::new();
    for src in sources {
        let Some(base) = src.file_name() else {
            warn!("Skipping source {:?}, no usable base name", src);
            failures.push(SourceFailure {
                path: src.clone(),
                reason: "no usable base name".into(),
            });
            continue;
        };
        if let Err(e) = source_readable(src) {
            warn!("Skipping source: {e}");
            failures.push(SourceFailure {
                path: src.clone(),
                reason: e.to_string(),
            });
            continue;
        }
        match append(src, base) {
            Ok(()) => info!("Backed up source {:?}", src),
            Err(e) => {
                warn!("Source {:?} failed: {e}", src);
                failures.push(SourceFailure {
                    path: src.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    failures
}

fn source_readable(src: &Path) -> Result<()> {
    let meta = fs::metadata(src).map_err(|e| Error::SourceAccess {
        path: src.to_path_buf(),
        source: e,
    })?;
    if !meta.is_dir() {
        return Err(Error::SourceAccess {
            path: src.to_path_buf(),
            source: std::io::Error::other("not a directory"),
        });
    }
    Ok(())
}

fn copy_sources(
    sources: &[PathBuf],
    snapshot_dir: &Path,
    stats: &mut Stats,
) -> Result<Vec<SourceFailure>> {
    fs::create_dir_all(snapshot_dir).map_err(|e| archive_write(snapshot_dir, e))?;
    Ok(snapshot_sources(sources, |src, base| {
        copy_tree(src, &snapshot_dir.join(base), stats)
    }))
}

fn copy_tree(src: &Path, dst: &Path, stats: &mut Stats) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            let copied = fs::copy(entry.path(), &target)?;
            stats.files += 1;
            stats.bytes += copied;
            let meta = entry.metadata()?;
            filetime::set_file_mtime(&target, FileTime::from_last_modification_time(&meta))?;
        }
    }
    Ok(())
}

// Symlinks are re-created as links, never followed: following them risks
// cycles and unbounded expansion of trees outside the source.
#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> std::io::Result<()> {
    warn!("Skipping symlink {:?}, not supported on this platform", src);
    Ok(())
}

fn build_tar_gz(
    sources: &[PathBuf],
    tmp_path: &Path,
    stats: &mut Stats,
) -> Result<Vec<SourceFailure>> {
    let file = File::create_new(tmp_path).map_err(|e| archive_write(tmp_path, e))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(BufWriter::new(encoder));
    builder.follow_symlinks(false);

    let failures = snapshot_sources(sources, |src, base| {
        append_tar_tree(&mut builder, src, base, stats)
    });

    finish_tar_gz(builder).map_err(|e| archive_write(tmp_path, e))?;
    Ok(failures)
}

fn append_tar_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    src: &Path,
    base: &OsStr,
    stats: &mut Stats,
) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let dst = Path::new(base).join(rel);
        if entry.file_type().is_dir() {
            builder.append_dir(&dst, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &dst)?;
            if entry.file_type().is_file() {
                stats.files += 1;
                stats.bytes += entry.metadata()?.len();
            }
        }
    }
    Ok(())
}

fn finish_tar_gz(
    builder: tar::Builder<BufWriter<GzEncoder<BufWriter<File>>>>,
) -> std::io::Result<File> {
    builder
        .into_inner()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)
}

fn build_zip(
    sources: &[PathBuf],
    tmp_path: &Path,
    stats: &mut Stats,
) -> Result<Vec<SourceFailure>> {
    let file = File::create_new(tmp_path).map_err(|e| archive_write(tmp_path, e))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));

    let failures = snapshot_sources(sources, |src, base| {
        append_zip_tree(&mut writer, src, base, stats)
    });

    writer
        .finish()
        .map_err(Error::from)?
        .into_inner()
        .map_err(IntoInnerError::into_error)
        .map_err(|e| archive_write(tmp_path, e))?;
    Ok(failures)
}

fn append_zip_tree(
    writer: &mut ZipWriter<BufWriter<File>>,
    src: &Path,
    base: &OsStr,
    stats: &mut Stats,
) -> Result<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let member = member_name(base, rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            writer.add_directory(member, options)?;
        } else if file_type.is_symlink() {
            append_zip_symlink(writer, entry.path(), member, options)?;
        } else {
            writer.start_file(member, options)?;
            let mut reader = File::open(entry.path())?;
            let copied = std::io::copy(&mut reader, writer)?;
            stats.files += 1;
            stats.bytes += copied;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn append_zip_symlink(
    writer: &mut ZipWriter<BufWriter<File>>,
    src: &Path,
    member: String,
    options: SimpleFileOptions,
) -> Result<()> {
    let target = fs::read_link(src)?;
    writer.add_symlink(member, target.to_string_lossy().into_owned(), options)?;
    Ok(())
}

#[cfg(not(unix))]
fn append_zip_symlink(
    _writer: &mut ZipWriter<BufWriter<File>>,
    src: &Path,
    _member: String,
    _options: SimpleFileOptions,
) -> Result<()> {
    warn!("Skipping symlink {:?}, not supported on this platform", src);
    Ok(())
}

// Archive member names are '/'-separated and rooted at the source's base
// name, so unrelated sources never collide and extraction needs no absolute
// paths.
fn member_name(base: &OsStr, rel: &Path) -> String {
    let mut name = base.to_string_lossy().into_owned();
    for part in rel.components() {
        name.push('/');
        name.push_str(&part.as_os_str().to_string_lossy());
    }
    name
}
