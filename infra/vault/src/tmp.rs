//! Temporary sibling files for atomic writes, and their cleanup.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Marker embedded in every temporary file name.
pub(crate) const TMP_MARKER: &str = ".wmptmp.";

/// Temporary files older than this are considered abandoned.
pub(crate) const STALE_AFTER: Duration = Duration::from_secs(300);

static TMP_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn unique_tmp_path(target: &Path) -> PathBuf {
    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = target.file_name().and_then(|s| s.to_str()).unwrap_or("vault");
    target.with_file_name(format!("{file_name}{TMP_MARKER}{}-{counter}", std::process::id()))
}

/// A temporary sibling of a target path, removed on drop unless renamed into place.
#[derive(Debug)]
pub(crate) struct TempPath {
    path: PathBuf,
    armed: bool,
}

impl TempPath {
    pub(crate) fn for_target(target: &Path) -> Self {
        Self { path: unique_tmp_path(target), armed: true }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn create(&self) -> io::Result<File> {
        OpenOptions::new().write(true).create_new(true).open(&self.path)
    }

    /// Atomically replaces `target` with the temporary file.
    pub(crate) fn persist(mut self, target: &Path) -> io::Result<()> {
        fs::rename(&self.path, target)?;
        self.armed = false;
        Ok(())
    }

    /// Links the temporary file to `target` without replacing an existing file.
    ///
    /// Fails with [`io::ErrorKind::AlreadyExists`] when another writer got there first.
    /// The temporary name is removed either way.
    pub(crate) fn persist_noclobber(self, target: &Path) -> io::Result<()> {
        fs::hard_link(&self.path, target)
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path)
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %err, "Failed to remove temporary file");
        }
    }
}

/// Writes `data` to `target` through a synced temporary file and a rename.
pub(crate) fn write_atomic(target: &Path, data: &[u8]) -> io::Result<()> {
    let temp = TempPath::for_target(target);
    {
        let mut file = temp.create()?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    temp.persist(target)?;
    if let Some(parent) = target.parent() {
        sync_dir(parent);
    }
    Ok(())
}

pub(crate) fn sync_dir(path: &Path) {
    match File::open(path) {
        Ok(dir) => {
            if let Err(err) = dir.sync_all() {
                warn!(path = %path.display(), error = %err, "Directory sync failed");
            }
        },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Directory open failed");
        },
    }
}

/// Removes abandoned temporary files directly under `root`.
///
/// Returns `(removed, failed)`.
pub(crate) fn remove_stale(root: &Path, now: SystemTime, threshold: Duration) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;

    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .flatten()
        .filter(|entry| is_tmp(entry) && is_stale(entry, now, threshold))
        .for_each(|entry| match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "Failed to purge temporary file");
                failed += 1;
            },
        });

    (removed, failed)
}

fn is_tmp(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry.file_name().to_str().is_some_and(|name| name.contains(TMP_MARKER))
}

fn is_stale(entry: &DirEntry, now: SystemTime, threshold: Duration) -> bool {
    entry
        .metadata()
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|modified| now.duration_since(modified).ok())
        .is_none_or(|age| age > threshold)
}
