use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Suffix of in-flight writes. A blob only appears under its final name once
/// fully written and synced.
pub const PENDING_SUFFIX: &str = "tmp";

/// Blob location relative to the storage root, sharded on the id prefix.
pub fn blob_relative_path(id: &str) -> String {
    let shard_a = id.get(0..2).unwrap_or("__");
    let shard_b = id.get(2..4).unwrap_or("__");
    format!("{shard_a}/{shard_b}/{id}")
}

pub fn resolve(root: &Path, relative: &str) -> PathBuf {
    root.join(relative)
}

pub fn pending_path(path: &Path) -> PathBuf {
    path.with_extension(PENDING_SUFFIX)
}

/// Create `path` and its parents, then confirm it can be listed.
pub fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    let failed = |e: io::Error| StoreError::PathCreation {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };
    fs::create_dir_all(path).map_err(failed)?;
    fs::read_dir(path).map_err(failed)?;
    Ok(())
}

/// Write a blob through a pending file and rename it into place.
///
/// `write` receives the buffered pending file. Any failure, from `write` or
/// from the sync/rename, removes the pending file so nothing partial remains.
pub fn commit_with<T>(
    dest: &Path,
    io_err: impl Fn(io::Error) -> StoreError,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    let tmp = pending_path(dest);
    let result = File::create(&tmp).map_err(&io_err).and_then(|file| {
        let mut writer = BufWriter::new(file);
        let out = write(&mut writer)?;
        writer.flush().map_err(&io_err)?;
        writer.get_ref().sync_all().map_err(&io_err)?;
        drop(writer);
        fs::rename(&tmp, dest).map_err(&io_err)?;
        Ok(out)
    });
    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %e, "could not remove pending blob");
            }
        }
    }
    result
}

/// Outcome of removing a blob. Only `Denied` is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    AlreadyAbsent,
    Denied,
}

impl DeleteOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Denied)
    }
}

pub fn remove_blob(path: &Path) -> DeleteOutcome {
    match fs::remove_file(path) {
        Ok(()) => DeleteOutcome::Removed,
        Err(e) if e.kind() == io::ErrorKind::NotFound => DeleteOutcome::AlreadyAbsent,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "blob removal denied");
            DeleteOutcome::Denied
        }
    }
}

/// Every regular file below `root`.
pub fn walk_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}
