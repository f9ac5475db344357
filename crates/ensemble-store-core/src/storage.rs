//! Storage-root access and atomic file primitives.
//!
//! This module centralizes all filesystem access of `ensemble-store-core`.
//! Higher layers (`backing_store`, `factory`) work with a
//! [`StorageLocation`] plus relative paths produced by [`layout`], and use
//! the helpers here for:
//!
//! - atomic whole-file writes (write-then-rename) for small JSON indexes,
//! - streaming atomic writes for artifacts ([`output::open_artifact_sink`]),
//! - read-only memory mapping of artifacts ([`map_readonly`]).
//!
//! Only the local filesystem is supported.

pub mod error;
pub mod layout;
pub mod output;

use std::{
    io,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use memmap2::Mmap;
use snafu::prelude::*;
use tokio::{fs, io::AsyncWriteExt};

pub use error::StorageError;
use error::{IoSnafu, MapSnafu, NotFoundSnafu};
pub use output::{ArtifactSink, open_artifact_sink};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root directory under which artifacts and indexes are stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageLocation {
    /// A storage root on the local filesystem.
    Local(PathBuf),
}

impl StorageLocation {
    /// Storage root at a local directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StorageLocation::Local(root.into())
    }

    /// Absolute path of `rel` under this root.
    pub fn join(&self, rel: &Path) -> PathBuf {
        match self {
            StorageLocation::Local(root) => root.join(rel),
        }
    }

    /// The root directory itself.
    pub fn root(&self) -> &Path {
        match self {
            StorageLocation::Local(root) => root,
        }
    }
}

pub(crate) async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    match abs.parent() {
        Some(parent) => fs::create_dir_all(parent)
            .await
            .context(IoSnafu { op: "create directory", path: parent }),
        None => Ok(()),
    }
}

/// Removes a temporary file on drop unless disarmed.
pub(crate) struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Call after a successful rename.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Replace `rel_path` with `contents` in one step.
///
/// The payload goes to a temporary sibling, is synced, then renamed over
/// the target. A reader sees the old file, the new one, or nothing.
pub async fn write_atomic(
    location: &StorageLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let target = location.join(rel_path);
    create_parent_dir(&target).await?;

    let tmp = output::unique_tmp_path(&target);
    let mut guard = TempFileGuard::new(tmp.clone());

    let mut file = fs::File::create(&tmp)
        .await
        .context(IoSnafu { op: "create", path: &tmp })?;
    file.write_all(contents)
        .await
        .context(IoSnafu { op: "write", path: &tmp })?;
    file.sync_all()
        .await
        .context(IoSnafu { op: "sync", path: &tmp })?;
    drop(file);

    fs::rename(&tmp, &target)
        .await
        .context(IoSnafu { op: "rename into", path: &target })?;
    guard.disarm();
    Ok(())
}

/// Contents of `rel_path` as UTF-8.
///
/// A missing file is [`StorageError::NotFound`] so callers can tell "never
/// written" apart from a real failure.
pub async fn read_to_string(location: &StorageLocation, rel_path: &Path) -> StorageResult<String> {
    let path = location.join(rel_path);
    match fs::read_to_string(&path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e).context(NotFoundSnafu { path }),
        other => other.context(IoSnafu { op: "read", path }),
    }
}

/// Memory-map `rel_path` read-only and expose it as [`Bytes`].
///
/// Returns `Ok(None)` if the file does not exist. Slices of the returned
/// buffer share the mapping, which lives until the last slice is dropped.
pub fn map_readonly(location: &StorageLocation, rel_path: &Path) -> StorageResult<Option<Bytes>> {
    let path = location.join(rel_path);
    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context(IoSnafu { op: "open", path }),
    };

    let len = file
        .metadata()
        .context(IoSnafu { op: "stat", path: &path })?
        .len();
    // Zero-length mappings are rejected on some platforms.
    if len == 0 {
        return Ok(Some(Bytes::new()));
    }

    // SAFETY: artifacts are created by rename and never opened for writing
    // afterwards, so the mapped bytes cannot change underneath us.
    let mmap = unsafe { Mmap::map(&file) }.context(MapSnafu { path })?;
    Ok(Some(Bytes::from_owner(mmap)))
}

/// Whether `rel_path` exists under `location`.
pub async fn exists(location: &StorageLocation, rel_path: &Path) -> StorageResult<bool> {
    let path = location.join(rel_path);
    fs::try_exists(&path)
        .await
        .context(IoSnafu { op: "check", path })
}
