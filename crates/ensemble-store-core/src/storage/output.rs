//! Streaming artifact output through a staging file.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use snafu::ResultExt;
use tokio::fs;

use crate::storage::{IoSnafu, StorageLocation, StorageResult, TempFileGuard, create_parent_dir};

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Hidden staging path next to `target`, unique per process and per call.
pub(crate) fn unique_tmp_path(target: &Path) -> PathBuf {
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}-{seq}.tmp", std::process::id()))
}

/// Streams one artifact to a staging file and publishes it by rename.
///
/// Obtained from [`open_artifact_sink`]. Until [`ArtifactSink::finish`]
/// succeeds the target path is untouched; dropping the sink deletes the
/// staging file.
pub struct ArtifactSink {
    staging: PathBuf,
    target: PathBuf,
    writer: io::BufWriter<std::fs::File>,
    guard: TempFileGuard,
}

impl ArtifactSink {
    /// Buffered writer over the staging file (Parquet needs `Write + Send`).
    pub fn writer(&mut self) -> &mut io::BufWriter<std::fs::File> {
        &mut self.writer
    }

    /// Where the artifact will appear.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flush, fsync and rename the staging file onto the target.
    pub async fn finish(mut self) -> StorageResult<PathBuf> {
        self.writer
            .flush()
            .context(IoSnafu { op: "flush", path: &self.staging })?;
        self.writer
            .get_ref()
            .sync_all()
            .context(IoSnafu { op: "sync", path: &self.staging })?;
        fs::rename(&self.staging, &self.target)
            .await
            .context(IoSnafu { op: "rename into", path: &self.target })?;
        self.guard.disarm();
        Ok(self.target)
    }
}

/// Start writing the artifact at `rel_path` under `location`.
pub async fn open_artifact_sink(location: &StorageLocation, rel_path: &Path) -> StorageResult<ArtifactSink> {
    let target = location.join(rel_path);
    create_parent_dir(&target).await?;

    let staging = unique_tmp_path(&target);
    // Parquet's ArrowWriter needs a blocking std::io::Write.
    let file = std::fs::File::create(&staging).context(IoSnafu { op: "create", path: &staging })?;
    Ok(ArtifactSink {
        guard: TempFileGuard::new(staging.clone()),
        staging,
        target,
        writer: io::BufWriter::new(file),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn finish_renames_into_place() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());

        let mut sink = open_artifact_sink(&location, Path::new("out.bin")).await?;
        sink.writer().write_all(b"payload")?;
        let path = sink.finish().await?;

        assert_eq!(path, tmp.path().join("out.bin"));
        assert_eq!(std::fs::read(&path)?, b"payload");
        assert_eq!(std::fs::read_dir(tmp.path())?.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn dropped_sink_leaves_nothing_behind() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());

        {
            let mut sink = open_artifact_sink(&location, Path::new("partial.bin")).await?;
            sink.writer().write_all(b"half a file")?;
        }

        assert!(!tmp.path().join("partial.bin").exists());
        assert_eq!(std::fs::read_dir(tmp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn tmp_paths_are_unique() {
        let a = unique_tmp_path(Path::new("/x/key.parquet"));
        let b = unique_tmp_path(Path::new("/x/key.parquet"));
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/x")));
    }
}
