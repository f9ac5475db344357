//! Columnar backing store.
//!
//! A backing store turns one ensemble's table into an immutable Parquet
//! artifact named after its [`StorageKey`] and reopens it by memory-mapping
//! the file. Writing is atomic: the artifact is streamed to a temporary file
//! and renamed into place, so [`BackingStore::open`] sees either a complete
//! artifact or none at all.
//!
//! The footer records the storage key and a format version. Column
//! statistics are enabled so a [`StoreHandle`] can answer min/max queries
//! and prune row groups by realization without decoding data.

pub mod error;
mod handle;
mod stats;

use std::path::PathBuf;

use arrow::record_batch::RecordBatch;
use parquet::{
    arrow::{ArrowWriter, arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions}},
    basic::Compression,
    file::{
        metadata::KeyValue,
        properties::{EnabledStatistics, WriterProperties},
    },
};
use snafu::prelude::*;

pub use error::BackingStoreError;
pub use handle::{RealizationFilter, StoreHandle};
pub use stats::ColumnRange;

use crate::{
    ENSEMBLE,
    helpers::batch::{distinct_strings, drop_column, sort_batch},
    key::StorageKey,
    storage::{self, StorageLocation, layout},
};
use error::{
    ArrowSnafu, KeyMismatchSnafu, MultipleEnsembleValuesSnafu, ParquetSnafu, StorageSnafu,
    TooShortSnafu,
};

/// Version of the artifact layout written by this crate.
pub const FORMAT_VERSION: &str = "1";

const META_STORAGE_KEY: &str = "ensemble_store.storage_key";
const META_FORMAT_VERSION: &str = "ensemble_store.format_version";

/// "PAR1" magic at both ends plus the 4-byte footer length.
const MIN_PARQUET_LEN: usize = 12;

/// Options controlling how an artifact is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Columns to sort by (ascending, lexicographic) before writing.
    pub sort_by: Vec<String>,
    /// Maximum rows per row group.
    pub row_group_size: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            sort_by: Vec::new(),
            row_group_size: 64 * 1024,
        }
    }
}

impl WriteOptions {
    /// Sort by `columns` before writing.
    pub fn sorted_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the maximum row-group size.
    pub fn with_row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = rows.max(1);
        self
    }
}

/// Artifact store rooted at one storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingStore {
    location: StorageLocation,
}

impl BackingStore {
    /// Store rooted at `location`.
    pub fn new(location: StorageLocation) -> Self {
        BackingStore { location }
    }

    /// The storage root.
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Absolute path the artifact for `key` lives at.
    pub fn artifact_path(&self, key: &StorageKey) -> PathBuf {
        self.location.join(&layout::artifact_rel_path(key))
    }

    /// Whether an artifact for `key` exists.
    pub async fn exists(&self, key: &StorageKey) -> Result<bool, BackingStoreError> {
        storage::exists(&self.location, &layout::artifact_rel_path(key))
            .await
            .context(StorageSnafu)
    }

    /// Write `batch` as the artifact for `key` and return its path.
    ///
    /// An `ENSEMBLE` column, if present, must hold a single distinct value;
    /// it is dropped since the key already identifies the ensemble.
    pub async fn write(
        &self,
        key: &StorageKey,
        batch: &RecordBatch,
        options: &WriteOptions,
    ) -> Result<PathBuf, BackingStoreError> {
        let rel = layout::artifact_rel_path(key);
        let path = self.location.join(&rel).display().to_string();

        let mut batch = batch.clone();
        if let Some(ensemble) = batch.column_by_name(ENSEMBLE) {
            let values = distinct_strings(ensemble).context(ArrowSnafu { path: path.as_str() })?;
            ensure!(
                values.len() <= 1,
                MultipleEnsembleValuesSnafu {
                    key: key.as_str(),
                    values: values.into_iter().collect::<Vec<_>>(),
                }
            );
            batch = drop_column(&batch, ENSEMBLE).context(ArrowSnafu { path: path.as_str() })?;
        }

        if !options.sort_by.is_empty() {
            let by: Vec<&str> = options.sort_by.iter().map(String::as_str).collect();
            batch = sort_batch(&batch, &by).context(ArrowSnafu { path: path.as_str() })?;
        }

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_statistics_enabled(EnabledStatistics::Chunk)
            .set_max_row_group_size(options.row_group_size.max(1))
            .set_key_value_metadata(Some(vec![
                KeyValue::new(META_STORAGE_KEY.to_string(), key.as_str().to_string()),
                KeyValue::new(META_FORMAT_VERSION.to_string(), FORMAT_VERSION.to_string()),
            ]))
            .build();

        let mut sink = storage::open_artifact_sink(&self.location, &rel)
            .await
            .context(StorageSnafu)?;
        {
            let mut writer = ArrowWriter::try_new(sink.writer(), batch.schema(), Some(props))
                .context(ParquetSnafu { path: path.as_str() })?;
            writer
                .write(&batch)
                .context(ParquetSnafu { path: path.as_str() })?;
            writer
                .close()
                .context(ParquetSnafu { path: path.as_str() })?;
        }
        let written = sink.finish().await.context(StorageSnafu)?;

        log::debug!(
            "wrote artifact {key} ({} rows, {} columns) to {}",
            batch.num_rows(),
            batch.num_columns(),
            written.display()
        );
        Ok(written)
    }

    /// Open the artifact for `key`, or `None` if it has not been written.
    ///
    /// Only the footer is parsed; column data stays in the mapping until a
    /// read asks for it.
    pub fn open(&self, key: &StorageKey) -> Result<Option<StoreHandle>, BackingStoreError> {
        let rel = layout::artifact_rel_path(key);
        let abs = self.location.join(&rel);
        let path = abs.display().to_string();

        let Some(data) = storage::map_readonly(&self.location, &rel).context(StorageSnafu)? else {
            return Ok(None);
        };
        ensure!(
            data.len() >= MIN_PARQUET_LEN,
            TooShortSnafu {
                path: path.as_str(),
                len: data.len(),
            }
        );

        let metadata = ArrowReaderMetadata::load(&data, ArrowReaderOptions::default())
            .context(ParquetSnafu { path: path.as_str() })?;

        let recorded = metadata
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .and_then(|kvs| kvs.iter().find(|kv| kv.key == META_STORAGE_KEY))
            .and_then(|kv| kv.value.clone());
        ensure!(
            recorded.as_deref() == Some(key.as_str()),
            KeyMismatchSnafu {
                path: path.as_str(),
                expected: key.as_str(),
                found: recorded.unwrap_or_else(|| "<none>".to_string()),
            }
        );

        Ok(Some(StoreHandle::new(key.clone(), abs, data, metadata)))
    }
}
