//! Read handle over one memory-mapped artifact.

use std::{collections::BTreeMap, fmt, path::Path, path::PathBuf, sync::Arc};

use arrow::{
    array::{AsArray, BooleanArray},
    compute::{cast, concat_batches},
    datatypes::{DataType, Int64Type, SchemaRef},
    record_batch::{RecordBatch, RecordBatchReader},
};
use bytes::Bytes;
use parquet::arrow::{
    ProjectionMask,
    arrow_reader::{
        ArrowPredicateFn, ArrowReaderMetadata, ParquetRecordBatchReaderBuilder, RowFilter,
    },
};
use roaring::RoaringBitmap;
use snafu::prelude::*;

use super::{
    BackingStoreError,
    error::{ArrowSnafu, InvalidRealizationSnafu, ParquetSnafu, UnknownColumnSnafu},
    stats::{ColumnRange, chunk_range, column_ranges},
};
use crate::key::StorageKey;

/// Rows to keep when reading: those whose realization column is in the set.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizationFilter {
    /// Realization column to test.
    pub column: String,
    /// Realizations to keep.
    pub realizations: RoaringBitmap,
}

impl RealizationFilter {
    /// Keep rows of `realizations` in `column`.
    pub fn new(column: impl Into<String>, realizations: impl IntoIterator<Item = u32>) -> Self {
        RealizationFilter {
            column: column.into(),
            realizations: realizations.into_iter().collect(),
        }
    }
}

struct Inner {
    key: StorageKey,
    path: PathBuf,
    data: Bytes,
    metadata: ArrowReaderMetadata,
    ranges: BTreeMap<String, ColumnRange>,
}

/// Open artifact. Cloning is cheap; all clones share one mapping.
///
/// The file stays mapped until the last clone is dropped.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<Inner>,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("key", &self.inner.key)
            .field("path", &self.inner.path)
            .field("len", &self.inner.data.len())
            .finish()
    }
}

impl StoreHandle {
    pub(crate) fn new(
        key: StorageKey,
        path: PathBuf,
        data: Bytes,
        metadata: ArrowReaderMetadata,
    ) -> Self {
        let ranges = column_ranges(metadata.metadata(), metadata.schema());
        StoreHandle {
            inner: Arc::new(Inner {
                key,
                path,
                data,
                metadata,
                ranges,
            }),
        }
    }

    /// Storage key the artifact was written under.
    pub fn key(&self) -> &StorageKey {
        &self.inner.key
    }

    /// Path of the artifact file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Arrow schema, including per-field metadata.
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(self.inner.metadata.schema())
    }

    /// Total number of rows.
    pub fn num_rows(&self) -> usize {
        usize::try_from(self.inner.metadata.metadata().file_metadata().num_rows()).unwrap_or(0)
    }

    /// Number of Parquet row groups.
    pub fn num_row_groups(&self) -> usize {
        self.inner.metadata.metadata().num_row_groups()
    }

    /// Cached min/max of a numeric or timestamp column.
    pub fn column_range(&self, column: &str) -> Option<ColumnRange> {
        self.inner.ranges.get(column).copied()
    }

    fn path_str(&self) -> String {
        self.inner.path.display().to_string()
    }

    fn column_index(&self, column: &str) -> Result<usize, BackingStoreError> {
        self.inner
            .metadata
            .schema()
            .index_of(column)
            .ok()
            .context(UnknownColumnSnafu {
                key: self.inner.key.as_str(),
                column,
            })
    }

    /// Row groups that may hold any of `realizations`, judged by statistics.
    fn candidate_row_groups(&self, column_idx: usize, realizations: &RoaringBitmap) -> Vec<usize> {
        self.inner
            .metadata
            .metadata()
            .row_groups()
            .iter()
            .enumerate()
            .filter(|(_, rg)| {
                let Some((min, max)) = rg
                    .column(column_idx)
                    .statistics()
                    .and_then(chunk_range)
                    .and_then(|r| r.as_i64())
                else {
                    return true;
                };
                if max < 0 || min > i64::from(u32::MAX) {
                    return false;
                }
                let lo = min.max(0) as u32;
                let hi = max.min(i64::from(u32::MAX)) as u32;
                realizations.range_cardinality(lo..=hi) > 0
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Decode `columns` (in the requested order), optionally keeping only
    /// rows whose realization is in `filter`.
    ///
    /// Row groups that cannot contain a requested realization are skipped
    /// without decoding; surviving rows are filtered exactly while decoding.
    pub fn read_columns(
        &self,
        columns: &[&str],
        filter: Option<&RealizationFilter>,
    ) -> Result<RecordBatch, BackingStoreError> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>, _>>()?;

        let parquet_schema = self.inner.metadata.parquet_schema();
        let mut builder = ParquetRecordBatchReaderBuilder::new_with_metadata(
            self.inner.data.clone(),
            self.inner.metadata.clone(),
        )
        .with_projection(ProjectionMask::roots(parquet_schema, indices.iter().copied()));

        if let Some(filter) = filter {
            let real_idx = self.column_index(&filter.column)?;
            builder = builder.with_row_groups(self.candidate_row_groups(real_idx, &filter.realizations));

            let keep = filter.realizations.clone();
            let predicate = ArrowPredicateFn::new(
                ProjectionMask::roots(parquet_schema, [real_idx]),
                move |batch: RecordBatch| {
                    let ints = cast(batch.column(0), &DataType::Int64)?;
                    Ok(ints
                        .as_primitive::<Int64Type>()
                        .iter()
                        .map(|v| {
                            Some(v.is_some_and(|v| {
                                u32::try_from(v).is_ok_and(|r| keep.contains(r))
                            }))
                        })
                        .collect::<BooleanArray>())
                },
            );
            builder = builder.with_row_filter(RowFilter::new(vec![Box::new(predicate)]));
        }

        let reader = builder.build().context(ParquetSnafu {
            path: self.path_str(),
        })?;
        let projected = reader.schema();
        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .context(ArrowSnafu {
                path: self.path_str(),
            })?;
        let merged = concat_batches(&projected, &batches).context(ArrowSnafu {
            path: self.path_str(),
        })?;

        let order = columns
            .iter()
            .map(|c| projected.index_of(c))
            .collect::<Result<Vec<_>, _>>()
            .context(ArrowSnafu {
                path: self.path_str(),
            })?;
        merged.project(&order).context(ArrowSnafu {
            path: self.path_str(),
        })
    }

    /// Distinct values of the realization column `column`.
    pub fn distinct_realizations(&self, column: &str) -> Result<RoaringBitmap, BackingStoreError> {
        let batch = self.read_columns(&[column], None)?;
        let ints = cast(batch.column(0), &DataType::Int64).context(ArrowSnafu {
            path: self.path_str(),
        })?;

        let mut out = RoaringBitmap::new();
        for value in ints.as_primitive::<Int64Type>().iter() {
            let value = value.context(InvalidRealizationSnafu {
                key: self.inner.key.as_str(),
                column,
                detail: "null",
            })?;
            let real = u32::try_from(value).ok().context(InvalidRealizationSnafu {
                key: self.inner.key.as_str(),
                column,
                detail: format!("{value} is not a non-negative 32-bit integer"),
            })?;
            out.insert(real);
        }
        Ok(out)
    }
}
