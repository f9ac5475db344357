//! Aggregated (multi-ensemble) source files and their key index.
//!
//! An aggregated file holds rows of several ensembles told apart by an
//! `ENSEMBLE` column. It is split once into one artifact per ensemble; the
//! `ensemble -> storage key` mapping is persisted as JSON next to the
//! artifacts so later runs open them without reading the source again.

use std::{collections::BTreeMap, path::PathBuf};

use arrow::{
    array::{AsArray, StringArray},
    compute::{cast, filter_record_batch, kernels::cmp::eq},
    datatypes::DataType,
    error::ArrowError,
    record_batch::RecordBatch,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ENSEMBLE, REAL, REALIZATION, helpers::batch::{distinct_strings, rename_column}, key::StorageKey};

/// Layout version of [`AggregatedIndex`].
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Persisted result of splitting one aggregated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedIndex {
    /// Layout version.
    pub format_version: u32,
    /// The aggregated source file.
    pub source: PathBuf,
    /// When the split was performed.
    pub created_at: DateTime<Utc>,
    /// Ensemble name to artifact key.
    pub ensembles: BTreeMap<String, StorageKey>,
}

impl AggregatedIndex {
    pub(crate) fn new(source: PathBuf, ensembles: BTreeMap<String, StorageKey>) -> Self {
        AggregatedIndex {
            format_version: INDEX_FORMAT_VERSION,
            source,
            created_at: Utc::now(),
            ensembles,
        }
    }
}

/// Rename a `REAL` column to `REALIZATION` when only the former exists.
pub(crate) fn normalize_realization_column(batch: &RecordBatch) -> Result<RecordBatch, ArrowError> {
    let schema = batch.schema();
    if schema.index_of(REALIZATION).is_err() && schema.index_of(REAL).is_ok() {
        return rename_column(batch, REAL, REALIZATION);
    }
    Ok(batch.clone())
}

/// Split `batch` into one batch per distinct `ENSEMBLE` value.
///
/// The `ENSEMBLE` column is kept in each part; the backing store drops it
/// when writing. Rows with a null ensemble are discarded.
pub(crate) fn split_by_ensemble(batch: &RecordBatch) -> Result<Vec<(String, RecordBatch)>, ArrowError> {
    let column = batch
        .column_by_name(ENSEMBLE)
        .ok_or_else(|| ArrowError::SchemaError(format!("no {ENSEMBLE} column")))?;
    let names = cast(column, &DataType::Utf8)?;
    let names = names.as_string::<i32>();

    distinct_strings(column)?
        .into_iter()
        .map(|ensemble| {
            let mask = eq(names, &StringArray::new_scalar(ensemble.as_str()))?;
            Ok((ensemble, filter_record_batch(batch, &mask)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::{
        array::{ArrayRef, Float64Array, Int64Array},
        datatypes::Float64Type,
    };

    #[test]
    fn splits_rows_by_ensemble_value() -> Result<(), Box<dyn std::error::Error>> {
        let batch = RecordBatch::try_from_iter(vec![
            ("ENSEMBLE", Arc::new(StringArray::from(vec![Some("b"), Some("a"), None, Some("b")])) as ArrayRef),
            ("X", Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0, 4.0])) as ArrayRef),
        ])?;
        let parts = split_by_ensemble(&batch)?;
        let names: Vec<&str> = parts.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(parts[0].1.column(1).as_primitive::<Float64Type>().values().to_vec(), vec![2.0]);
        assert_eq!(parts[1].1.column(1).as_primitive::<Float64Type>().values().to_vec(), vec![1.0, 4.0]);
        Ok(())
    }

    #[test]
    fn real_is_renamed_only_when_realization_is_absent() -> Result<(), Box<dyn std::error::Error>> {
        let real = RecordBatch::try_from_iter(vec![("REAL", Arc::new(Int64Array::from(vec![0])) as ArrayRef)])?;
        let renamed = normalize_realization_column(&real)?;
        assert_eq!(renamed.schema().field(0).name(), REALIZATION);

        let both = RecordBatch::try_from_iter(vec![
            ("REALIZATION", Arc::new(Int64Array::from(vec![0])) as ArrayRef),
            ("REAL", Arc::new(Int64Array::from(vec![5])) as ArrayRef),
        ])?;
        assert_eq!(normalize_realization_column(&both)?, both);
        Ok(())
    }

    #[test]
    fn index_round_trips_through_json() -> Result<(), Box<dyn std::error::Error>> {
        let mut ensembles = BTreeMap::new();
        ensembles.insert("iter-0".to_string(), StorageKey::from_validated("aggr-1__iter-0")?);
        let index = AggregatedIndex::new(PathBuf::from("/data/aggr.csv"), ensembles);
        let json = serde_json::to_string(&index)?;
        let back: AggregatedIndex = serde_json::from_str(&json)?;
        assert_eq!(back, index);
        Ok(())
    }
}
