//! Summary (time-series) providers.
//!
//! A summary artifact holds `[DATE, REAL, vectors...]` sorted by
//! `(DATE, REAL)`. Vector metadata of each column is decoded from field
//! metadata once at open time.

mod lazy;
mod presampled;

use std::{collections::{BTreeSet, HashMap}, fmt};

use arrow::{array::BooleanArray, compute::filter_record_batch, record_batch::RecordBatch};
use snafu::prelude::*;

pub use lazy::LazySummaryProvider;
pub use presampled::PresampledSummaryProvider;

use super::{
    EnsembleTableProvider, ProviderError, resolve_column_request,
    error::{ArrowSnafu, MetadataSnafu, MissingRequiredColumnSnafu},
};
use crate::{
    DATE, REAL,
    backing_store::StoreHandle,
    config::DuplicateColumnPolicy,
    frequency::Frequency,
    helpers::batch::as_i64,
    key::StorageKey,
    metadata::VectorMetadata,
};

/// Query interface shared by every summary provider.
///
/// Dates are milliseconds since the Unix epoch (UTC). `None` as a frequency
/// means the stored (raw or presampled) dates.
pub trait EnsembleSummaryProvider: Send + Sync + fmt::Debug {
    /// Vector names, in storage order.
    fn vector_names(&self) -> Vec<String>;

    /// Distinct realizations, ascending.
    fn realizations(&self) -> Vec<u32>;

    /// Metadata of `vector`, if it has any.
    fn vector_metadata(&self, vector: &str) -> Option<VectorMetadata>;

    /// Whether the provider can resample at query time.
    fn supports_resampling(&self) -> bool;

    /// Distinct dates at `frequency`, ascending.
    fn dates(
        &self,
        frequency: Option<Frequency>,
        realizations: Option<&[u32]>,
    ) -> Result<Vec<i64>, ProviderError>;

    /// `[DATE, REAL, vectors...]` at `frequency`, sorted by `(DATE, REAL)`.
    fn get_vectors_df(
        &self,
        vectors: &[&str],
        frequency: Option<Frequency>,
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError>;

    /// `[REAL, vectors...]` at one date, ascending by `REAL`.
    fn get_vectors_for_date_df(
        &self,
        date: i64,
        vectors: &[&str],
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError>;
}

/// State shared by the presampled and lazy providers.
#[derive(Debug, Clone)]
struct SummaryCore {
    table: EnsembleTableProvider,
    vector_names: Vec<String>,
    metadata: HashMap<String, VectorMetadata>,
    date_range: Option<(i64, i64)>,
}

impl SummaryCore {
    fn open(handle: StoreHandle, duplicate_columns: DuplicateColumnPolicy) -> Result<Self, ProviderError> {
        let table = EnsembleTableProvider::with_realization_column(handle, REAL, duplicate_columns)?;
        let key = table.storage_key().as_str().to_string();
        let schema = table.handle().schema();
        ensure!(
            schema.index_of(DATE).is_ok(),
            MissingRequiredColumnSnafu { key: key.as_str(), column: DATE }
        );

        let vector_names: Vec<String> = table
            .column_names()
            .iter()
            .filter(|name| name.as_str() != DATE)
            .cloned()
            .collect();

        let mut metadata = HashMap::new();
        for field in schema.fields() {
            if field.name() == DATE || field.name() == REAL {
                continue;
            }
            if let Some(meta) =
                VectorMetadata::from_field(field).context(MetadataSnafu { key: key.as_str() })?
            {
                metadata.insert(field.name().clone(), meta);
            }
        }

        let date_range = table.column_range(DATE).and_then(|r| r.as_i64());

        Ok(SummaryCore {
            table,
            vector_names,
            metadata,
            date_range,
        })
    }

    fn key(&self) -> &StorageKey {
        self.table.storage_key()
    }

    /// Read `[DATE, REAL, vectors...]` after validating `vectors`.
    fn read_vectors(
        &self,
        vectors: &[&str],
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError> {
        let resolved = resolve_column_request(
            vectors,
            &self.vector_names,
            self.table.duplicate_columns(),
            self.key().as_str(),
        )?;
        let mut columns = Vec::with_capacity(resolved.len() + 2);
        columns.extend([DATE, REAL]);
        columns.extend(resolved);
        self.table.read_columns(&columns, realizations)
    }

    /// Distinct stored dates, ascending.
    fn stored_dates(&self, realizations: Option<&[u32]>) -> Result<Vec<i64>, ProviderError> {
        let batch = self.table.read_columns(&[DATE], realizations)?;
        let dates = as_i64(batch.column(0)).context(ArrowSnafu { key: self.key().as_str() })?;
        let distinct: BTreeSet<i64> = dates.iter().flatten().collect();
        Ok(distinct.into_iter().collect())
    }
}

/// Keep rows whose `DATE` equals `date` and drop the `DATE` column.
fn rows_at_date(batch: &RecordBatch, date: i64, key: &StorageKey) -> Result<RecordBatch, ProviderError> {
    let dates = as_i64(batch.column(0)).context(ArrowSnafu { key: key.as_str() })?;
    let mask: BooleanArray = dates
        .iter()
        .map(|d| Some(d == Some(date)))
        .collect();
    let filtered = filter_record_batch(batch, &mask).context(ArrowSnafu { key: key.as_str() })?;
    drop_date(&filtered, key)
}

fn drop_date(batch: &RecordBatch, key: &StorageKey) -> Result<RecordBatch, ProviderError> {
    let keep: Vec<usize> = (1..batch.num_columns()).collect();
    batch.project(&keep).context(ArrowSnafu { key: key.as_str() })
}
