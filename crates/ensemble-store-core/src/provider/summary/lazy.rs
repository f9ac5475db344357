use arrow::record_batch::RecordBatch;
use snafu::prelude::*;

use super::{EnsembleSummaryProvider, SummaryCore, drop_date};
use crate::{
    backing_store::StoreHandle,
    config::DuplicateColumnPolicy,
    frequency::Frequency,
    key::StorageKey,
    metadata::VectorMetadata,
    provider::{ProviderError, error::ResamplingSnafu},
    resampling::resample_table,
};

/// Summary provider over raw dates that resamples on every query.
///
/// Sample dates for a frequency span the whole artifact's date range, so a
/// realization filter never shifts them.
#[derive(Debug, Clone)]
pub struct LazySummaryProvider {
    core: SummaryCore,
}

impl LazySummaryProvider {
    /// Open an artifact holding raw (unresampled) dates.
    pub fn open(handle: StoreHandle, duplicate_columns: DuplicateColumnPolicy) -> Result<Self, ProviderError> {
        Ok(LazySummaryProvider {
            core: SummaryCore::open(handle, duplicate_columns)?,
        })
    }

    /// Key of the backing artifact.
    pub fn storage_key(&self) -> &StorageKey {
        self.core.key()
    }

    fn sample_dates(&self, frequency: Frequency) -> Vec<i64> {
        match self.core.date_range {
            Some((min, max)) => frequency.normalized_sample_dates(min, max),
            None => Vec::new(),
        }
    }
}

impl EnsembleSummaryProvider for LazySummaryProvider {
    fn vector_names(&self) -> Vec<String> {
        self.core.vector_names.clone()
    }

    fn realizations(&self) -> Vec<u32> {
        self.core.table.realizations().to_vec()
    }

    fn vector_metadata(&self, vector: &str) -> Option<VectorMetadata> {
        self.core.metadata.get(vector).cloned()
    }

    fn supports_resampling(&self) -> bool {
        true
    }

    fn dates(
        &self,
        frequency: Option<Frequency>,
        realizations: Option<&[u32]>,
    ) -> Result<Vec<i64>, ProviderError> {
        match frequency {
            None => self.core.stored_dates(realizations),
            Some(f) => Ok(self.sample_dates(f)),
        }
    }

    fn get_vectors_df(
        &self,
        vectors: &[&str],
        frequency: Option<Frequency>,
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError> {
        let raw = self.core.read_vectors(vectors, realizations)?;
        match frequency {
            None => Ok(raw),
            Some(f) => {
                log::debug!("resampling {} to {f} at query time", self.core.key());
                resample_table(&raw, &self.sample_dates(f)).context(ResamplingSnafu)
            }
        }
    }

    fn get_vectors_for_date_df(
        &self,
        date: i64,
        vectors: &[&str],
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError> {
        let raw = self.core.read_vectors(vectors, realizations)?;
        let sampled = resample_table(&raw, &[date]).context(ResamplingSnafu)?;
        drop_date(&sampled, self.core.key())
    }
}
