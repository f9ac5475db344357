use arrow::record_batch::RecordBatch;

use super::{EnsembleSummaryProvider, SummaryCore, rows_at_date};
use crate::{
    backing_store::StoreHandle,
    config::DuplicateColumnPolicy,
    frequency::Frequency,
    key::StorageKey,
    metadata::VectorMetadata,
    provider::{ProviderError, error::UnsupportedFrequencySnafu},
};

/// Summary provider whose artifact was resampled once at import.
///
/// Queries are pure reads. A query at any frequency other than the stored
/// one is rejected instead of being resampled again.
#[derive(Debug, Clone)]
pub struct PresampledSummaryProvider {
    core: SummaryCore,
    frequency: Option<Frequency>,
}

impl PresampledSummaryProvider {
    /// Open an artifact sampled at `frequency` (`None` for raw dates).
    pub fn open(
        handle: StoreHandle,
        frequency: Option<Frequency>,
        duplicate_columns: DuplicateColumnPolicy,
    ) -> Result<Self, ProviderError> {
        Ok(PresampledSummaryProvider {
            core: SummaryCore::open(handle, duplicate_columns)?,
            frequency,
        })
    }

    /// Frequency the artifact is stored at.
    pub fn frequency(&self) -> Option<Frequency> {
        self.frequency
    }

    /// Key of the backing artifact.
    pub fn storage_key(&self) -> &StorageKey {
        self.core.key()
    }

    fn check_frequency(&self, requested: Option<Frequency>) -> Result<(), ProviderError> {
        if requested.is_none() || requested == self.frequency {
            return Ok(());
        }
        UnsupportedFrequencySnafu {
            key: self.core.key().as_str(),
            stored: self.frequency,
            requested,
        }
        .fail()
    }
}

impl EnsembleSummaryProvider for PresampledSummaryProvider {
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
        false
    }

    fn dates(
        &self,
        frequency: Option<Frequency>,
        realizations: Option<&[u32]>,
    ) -> Result<Vec<i64>, ProviderError> {
        self.check_frequency(frequency)?;
        self.core.stored_dates(realizations)
    }

    fn get_vectors_df(
        &self,
        vectors: &[&str],
        frequency: Option<Frequency>,
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError> {
        self.check_frequency(frequency)?;
        self.core.read_vectors(vectors, realizations)
    }

    fn get_vectors_for_date_df(
        &self,
        date: i64,
        vectors: &[&str],
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError> {
        let batch = self.core.read_vectors(vectors, realizations)?;
        rows_at_date(&batch, date, self.core.key())
    }
}
