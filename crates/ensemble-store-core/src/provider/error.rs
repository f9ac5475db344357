//! Error types for table and summary providers.

use arrow::error::ArrowError;
use snafu::prelude::*;

use crate::{
    backing_store::BackingStoreError, error::ErrorCategory, frequency::Frequency,
    metadata::MetadataError, resampling::ResamplingError,
};

fn describe(freq: &Option<Frequency>) -> &'static str {
    freq.map_or("raw", Frequency::tag)
}

/// Errors opening or querying a provider.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    /// Reading the backing artifact failed.
    #[snafu(display("Backing store error: {source}"))]
    BackingStore {
        /// Underlying backing-store error.
        source: BackingStoreError,
    },

    /// Query-time resampling failed.
    #[snafu(display("Resampling error: {source}"))]
    Resampling {
        /// Underlying resampling error.
        source: ResamplingError,
    },

    /// Vector metadata stored in the artifact is malformed.
    #[snafu(display("Artifact {key} has malformed vector metadata: {source}"))]
    Metadata {
        /// Storage key of the artifact.
        key: String,
        /// Underlying metadata error.
        source: MetadataError,
    },

    /// An Arrow kernel failed while shaping a result.
    #[snafu(display("Arrow error in provider {key}: {source}"))]
    Arrow {
        /// Storage key of the artifact.
        key: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The artifact lacks a column every provider of its kind needs.
    #[snafu(display("Artifact {key} has no '{column}' column"))]
    MissingRequiredColumn {
        /// Storage key of the artifact.
        key: String,
        /// The missing column.
        column: &'static str,
    },

    /// No columns were requested.
    #[snafu(display("At least one column must be requested"))]
    EmptyColumnRequest,

    /// The same column was requested more than once.
    #[snafu(display("Duplicate columns requested: {}", columns.join(", ")))]
    DuplicateColumns {
        /// Names requested more than once.
        columns: Vec<String>,
    },

    /// Requested columns do not exist in the provider.
    #[snafu(display("Unknown columns requested from {key}: {}", columns.join(", ")))]
    UnknownColumns {
        /// Storage key of the artifact.
        key: String,
        /// The unknown names.
        columns: Vec<String>,
    },

    /// A presampled provider was queried at another frequency.
    #[snafu(display(
        "Provider {key} stores {} data and cannot serve {}",
        describe(stored),
        describe(requested)
    ))]
    UnsupportedFrequency {
        /// Storage key of the artifact.
        key: String,
        /// Frequency the artifact was sampled at.
        stored: Option<Frequency>,
        /// Frequency the caller asked for.
        requested: Option<Frequency>,
    },
}

impl ProviderError {
    /// Classify this error for callers that only need the broad kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::BackingStore { source } => source.category(),
            ProviderError::Resampling { source } => match source {
                ResamplingError::Arrow { .. } => ErrorCategory::Internal,
                _ => ErrorCategory::Format,
            },
            ProviderError::Metadata { .. } | ProviderError::MissingRequiredColumn { .. } => {
                ErrorCategory::Format
            }
            ProviderError::Arrow { .. } => ErrorCategory::Internal,
            ProviderError::EmptyColumnRequest
            | ProviderError::DuplicateColumns { .. }
            | ProviderError::UnknownColumns { .. }
            | ProviderError::UnsupportedFrequency { .. } => ErrorCategory::InvalidRequest,
        }
    }
}
