//! Error types for the columnar backing store.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::{Backtrace, prelude::*};

use crate::{error::ErrorCategory, storage::StorageError};

/// Errors writing or reading backing-store artifacts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackingStoreError {
    /// Filesystem failure underneath the store.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// Parquet encoding or decoding failed.
    #[snafu(display("Parquet error for artifact {path}: {source}"))]
    Parquet {
        /// Artifact path.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// An Arrow kernel failed while shaping a batch.
    #[snafu(display("Arrow error for artifact {path}: {source}"))]
    Arrow {
        /// Artifact path.
        path: String,
        /// Underlying Arrow error.
        source: ArrowError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The table handed to `write` mixes ensembles.
    #[snafu(display(
        "Table for {key} holds {} ENSEMBLE values ({}); exactly one is allowed",
        values.len(),
        values.join(", ")
    ))]
    MultipleEnsembleValues {
        /// Storage key being written.
        key: String,
        /// Distinct ensemble values found.
        values: Vec<String>,
    },

    /// The artifact is shorter than a Parquet header and footer.
    #[snafu(display("Artifact {path} is truncated ({len} bytes)"))]
    TooShort {
        /// Artifact path.
        path: String,
        /// Actual length in bytes.
        len: usize,
    },

    /// The artifact records a different storage key than the one requested.
    #[snafu(display("Artifact {path} was written for key '{found}', expected '{expected}'"))]
    KeyMismatch {
        /// Artifact path.
        path: String,
        /// Key that was requested.
        expected: String,
        /// Key recorded in the artifact (`<none>` if absent).
        found: String,
    },

    /// A requested column does not exist in the artifact.
    #[snafu(display("Column '{column}' does not exist in artifact {key}"))]
    UnknownColumn {
        /// Storage key of the artifact.
        key: String,
        /// The missing column.
        column: String,
    },

    /// The realization column holds a null, negative or oversized value.
    #[snafu(display("Invalid realization value in {key}.{column}: {detail}"))]
    InvalidRealization {
        /// Storage key of the artifact.
        key: String,
        /// Realization column name.
        column: String,
        /// What is wrong with the value.
        detail: String,
    },
}

impl BackingStoreError {
    /// Classify this error for callers that only need the broad kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            BackingStoreError::Storage { source } => source.category(),
            BackingStoreError::Parquet { .. }
            | BackingStoreError::MultipleEnsembleValues { .. }
            | BackingStoreError::TooShort { .. }
            | BackingStoreError::KeyMismatch { .. }
            | BackingStoreError::InvalidRealization { .. } => ErrorCategory::Format,
            BackingStoreError::UnknownColumn { .. } => ErrorCategory::InvalidRequest,
            BackingStoreError::Arrow { .. } => ErrorCategory::Internal,
        }
    }
}
