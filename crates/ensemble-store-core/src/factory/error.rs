//! Error types for provider construction.

use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::{Backtrace, prelude::*};

use crate::{
    backing_store::BackingStoreError, config::ConfigError, error::ErrorCategory,
    provider::ProviderError, provider_set::ProviderSetError, resampling::ResamplingError, storage::StorageError,
};

/// Errors raised while discovering, converting or opening ensemble data.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FactoryError {
    /// The store configuration is invalid.
    #[snafu(display("Invalid store configuration: {source}"))]
    Config {
        /// Underlying configuration error.
        source: ConfigError,
    },

    /// Writing or opening an artifact failed.
    #[snafu(display("Backing store error: {source}"))]
    BackingStore {
        /// Underlying backing-store error.
        source: BackingStoreError,
    },

    /// A provider could not be opened over its artifact.
    #[snafu(display("Provider error: {source}"))]
    Provider {
        /// Underlying provider error.
        source: ProviderError,
    },

    /// The providers could not be collected into a set.
    #[snafu(display("Provider set error: {source}"))]
    ProviderSet {
        /// Underlying provider-set error.
        source: ProviderSetError,
    },

    /// Reading or writing the aggregated-file index failed.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// Import-time resampling failed.
    #[snafu(display("Resampling error while importing ensemble '{ensemble}': {source}"))]
    Resampling {
        /// Ensemble being imported.
        ensemble: String,
        /// Underlying resampling error.
        source: ResamplingError,
    },

    /// The ensemble path is not a valid glob pattern.
    #[snafu(display("Invalid ensemble path pattern '{pattern}': {source}"))]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Underlying pattern error.
        source: glob::PatternError,
    },

    /// A column allow-list entry is not a valid glob pattern.
    #[snafu(display("Invalid column key '{pattern}': {source}"))]
    InvalidColumnKey {
        /// The rejected pattern.
        pattern: String,
        /// Underlying pattern error.
        source: glob::PatternError,
    },

    /// A path matched by a glob could not be read.
    #[snafu(display("Error while expanding '{pattern}': {source}"))]
    Glob {
        /// The pattern being expanded.
        pattern: String,
        /// Underlying glob error.
        source: glob::GlobError,
    },

    /// The ensemble path matched no realization directories.
    #[snafu(display("Ensemble '{ensemble}' has no realizations at {}", path.display()))]
    NoRealizations {
        /// Ensemble name.
        ensemble: String,
        /// The ensemble path pattern.
        path: PathBuf,
    },

    /// No realization of the ensemble has the requested source file.
    #[snafu(display("Ensemble '{ensemble}' has no data matching '{pattern}'"))]
    NoSourceData {
        /// Ensemble name.
        ensemble: String,
        /// Relative file pattern.
        pattern: String,
    },

    /// None of the requested ensembles has data.
    #[snafu(display("No ensemble has data matching '{pattern}' (tried: {})", ensembles.join(", ")))]
    AllEnsemblesMissing {
        /// Relative file pattern.
        pattern: String,
        /// Every requested ensemble.
        ensembles: Vec<String>,
    },

    /// The same ensemble name was requested twice.
    #[snafu(display("Ensemble '{ensemble}' was requested more than once"))]
    DuplicateEnsemble {
        /// The repeated name.
        ensemble: String,
    },

    /// A realization has more than one file matching the pattern.
    #[snafu(display(
        "Realization {realization} of ensemble '{ensemble}' has {} files matching '{pattern}': {}",
        matches.len(),
        matches.join(", ")
    ))]
    MultipleSourceFiles {
        /// Ensemble name.
        ensemble: String,
        /// Realization number.
        realization: u32,
        /// Relative file pattern.
        pattern: String,
        /// Every matching path.
        matches: Vec<String>,
    },

    /// Writes are disallowed and the artifact does not exist.
    #[snafu(display(
        "Artifact {key} for ensemble '{ensemble}' (pattern '{pattern}') does not exist and writes are disabled (portable mode)"
    ))]
    ArtifactNotFound {
        /// Ensemble name (or the aggregated source path).
        ensemble: String,
        /// Requested file pattern (or the aggregated source path).
        pattern: String,
        /// Storage key that was looked up.
        key: String,
    },

    /// A source file could not be opened or read.
    #[snafu(display("Failed to read source file {}: {source}", path.display()))]
    SourceIo {
        /// The source file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A source file could not be decoded as Arrow IPC or CSV.
    #[snafu(display("Failed to decode source file {}: {source}", path.display()))]
    SourceDecode {
        /// The source file.
        path: PathBuf,
        /// Underlying Arrow error.
        source: ArrowError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A Parquet source file could not be decoded.
    #[snafu(display("Failed to decode Parquet source file {}: {source}", path.display()))]
    SourceParquet {
        /// The source file.
        path: PathBuf,
        /// Underlying Parquet error.
        source: ParquetError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The source file extension is not one of the supported formats.
    #[snafu(display(
        "Unsupported source file {} (expected .arrow, .feather, .parquet or .csv)",
        path.display()
    ))]
    UnsupportedSourceFormat {
        /// The source file.
        path: PathBuf,
    },

    /// A `parameters.txt` line is not `NAME VALUE`.
    #[snafu(display("Malformed line {line} in {}: '{content}'", path.display()))]
    InvalidParameterLine {
        /// The parameters file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// A required column is missing from a source file.
    #[snafu(display("Source file {} has no '{column}' column", path.display()))]
    MissingSourceColumn {
        /// The source file.
        path: PathBuf,
        /// The missing column.
        column: &'static str,
    },

    /// The aggregated-file index is not valid JSON for this layout.
    #[snafu(display("Malformed aggregated index {path}: {source}"))]
    IndexFormat {
        /// Index file path.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The aggregated-file index was written by an incompatible version.
    #[snafu(display("Aggregated index {path} has format version {found}, expected {expected}"))]
    IndexVersion {
        /// Index file path.
        path: String,
        /// Version in the file.
        found: u32,
        /// Version this crate writes.
        expected: u32,
    },

    /// A conversion task panicked or was cancelled.
    #[snafu(display("Conversion task failed: {source}"))]
    BlockingTask {
        /// Underlying join error.
        source: tokio::task::JoinError,
    },

    /// An Arrow kernel failed while shaping imported data.
    #[snafu(display("Arrow error while {context}: {source}"))]
    Arrow {
        /// What was being done.
        context: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

impl FactoryError {
    /// Classify this error for callers that only need the broad kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FactoryError::Config { .. } => ErrorCategory::InvalidRequest,
            FactoryError::BackingStore { source } => source.category(),
            FactoryError::Provider { source } => source.category(),
            FactoryError::ProviderSet { source } => source.category(),
            FactoryError::Storage { source } => source.category(),
            FactoryError::Resampling { .. } => ErrorCategory::Format,
            FactoryError::InvalidPattern { .. }
            | FactoryError::InvalidColumnKey { .. }
            | FactoryError::DuplicateEnsemble { .. } => ErrorCategory::InvalidRequest,
            FactoryError::Glob { .. } | FactoryError::SourceIo { .. } => ErrorCategory::Io,
            FactoryError::NoRealizations { .. }
            | FactoryError::NoSourceData { .. }
            | FactoryError::AllEnsemblesMissing { .. }
            | FactoryError::ArtifactNotFound { .. } => ErrorCategory::NotFound,
            FactoryError::MultipleSourceFiles { .. }
            | FactoryError::SourceDecode { .. }
            | FactoryError::SourceParquet { .. }
            | FactoryError::UnsupportedSourceFormat { .. }
            | FactoryError::InvalidParameterLine { .. }
            | FactoryError::MissingSourceColumn { .. }
            | FactoryError::IndexFormat { .. }
            | FactoryError::IndexVersion { .. } => ErrorCategory::Format,
            FactoryError::BlockingTask { .. } | FactoryError::Arrow { .. } => {
                ErrorCategory::Internal
            }
        }
    }
}
