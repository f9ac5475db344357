//! Errors raised while touching files under a storage root.

use std::{io, path::PathBuf};

use snafu::{Backtrace, prelude::*};

use crate::error::ErrorCategory;

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The file does not exist.
    #[snafu(display("Not found: {}", path.display()))]
    NotFound {
        /// The missing file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A filesystem call failed.
    #[snafu(display("Failed to {op} {}: {source}", path.display()))]
    Io {
        /// What was being attempted (`create`, `rename`, ...).
        op: &'static str,
        /// The file or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// An artifact could not be memory-mapped.
    #[snafu(display("Failed to map {} into memory: {source}", path.display()))]
    Map {
        /// The artifact.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// Classify this error for callers that only need the broad kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            StorageError::NotFound { .. } => ErrorCategory::NotFound,
            StorageError::Io { .. } | StorageError::Map { .. } => ErrorCategory::Io,
        }
    }
}
