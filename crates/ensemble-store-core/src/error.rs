//! Broad error classification shared by every layer.
//!
//! Each layer keeps its own SNAFU error enum with precise context. Callers
//! that only need to decide how to react (show a "missing data" message, fix
//! an input file, report an internal failure) use [`ErrorCategory`] via the
//! `category()` method every error type provides.

use std::fmt;

/// Coarse error kind, independent of which layer raised the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A source file or artifact violates an expected invariant.
    Format,
    /// A requested ensemble, artifact, file or storage key is absent.
    NotFound,
    /// Providers in one set disagree on vector metadata.
    InconsistentMetadata,
    /// The caller asked for something the provider cannot serve
    /// (unknown or duplicate columns, unsupported frequency, ...).
    InvalidRequest,
    /// Filesystem failure unrelated to the data itself.
    Io,
    /// Unexpected failure inside the library (Arrow kernels, task joins).
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Format => "format",
            ErrorCategory::NotFound => "not found",
            ErrorCategory::InconsistentMetadata => "inconsistent metadata",
            ErrorCategory::InvalidRequest => "invalid request",
            ErrorCategory::Io => "io",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}
