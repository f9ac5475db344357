//! Error types for provider sets.

use snafu::prelude::*;

use crate::{error::ErrorCategory, provider::ProviderError};

/// Errors raised by a [`super::ProviderSet`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderSetError {
    /// Two members share a name.
    #[snafu(display("Ensemble '{ensemble}' appears more than once in the provider set"))]
    DuplicateEnsemble {
        /// The repeated name.
        ensemble: String,
    },

    /// No member has this name.
    #[snafu(display("Unknown ensemble '{ensemble}' (available: {})", available.join(", ")))]
    UnknownEnsemble {
        /// The requested name.
        ensemble: String,
        /// Names of every member.
        available: Vec<String>,
    },

    /// Two members disagree on a vector's metadata.
    #[snafu(display(
        "Vector '{vector}' has inconsistent metadata: ensembles '{first}' and '{second}' differ in {attribute}"
    ))]
    InconsistentMetadata {
        /// The vector name.
        vector: String,
        /// Ensemble whose metadata is taken as reference.
        first: String,
        /// Ensemble that disagrees.
        second: String,
        /// First attribute that differs.
        attribute: &'static str,
    },

    /// A member provider failed.
    #[snafu(display("Ensemble '{ensemble}': {source}"))]
    Provider {
        /// Member name.
        ensemble: String,
        /// Underlying provider error.
        source: ProviderError,
    },
}

impl ProviderSetError {
    /// Classify this error for callers that only need the broad kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderSetError::DuplicateEnsemble { .. } => ErrorCategory::InvalidRequest,
            ProviderSetError::UnknownEnsemble { .. } => ErrorCategory::NotFound,
            ProviderSetError::InconsistentMetadata { .. } => ErrorCategory::InconsistentMetadata,
            ProviderSetError::Provider { source, .. } => source.category(),
        }
    }
}
