//! # ensemble-store
//!
//! Ensemble data providers backed by immutable columnar artifacts.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ensemble_store::prelude::*;
//!
//! let factory = ProviderFactory::new(StoreConfig::new("/scratch/webviz-store"))?;
//! let ensembles = vec![("iter-0".to_string(), "/case/realization-*/iter-0".into())];
//! let set = factory
//!     .create_lazy_summary_provider_set(&ensembles, "share/results/unsmry/*.arrow", &Default::default())
//!     .await?;
//! set.verify_consistent_vector_metadata()?;
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Error namespace (wrapper-only).
pub mod error {
    pub use ensemble_store_core::backing_store::BackingStoreError;
    pub use ensemble_store_core::config::ConfigError;
    pub use ensemble_store_core::error::ErrorCategory;
    pub use ensemble_store_core::factory::FactoryError;
    pub use ensemble_store_core::provider::ProviderError;
    pub use ensemble_store_core::provider_set::ProviderSetError;
}

pub use ensemble_store_core::config::{
    DuplicateColumnPolicy, MissingDataPolicy, StoreConfig, WriteMode,
};
pub use ensemble_store_core::factory::{ProviderFactory, SummaryImportOptions};
pub use ensemble_store_core::frequency::Frequency;
pub use ensemble_store_core::key::StorageKey;
pub use ensemble_store_core::metadata::VectorMetadata;
pub use ensemble_store_core::provider::{
    EnsembleSummaryProvider, EnsembleTableProvider, LazySummaryProvider,
    PresampledSummaryProvider,
};
pub use ensemble_store_core::provider_set::{DeltaSummaryProvider, ProviderSet};
pub use ensemble_store_core::registry::{ProviderRegistry, RegistryStats};
pub use ensemble_store_core::{DATE, REAL, REALIZATION};
