//! Wrapper prelude.
//!
//! The `ensemble-store` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::error;
pub use crate::{
    DeltaSummaryProvider, DuplicateColumnPolicy, EnsembleSummaryProvider, EnsembleTableProvider,
    Frequency, LazySummaryProvider, MissingDataPolicy, PresampledSummaryProvider, ProviderFactory,
    ProviderRegistry, ProviderSet, RegistryStats, StorageKey, StoreConfig, SummaryImportOptions,
    VectorMetadata, WriteMode,
};
