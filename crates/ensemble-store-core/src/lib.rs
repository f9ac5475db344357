//! Core engine for ensemble data providers.
//!
//! This crate ingests per-realization simulation output, converts it once
//! into immutable columnar artifacts, and serves filtered reads from them:
//!
//! - A columnar backing store that writes Parquet artifacts atomically and
//!   reopens them by memory-mapping (`backing_store` module).
//! - Table and summary (time-series) providers over one artifact, with
//!   presampled and lazy resampling modes (`provider` module).
//! - A factory that discovers realizations, converts sources, and reuses
//!   artifacts across process runs by content-derived key (`factory`).
//! - An injected registry that deduplicates concurrent conversions and
//!   caches ensemble scans for one application session (`registry`).
//! - Provider sets with cross-ensemble metadata checks and delta ensembles
//!   (`provider_set`).
//!
//! Construction is async (tokio); queries against an opened provider are
//! synchronous and serve fresh Arrow `RecordBatch` values.
#![deny(missing_docs)]

pub mod backing_store;
pub mod config;
pub mod error;
pub mod factory;
pub mod frequency;
pub mod helpers;
pub mod key;
pub mod metadata;
pub mod provider;
pub mod provider_set;
pub mod registry;
pub mod resampling;
pub mod storage;

/// Realization column of generic tables.
pub const REALIZATION: &str = "REALIZATION";
/// Realization column of summary tables.
pub const REAL: &str = "REAL";
/// Date column of summary tables.
pub const DATE: &str = "DATE";
/// Ensemble column of aggregated source files.
pub const ENSEMBLE: &str = "ENSEMBLE";
