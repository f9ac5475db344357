//! Shared helpers for shaping Arrow batches.
//!
//! Current helpers:
//! - outer concatenation of per-realization tables with schema unification,
//! - float downcasting and DATE normalisation applied at import,
//! - lexicographic sorting and numeric extraction used by providers.
pub mod batch;
