//! Query surfaces over one backing-store artifact.
//!
//! - [`EnsembleTableProvider`] serves column/realization-filtered reads of a
//!   generic per-realization table.
//! - [`EnsembleSummaryProvider`] is the object-safe interface for
//!   DATE-indexed vectors, implemented by [`PresampledSummaryProvider`]
//!   (resampled once at import) and [`LazySummaryProvider`] (resampled at
//!   query time).
//!
//! Providers are immutable once opened and are shared behind `Arc`. Every
//! query returns a freshly decoded `RecordBatch`.

pub mod error;
mod summary;
mod table;

use std::collections::HashSet;

pub use error::ProviderError;
pub use summary::{EnsembleSummaryProvider, LazySummaryProvider, PresampledSummaryProvider};
pub use table::EnsembleTableProvider;

use crate::config::DuplicateColumnPolicy;
use error::{DuplicateColumnsSnafu, EmptyColumnRequestSnafu, UnknownColumnsSnafu};

/// Validate a column request against the columns a provider offers.
///
/// Returns the names to read, in request order.
pub(crate) fn resolve_column_request<'a>(
    requested: &[&'a str],
    available: &[String],
    policy: DuplicateColumnPolicy,
    key: &str,
) -> Result<Vec<&'a str>, ProviderError> {
    if requested.is_empty() {
        return EmptyColumnRequestSnafu.fail();
    }

    let mut seen = HashSet::with_capacity(requested.len());
    let mut unique = Vec::with_capacity(requested.len());
    let mut duplicates = Vec::new();
    for &name in requested {
        if seen.insert(name) {
            unique.push(name);
        } else if !duplicates.iter().any(|d: &String| d == name) {
            duplicates.push(name.to_string());
        }
    }

    if !duplicates.is_empty() {
        match policy {
            DuplicateColumnPolicy::Reject => {
                return DuplicateColumnsSnafu { columns: duplicates }.fail();
            }
            DuplicateColumnPolicy::Deduplicate => {
                log::warn!(
                    "de-duplicating column request for {key}: {} requested more than once",
                    duplicates.join(", ")
                );
            }
        }
    }

    let unknown: Vec<String> = unique
        .iter()
        .filter(|name| !available.iter().any(|a| a.as_str() == **name))
        .map(|name| name.to_string())
        .collect();
    if !unknown.is_empty() {
        return UnknownColumnsSnafu { key, columns: unknown }.fail();
    }

    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> Vec<String> {
        ["FOPR", "FOPT", "WOPR:OP_1"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn request_order_is_kept() -> Result<(), ProviderError> {
        let out = resolve_column_request(
            &["FOPT", "FOPR"],
            &available(),
            DuplicateColumnPolicy::Reject,
            "k",
        )?;
        assert_eq!(out, ["FOPT", "FOPR"]);
        Ok(())
    }

    #[test]
    fn empty_and_unknown_requests_fail() {
        let err = resolve_column_request(&[], &available(), DuplicateColumnPolicy::Reject, "k")
            .expect_err("empty request");
        assert!(matches!(err, ProviderError::EmptyColumnRequest));

        let err = resolve_column_request(
            &["FOPR", "NOPE"],
            &available(),
            DuplicateColumnPolicy::Deduplicate,
            "k",
        )
        .expect_err("unknown column");
        match err {
            ProviderError::UnknownColumns { columns, .. } => assert_eq!(columns, ["NOPE"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicates_follow_policy() -> Result<(), ProviderError> {
        let request = ["FOPR", "FOPT", "FOPR", "FOPR"];
        let err = resolve_column_request(&request, &available(), DuplicateColumnPolicy::Reject, "k")
            .expect_err("duplicates rejected");
        match &err {
            ProviderError::DuplicateColumns { columns } => assert_eq!(columns, &["FOPR"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.category(), crate::error::ErrorCategory::InvalidRequest);

        let out = resolve_column_request(
            &request,
            &available(),
            DuplicateColumnPolicy::Deduplicate,
            "k",
        )?;
        assert_eq!(out, ["FOPR", "FOPT"]);
        Ok(())
    }
}
