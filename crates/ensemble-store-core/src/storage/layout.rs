//! On-disk layout helpers for a storage root.
//!
//! Every artifact and index lives directly under the storage root and is
//! named after its storage key:
//! - backing-store artifacts: `<key>.parquet`
//! - aggregated-file indexes: `<key>.index.json`
//!
//! The functions here return relative [`std::path::PathBuf`] values. Callers
//! join them with a [`crate::storage::StorageLocation`] before doing IO.

use std::path::PathBuf;

use crate::key::StorageKey;

/// File extension of backing-store artifacts.
pub const ARTIFACT_EXT: &str = "parquet";

/// File suffix of aggregated-file key indexes.
pub const INDEX_SUFFIX: &str = "index.json";

/// Relative path: `<key>.parquet`
pub fn artifact_rel_path(key: &StorageKey) -> PathBuf {
    PathBuf::from(format!("{}.{ARTIFACT_EXT}", key.as_str()))
}

/// Relative path: `<key>.index.json`
pub fn index_rel_path(key: &StorageKey) -> PathBuf {
    PathBuf::from(format!("{}.{INDEX_SUFFIX}", key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_derived_from_key() {
        let key = StorageKey::from_validated("table-0123abcd").expect("valid key");
        assert_eq!(artifact_rel_path(&key), PathBuf::from("table-0123abcd.parquet"));
        assert_eq!(index_rel_path(&key), PathBuf::from("table-0123abcd.index.json"));
    }
}
