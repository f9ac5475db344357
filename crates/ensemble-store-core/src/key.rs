//! Content-derived storage keys.
//!
//! A [`StorageKey`] names one backing-store artifact. Keys are derived
//! deterministically from the inputs that define the artifact's content, so
//! the same inputs always map to the same key and a later process can reuse
//! an artifact without touching the source files.
//!
//! Keys contain only ASCII `[a-z0-9_.-]`, never path separators, and are
//! bounded in length so they are always safe as file names.

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

const MAX_KEY_LEN: usize = 200;

/// Kind of artifact a key addresses; used as the key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Generic per-realization table (for example, CSV exports).
    Table,
    /// Per-realization `parameters.txt` files.
    Parameters,
    /// DATE-indexed summary vectors.
    Summary,
}

impl ArtifactKind {
    fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Table => "table",
            ArtifactKind::Parameters => "param",
            ArtifactKind::Summary => "smry",
        }
    }
}

/// Error returned when a string is not a valid storage key.
#[derive(Debug, Snafu)]
#[snafu(display("invalid storage key '{key}': {reason}"))]
pub struct InvalidKeyError {
    /// The rejected key.
    pub key: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

/// Identifier of one backing-store artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey(String);

impl StorageKey {
    /// Key for an artifact converted from per-realization source files.
    ///
    /// `variant` lists every import option that changes the artifact content
    /// (resampling frequency, column allow-list, downcasting). Each entry is
    /// hashed with a separator so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn for_per_realization(
        kind: ArtifactKind,
        ensemble_path: &Path,
        relative_pattern: &str,
        variant: &[&str],
    ) -> Self {
        let mut h = blake3::Hasher::new();
        h.update(b"ensemble-store-key-v1");
        h.update(b"\0");
        h.update(kind.prefix().as_bytes());
        h.update(b"\0");
        h.update(ensemble_path.to_string_lossy().as_bytes());
        h.update(b"\0");
        h.update(relative_pattern.as_bytes());
        for v in variant {
            h.update(b"\0");
            h.update(v.as_bytes());
        }
        let hex = h.finalize().to_hex();
        StorageKey(format!("{}-{}", kind.prefix(), &hex[..32]))
    }

    /// Base key for an aggregated (multi-ensemble) source file.
    pub fn for_aggregated_file(path: &Path) -> Self {
        let mut h = blake3::Hasher::new();
        h.update(b"ensemble-store-aggr-v1");
        h.update(b"\0");
        h.update(path.to_string_lossy().as_bytes());
        let hex = h.finalize().to_hex();
        StorageKey(format!("aggr-{}", &hex[..32]))
    }

    /// Derive the per-ensemble key under an aggregated base key.
    ///
    /// Ensemble names that are not file-name safe are sanitized and a short
    /// digest of the raw name is appended so distinct names never collide.
    pub fn with_ensemble_suffix(&self, ensemble: &str) -> Self {
        let sanitized: String = ensemble
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .take(64)
            .collect();

        if sanitized == ensemble {
            StorageKey(format!("{}__{sanitized}", self.0))
        } else {
            let digest = blake3::hash(ensemble.as_bytes()).to_hex();
            StorageKey(format!("{}__{sanitized}-{}", self.0, &digest[..8]))
        }
    }

    /// Accept an externally supplied key after validating it.
    pub fn from_validated(key: impl Into<String>) -> Result<Self, InvalidKeyError> {
        let key = key.into();
        validate_key(&key)?;
        Ok(StorageKey(key))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_key(key: &str) -> Result<(), InvalidKeyError> {
    let fail = |reason| InvalidKeyError {
        key: key.to_string(),
        reason,
    };
    if key.is_empty() {
        return Err(fail("key is empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(fail("key is too long"));
    }
    if key.starts_with('.') || key.contains("..") {
        return Err(fail("key must not start with '.' or contain '..'"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(fail("key may only contain [A-Za-z0-9_.-]"));
    }
    Ok(())
}

impl TryFrom<String> for StorageKey {
    type Error = InvalidKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StorageKey::from_validated(value)
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
