//! Store configuration.
//!
//! [`StoreConfig`] carries everything a [`crate::factory::ProviderFactory`]
//! needs to know about its deployment: where artifacts live, whether it may
//! (re)build them, and the policies for a few caller-facing edge cases.
//! It can be built in code, deserialized from JSON, or read from the
//! environment.

use std::{path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Environment variable naming the storage root.
pub const ENV_STORAGE_ROOT: &str = "ENSEMBLE_STORE_ROOT";
/// Environment variable selecting the write mode (`interactive` or `portable`).
pub const ENV_WRITE_MODE: &str = "ENSEMBLE_STORE_MODE";

const DEFAULT_ROW_GROUP_SIZE: usize = 64 * 1024;

/// Whether the factory may create artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Writes allowed; missing artifacts are converted on demand.
    #[default]
    Interactive,
    /// Read-only deployment; a missing artifact is a hard failure.
    Portable,
}

impl FromStr for WriteMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" => Ok(WriteMode::Interactive),
            "portable" | "read-only" | "readonly" => Ok(WriteMode::Portable),
            other => InvalidWriteModeSnafu { value: other }.fail(),
        }
    }
}

/// What to do when a column request names the same column twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateColumnPolicy {
    /// Fail the request.
    #[default]
    Reject,
    /// Keep the first occurrence of each name and log a warning.
    Deduplicate,
}

/// What to do when one ensemble among several has no source data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// Fail construction, naming the ensemble and file pattern.
    #[default]
    Fail,
    /// Log a partial-data warning and continue with the other ensembles.
    WarnAndSkip,
}

/// Errors building a [`StoreConfig`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// No storage root was configured.
    #[snafu(display("storage root is not configured (set {ENV_STORAGE_ROOT})"))]
    MissingStorageRoot,

    /// The write mode string was not recognised.
    #[snafu(display("unknown write mode '{value}' (expected interactive|portable)"))]
    InvalidWriteMode {
        /// The rejected value.
        value: String,
    },

    /// Row groups must hold at least one row.
    #[snafu(display("row_group_size must be positive"))]
    InvalidRowGroupSize,

    /// JSON configuration could not be parsed.
    #[snafu(display("invalid store configuration JSON: {source}"))]
    Json {
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

/// Configuration shared by a factory and the providers it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding artifacts and key indexes.
    pub storage_root: PathBuf,
    /// Interactive (writes allowed) or portable (read-only).
    #[serde(default)]
    pub write_mode: WriteMode,
    /// Handling of duplicate names in column requests.
    #[serde(default)]
    pub duplicate_columns: DuplicateColumnPolicy,
    /// Handling of ensembles without source data.
    #[serde(default)]
    pub missing_data: MissingDataPolicy,
    /// Store summary vectors as `Float32` at import.
    #[serde(default)]
    pub downcast_floats: bool,
    /// Maximum rows per Parquet row group in written artifacts.
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,
}

fn default_row_group_size() -> usize {
    DEFAULT_ROW_GROUP_SIZE
}

impl StoreConfig {
    /// Interactive configuration with default policies.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        StoreConfig {
            storage_root: storage_root.into(),
            write_mode: WriteMode::default(),
            duplicate_columns: DuplicateColumnPolicy::default(),
            missing_data: MissingDataPolicy::default(),
            downcast_floats: false,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    /// Set the write mode.
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Set the duplicate-column policy.
    pub fn with_duplicate_columns(mut self, policy: DuplicateColumnPolicy) -> Self {
        self.duplicate_columns = policy;
        self
    }

    /// Set the missing-data policy.
    pub fn with_missing_data(mut self, policy: MissingDataPolicy) -> Self {
        self.missing_data = policy;
        self
    }

    /// Enable or disable float downcasting at import.
    pub fn with_downcast_floats(mut self, downcast: bool) -> Self {
        self.downcast_floats = downcast;
        self
    }

    /// Set the maximum row-group size of written artifacts.
    pub fn with_row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = rows;
        self
    }

    /// Whether artifacts may be created.
    pub fn writes_allowed(&self) -> bool {
        self.write_mode == WriteMode::Interactive
    }

    /// Check invariants the type system does not enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.storage_root.as_os_str().is_empty(),
            MissingStorageRootSnafu
        );
        ensure!(self.row_group_size > 0, InvalidRowGroupSizeSnafu);
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = serde_json::from_str(json).context(JsonSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from [`ENV_STORAGE_ROOT`] and [`ENV_WRITE_MODE`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let root = lookup(ENV_STORAGE_ROOT)
            .filter(|s| !s.trim().is_empty())
            .context(MissingStorageRootSnafu)?;
        let mut config = StoreConfig::new(root);
        if let Some(mode) = lookup(ENV_WRITE_MODE) {
            config.write_mode = mode.parse()?;
        }
        config.validate()?;
        Ok(config)
    }
}
