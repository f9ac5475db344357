//! Provider construction.
//!
//! A [`ProviderFactory`] turns source files into providers. Every provider is
//! backed by an artifact addressed by a [`StorageKey`] derived from the
//! import inputs: when the artifact already exists it is opened directly and
//! no source file is touched; otherwise (in interactive mode) the sources are
//! discovered, parsed, converted and written first.
//!
//! Conversion runs on blocking threads, with per-realization files parsed in
//! parallel. Concurrent requests for the same artifact share one conversion
//! through the factory's [`ProviderRegistry`].

pub mod aggregated;
pub mod discovery;
pub mod error;
mod source;

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    compute::{max, min},
    error::ArrowError,
    record_batch::RecordBatch,
};
use futures::future::join_all;
use glob::Pattern;
use rayon::prelude::*;
use snafu::prelude::*;

pub use aggregated::{AggregatedIndex, INDEX_FORMAT_VERSION};
pub use discovery::{EnsembleScanSnapshot, SNAPSHOT_VERSION, realization_number, scan_ensemble};
pub use error::FactoryError;

use crate::{
    DATE, ENSEMBLE, REAL, REALIZATION,
    backing_store::{BackingStore, StoreHandle, WriteOptions},
    config::{MissingDataPolicy, StoreConfig},
    frequency::Frequency,
    helpers::batch::{
        DATE_TYPE, as_i64, cast_column, concat_outer, downcast_floats, drop_column,
        prepend_constant_i64,
    },
    key::{ArtifactKind, StorageKey},
    provider::{
        EnsembleSummaryProvider, EnsembleTableProvider, LazySummaryProvider,
        PresampledSummaryProvider,
    },
    provider_set::ProviderSet,
    registry::{ProviderRegistry, ProviderSlot, SummaryMode},
    resampling::resample_table,
    storage::{self, StorageError, StorageLocation, layout},
};
use aggregated::{normalize_realization_column, split_by_ensemble};
use discovery::locate_realization_files;
use error::{
    AllEnsemblesMissingSnafu, ArrowSnafu, ArtifactNotFoundSnafu, BackingStoreSnafu,
    BlockingTaskSnafu, ConfigSnafu, DuplicateEnsembleSnafu, IndexFormatSnafu, IndexVersionSnafu,
    InvalidColumnKeySnafu, MissingSourceColumnSnafu, NoSourceDataSnafu, ProviderSetSnafu,
    ProviderSnafu, ResamplingSnafu, StorageSnafu,
};
use source::{read_parameters_file, read_table_file};

/// File name of per-realization parameter files.
pub const PARAMETERS_FILE: &str = "parameters.txt";

/// Options of a summary import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryImportOptions {
    /// Resample to this frequency at import (presampled providers only).
    pub frequency: Option<Frequency>,
    /// Glob patterns selecting the vectors to import (`"FOP*"`, `"W*:OP_1"`).
    /// `None` imports every vector.
    pub column_keys: Option<Vec<String>>,
}

impl SummaryImportOptions {
    /// Import resampled to `frequency`.
    pub fn at_frequency(frequency: Frequency) -> Self {
        SummaryImportOptions {
            frequency: Some(frequency),
            column_keys: None,
        }
    }

    /// Restrict the import to vectors matching `keys`.
    pub fn with_column_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Table,
    Parameters,
    Summary,
}

impl SourceKind {
    fn artifact_kind(self) -> ArtifactKind {
        match self {
            SourceKind::Table => ArtifactKind::Table,
            SourceKind::Parameters => ArtifactKind::Parameters,
            SourceKind::Summary => ArtifactKind::Summary,
        }
    }

    fn realization_column(self) -> &'static str {
        match self {
            SourceKind::Table | SourceKind::Parameters => REALIZATION,
            SourceKind::Summary => REAL,
        }
    }
}

/// Builds providers from source files, reusing existing artifacts.
#[derive(Debug, Clone)]
pub struct ProviderFactory {
    config: StoreConfig,
    store: BackingStore,
    registry: Arc<ProviderRegistry>,
}

impl ProviderFactory {
    /// Factory with its own, unshared registry.
    pub fn new(config: StoreConfig) -> Result<Self, FactoryError> {
        Self::with_registry(config, Arc::new(ProviderRegistry::new()))
    }

    /// Factory sharing `registry` with other factories of the same session.
    pub fn with_registry(config: StoreConfig, registry: Arc<ProviderRegistry>) -> Result<Self, FactoryError> {
        config.validate().context(ConfigSnafu)?;
        let store = BackingStore::new(StorageLocation::local(&config.storage_root));
        Ok(ProviderFactory {
            config,
            store,
            registry,
        })
    }

    /// The configuration this factory was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The registry caching this factory's providers.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// The artifact store under the configured storage root.
    pub fn backing_store(&self) -> &BackingStore {
        &self.store
    }

    /// One table provider per ensemble of an aggregated source file.
    ///
    /// The file must have an `ENSEMBLE` column and a `REALIZATION` (or
    /// `REAL`) column. It is split once; the resulting key index is stored
    /// next to the artifacts, so later calls with the same path read only
    /// the index.
    pub async fn create_from_aggregated_file(
        &self,
        path: &Path,
    ) -> Result<BTreeMap<String, Arc<EnsembleTableProvider>>, FactoryError> {
        let base = StorageKey::for_aggregated_file(path);
        let source = path.display().to_string();
        let index = self
            .registry
            .aggregated(self.root(), &base, || self.load_or_split_aggregated(path, &base))
            .await?;

        let mut providers = BTreeMap::new();
        for (ensemble, key) in index.iter() {
            self.ensure_readable(key, ensemble, &source).await?;
            let provider = self
                .registry
                .table(&self.slot(key), || async {
                    let handle = self
                        .registry
                        .artifact(self.root(), key, || async {
                            self.store
                                .open(key)
                                .context(BackingStoreSnafu)?
                                .context(ArtifactNotFoundSnafu {
                                    ensemble: ensemble.as_str(),
                                    pattern: source.as_str(),
                                    key: key.as_str(),
                                })
                        })
                        .await?;
                    self.table_provider(handle)
                })
                .await?;
            providers.insert(ensemble.clone(), provider);
        }
        Ok(providers)
    }

    /// One table provider per ensemble from per-realization files matching
    /// `relative_pattern` (for example `share/results/tables/vol.csv`).
    pub async fn create_from_per_realization_files(
        &self,
        ensembles: &[(String, PathBuf)],
        relative_pattern: &str,
    ) -> Result<BTreeMap<String, Arc<EnsembleTableProvider>>, FactoryError> {
        self.per_realization_tables(ensembles, relative_pattern, SourceKind::Table)
            .await
    }

    /// One table provider per ensemble from per-realization
    /// `parameters.txt` files, one row per realization.
    pub async fn create_from_per_realization_parameter_files(
        &self,
        ensembles: &[(String, PathBuf)],
    ) -> Result<BTreeMap<String, Arc<EnsembleTableProvider>>, FactoryError> {
        self.per_realization_tables(ensembles, PARAMETERS_FILE, SourceKind::Parameters)
            .await
    }

    /// Summary providers resampled once at import to `options.frequency`.
    pub async fn create_presampled_summary_providers(
        &self,
        ensembles: &[(String, PathBuf)],
        relative_pattern: &str,
        options: &SummaryImportOptions,
    ) -> Result<BTreeMap<String, Arc<dyn EnsembleSummaryProvider>>, FactoryError> {
        self.per_realization_summaries(
            ensembles,
            relative_pattern,
            options,
            SummaryMode::Presampled(options.frequency),
        )
        .await
    }

    /// Summary providers over raw dates that resample per query.
    ///
    /// `options.frequency` is ignored; the frequency is chosen per query.
    pub async fn create_lazy_summary_providers(
        &self,
        ensembles: &[(String, PathBuf)],
        relative_pattern: &str,
        options: &SummaryImportOptions,
    ) -> Result<BTreeMap<String, Arc<dyn EnsembleSummaryProvider>>, FactoryError> {
        if let Some(f) = options.frequency {
            log::debug!("lazy summary import ignores frequency {f}");
        }
        self.per_realization_summaries(ensembles, relative_pattern, options, SummaryMode::Lazy)
            .await
    }

    /// [`Self::create_presampled_summary_providers`] collected into a
    /// [`ProviderSet`] in request order.
    pub async fn create_presampled_summary_provider_set(
        &self,
        ensembles: &[(String, PathBuf)],
        relative_pattern: &str,
        options: &SummaryImportOptions,
    ) -> Result<ProviderSet, FactoryError> {
        let providers = self
            .create_presampled_summary_providers(ensembles, relative_pattern, options)
            .await?;
        into_provider_set(ensembles, providers)
    }

    /// [`Self::create_lazy_summary_providers`] collected into a
    /// [`ProviderSet`] in request order.
    pub async fn create_lazy_summary_provider_set(
        &self,
        ensembles: &[(String, PathBuf)],
        relative_pattern: &str,
        options: &SummaryImportOptions,
    ) -> Result<ProviderSet, FactoryError> {
        let providers = self
            .create_lazy_summary_providers(ensembles, relative_pattern, options)
            .await?;
        into_provider_set(ensembles, providers)
    }

    async fn per_realization_tables(
        &self,
        ensembles: &[(String, PathBuf)],
        relative_pattern: &str,
        kind: SourceKind,
    ) -> Result<BTreeMap<String, Arc<EnsembleTableProvider>>, FactoryError> {
        ensure_unique(ensembles)?;
        let results = join_all(
            ensembles
                .iter()
                .map(|(name, path)| self.table_for_ensemble(name, path, relative_pattern, kind)),
        )
        .await;
        self.collect_ensembles(ensembles, relative_pattern, results)
    }

    async fn per_realization_summaries(
        &self,
        ensembles: &[(String, PathBuf)],
        relative_pattern: &str,
        options: &SummaryImportOptions,
        mode: SummaryMode,
    ) -> Result<BTreeMap<String, Arc<dyn EnsembleSummaryProvider>>, FactoryError> {
        ensure_unique(ensembles)?;
        let column_keys = compile_column_keys(options.column_keys.as_deref())?;
        let results = join_all(ensembles.iter().map(|(name, path)| {
            self.summary_for_ensemble(name, path, relative_pattern, column_keys.as_deref(), mode)
        }))
        .await;
        self.collect_ensembles(ensembles, relative_pattern, results)
    }

    /// Apply the missing-data policy to per-ensemble results.
    fn collect_ensembles<P>(
        &self,
        ensembles: &[(String, PathBuf)],
        relative_pattern: &str,
        results: Vec<Result<P, FactoryError>>,
    ) -> Result<BTreeMap<String, P>, FactoryError> {
        let mut providers = BTreeMap::new();
        let mut missing = Vec::new();

        for ((name, _), result) in ensembles.iter().zip(results) {
            match result {
                Ok(provider) => {
                    providers.insert(name.clone(), provider);
                }
                Err(err @ (FactoryError::NoSourceData { .. } | FactoryError::NoRealizations { .. })) => {
                    match self.config.missing_data {
                        MissingDataPolicy::Fail => return Err(err),
                        MissingDataPolicy::WarnAndSkip => {
                            log::debug!("{err}");
                            missing.push(name.clone());
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }

        if providers.is_empty() && !ensembles.is_empty() {
            return AllEnsemblesMissingSnafu {
                pattern: relative_pattern,
                ensembles: ensembles.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>(),
            }
            .fail();
        }
        if !missing.is_empty() {
            log::warn!(
                "partial data: ensembles {missing:?} have no data matching '{relative_pattern}'; \
                 continuing with {} ensembles",
                providers.len()
            );
        }
        Ok(providers)
    }

    async fn table_for_ensemble(
        &self,
        name: &str,
        ensemble_path: &Path,
        relative_pattern: &str,
        kind: SourceKind,
    ) -> Result<Arc<EnsembleTableProvider>, FactoryError> {
        let key = StorageKey::for_per_realization(kind.artifact_kind(), ensemble_path, relative_pattern, &[]);
        self.ensure_readable(&key, name, relative_pattern).await?;
        self.registry
            .table(&self.slot(&key), || async {
                let handle = self
                    .open_or_convert(&key, name, relative_pattern, &[], || {
                        self.import_realizations(name, ensemble_path, relative_pattern, kind)
                    })
                    .await?;
                self.table_provider(handle)
            })
            .await
    }

    async fn summary_for_ensemble(
        &self,
        name: &str,
        ensemble_path: &Path,
        relative_pattern: &str,
        column_keys: Option<&[Pattern]>,
        mode: SummaryMode,
    ) -> Result<Arc<dyn EnsembleSummaryProvider>, FactoryError> {
        let frequency = match mode {
            SummaryMode::Presampled(f) => f,
            SummaryMode::Lazy => None,
        };
        let variant = summary_variant(frequency, self.config.downcast_floats, column_keys);
        let variant: Vec<&str> = variant.iter().map(String::as_str).collect();
        let key = StorageKey::for_per_realization(ArtifactKind::Summary, ensemble_path, relative_pattern, &variant);

        self.ensure_readable(&key, name, relative_pattern).await?;
        self.registry
            .summary(&self.slot(&key), mode, || async {
                let handle = self
                    .open_or_convert(&key, name, relative_pattern, &[DATE, REAL], || async {
                        let raw = self
                            .import_realizations(name, ensemble_path, relative_pattern, SourceKind::Summary)
                            .await?;
                        let keys = column_keys.map(<[Pattern]>::to_vec);
                        let downcast = self.config.downcast_floats;
                        let ensemble = name.to_string();
                        tokio::task::spawn_blocking(move || {
                            shape_summary(&raw, &ensemble, keys.as_deref(), downcast, frequency)
                        })
                        .await
                        .context(BlockingTaskSnafu)?
                    })
                    .await?;

                let policy = self.config.duplicate_columns;
                let provider: Arc<dyn EnsembleSummaryProvider> = match mode {
                    SummaryMode::Presampled(f) => Arc::new(
                        PresampledSummaryProvider::open(handle, f, policy).context(ProviderSnafu)?,
                    ),
                    SummaryMode::Lazy => {
                        Arc::new(LazySummaryProvider::open(handle, policy).context(ProviderSnafu)?)
                    }
                };
                Ok(provider)
            })
            .await
    }

    fn root(&self) -> &Path {
        self.store.location().root()
    }

    /// Registry slot of the provider over `key` built with this configuration.
    fn slot(&self, key: &StorageKey) -> ProviderSlot {
        ProviderSlot {
            root: self.root().to_path_buf(),
            duplicate_columns: self.config.duplicate_columns,
            key: key.clone(),
        }
    }

    /// In portable mode a cached provider is only served while its artifact
    /// exists under this factory's root.
    async fn ensure_readable(&self, key: &StorageKey, ensemble: &str, pattern: &str) -> Result<(), FactoryError> {
        if self.config.writes_allowed() {
            return Ok(());
        }
        let present = self.store.exists(key).await.context(BackingStoreSnafu)?;
        ensure!(
            present,
            ArtifactNotFoundSnafu {
                ensemble,
                pattern,
                key: key.as_str(),
            }
        );
        Ok(())
    }

    fn table_provider(&self, handle: StoreHandle) -> Result<Arc<EnsembleTableProvider>, FactoryError> {
        EnsembleTableProvider::open(handle, self.config.duplicate_columns)
            .map(Arc::new)
            .context(ProviderSnafu)
    }

    /// Open the artifact for `key`, converting it with `import` first if it
    /// does not exist and writes are allowed.
    ///
    /// Runs once per storage root and key, however many provider kinds are
    /// built over the artifact.
    async fn open_or_convert<F, Fut>(
        &self,
        key: &StorageKey,
        ensemble: &str,
        pattern: &str,
        sort_by: &[&str],
        import: F,
    ) -> Result<StoreHandle, FactoryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RecordBatch, FactoryError>>,
    {
        self.registry
            .artifact(self.root(), key, || async move {
                if let Some(handle) = self.store.open(key).context(BackingStoreSnafu)? {
                    log::debug!("ensemble '{ensemble}': reusing artifact {key}");
                    return Ok(handle);
                }
                ensure!(
                    self.config.writes_allowed(),
                    ArtifactNotFoundSnafu {
                        ensemble,
                        pattern,
                        key: key.as_str(),
                    }
                );

                let batch = import().await?;
                let options = WriteOptions::default()
                    .with_row_group_size(self.config.row_group_size)
                    .sorted_by(sort_by.iter().copied());
                self.store
                    .write(key, &batch, &options)
                    .await
                    .context(BackingStoreSnafu)?;
                self.registry.record_conversion();
                log::info!(
                    "ensemble '{ensemble}': converted {} rows x {} columns into artifact {key}",
                    batch.num_rows(),
                    batch.num_columns()
                );

                self.store
                    .open(key)
                    .context(BackingStoreSnafu)?
                    .context(ArtifactNotFoundSnafu {
                        ensemble,
                        pattern,
                        key: key.as_str(),
                    })
            })
            .await
    }

    async fn scan(&self, name: &str, ensemble_path: &Path) -> Result<Arc<EnsembleScanSnapshot>, FactoryError> {
        self.registry
            .ensemble_scan(name, ensemble_path, || {
                let name = name.to_string();
                let path = ensemble_path.to_path_buf();
                async move {
                    tokio::task::spawn_blocking(move || scan_ensemble(&name, &path))
                        .await
                        .context(BlockingTaskSnafu)?
                }
            })
            .await
    }

    /// Read every realization's source file into one table with a leading
    /// realization column.
    async fn import_realizations(
        &self,
        name: &str,
        ensemble_path: &Path,
        relative_pattern: &str,
        kind: SourceKind,
    ) -> Result<RecordBatch, FactoryError> {
        let snapshot = self.scan(name, ensemble_path).await?;
        let pattern = relative_pattern.to_string();
        tokio::task::spawn_blocking(move || read_realizations(&snapshot, &pattern, kind))
            .await
            .context(BlockingTaskSnafu)?
    }

    async fn load_or_split_aggregated(
        &self,
        path: &Path,
        base: &StorageKey,
    ) -> Result<Arc<BTreeMap<String, StorageKey>>, FactoryError> {
        let rel = layout::index_rel_path(base);
        let index_path = self.store.location().join(&rel).display().to_string();
        let source_path = path.display().to_string();

        match storage::read_to_string(self.store.location(), &rel).await {
            Ok(json) => {
                let index: AggregatedIndex =
                    serde_json::from_str(&json).context(IndexFormatSnafu { path: index_path.as_str() })?;
                ensure!(
                    index.format_version == INDEX_FORMAT_VERSION,
                    IndexVersionSnafu {
                        path: index_path.as_str(),
                        found: index.format_version,
                        expected: INDEX_FORMAT_VERSION,
                    }
                );

                let mut complete = true;
                for key in index.ensembles.values() {
                    if !self.store.exists(key).await.context(BackingStoreSnafu)? {
                        ensure!(
                            self.config.writes_allowed(),
                            ArtifactNotFoundSnafu {
                                ensemble: source_path.as_str(),
                                pattern: source_path.as_str(),
                                key: key.as_str(),
                            }
                        );
                        complete = false;
                        break;
                    }
                }
                if complete {
                    log::debug!("reusing aggregated index {index_path}");
                    return Ok(Arc::new(index.ensembles));
                }
                log::warn!("aggregated index {index_path} lists missing artifacts; splitting again");
            }
            Err(StorageError::NotFound { .. }) => {
                ensure!(
                    self.config.writes_allowed(),
                    ArtifactNotFoundSnafu {
                        ensemble: source_path.as_str(),
                        pattern: source_path.as_str(),
                        key: base.as_str(),
                    }
                );
            }
            Err(source) => return Err(source).context(StorageSnafu),
        }

        log::info!("splitting aggregated file {}", path.display());
        let source = path.to_path_buf();
        let parts = tokio::task::spawn_blocking(move || read_aggregated(&source))
            .await
            .context(BlockingTaskSnafu)??;

        let options = WriteOptions::default().with_row_group_size(self.config.row_group_size);
        let mut ensembles = BTreeMap::new();
        for (ensemble, part) in parts {
            let key = base.with_ensemble_suffix(&ensemble);
            if self.store.exists(&key).await.context(BackingStoreSnafu)? {
                log::debug!("ensemble '{ensemble}': keeping existing artifact {key}");
                ensembles.insert(ensemble, key);
                continue;
            }
            self.store
                .write(&key, &part, &options)
                .await
                .context(BackingStoreSnafu)?;
            self.registry.record_conversion();
            log::info!("ensemble '{ensemble}': {} rows into artifact {key}", part.num_rows());
            ensembles.insert(ensemble, key);
        }

        let index = AggregatedIndex::new(path.to_path_buf(), ensembles);
        let json = serde_json::to_vec_pretty(&index).context(IndexFormatSnafu { path: index_path.as_str() })?;
        storage::write_atomic(self.store.location(), &rel, &json)
            .await
            .context(StorageSnafu)?;
        Ok(Arc::new(index.ensembles))
    }
}

fn ensure_unique(ensembles: &[(String, PathBuf)]) -> Result<(), FactoryError> {
    let mut seen = HashSet::new();
    for (name, _) in ensembles {
        ensure!(seen.insert(name.as_str()), DuplicateEnsembleSnafu { ensemble: name.as_str() });
    }
    Ok(())
}

fn compile_column_keys(keys: Option<&[String]>) -> Result<Option<Vec<Pattern>>, FactoryError> {
    let Some(keys) = keys else {
        return Ok(None);
    };
    let unique: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
    unique
        .into_iter()
        .map(|k| Pattern::new(k).context(InvalidColumnKeySnafu { pattern: k }))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Key variant of a summary artifact: every option that changes its content.
fn summary_variant(frequency: Option<Frequency>, downcast: bool, column_keys: Option<&[Pattern]>) -> Vec<String> {
    let mut variant = vec![
        frequency.map_or("raw", Frequency::tag).to_string(),
        if downcast { "f32" } else { "f64" }.to_string(),
    ];
    if let Some(keys) = column_keys {
        let joined: Vec<&str> = keys.iter().map(Pattern::as_str).collect();
        variant.push(format!("cols={}", joined.join("\u{1f}")));
    }
    variant
}

fn into_provider_set(
    ensembles: &[(String, PathBuf)],
    mut providers: BTreeMap<String, Arc<dyn EnsembleSummaryProvider>>,
) -> Result<ProviderSet, FactoryError> {
    let ordered = ensembles
        .iter()
        .filter_map(|(name, _)| providers.remove(name).map(|p| (name.clone(), p)))
        .collect();
    ProviderSet::new(ordered).context(ProviderSetSnafu)
}

fn read_aggregated(path: &Path) -> Result<Vec<(String, RecordBatch)>, FactoryError> {
    let batch = read_table_file(path)?;
    ensure!(
        batch.schema().index_of(ENSEMBLE).is_ok(),
        MissingSourceColumnSnafu { path, column: ENSEMBLE }
    );
    let batch = normalize_realization_column(&batch).context(ArrowSnafu {
        context: "normalizing the realization column",
    })?;
    ensure!(
        batch.schema().index_of(REALIZATION).is_ok(),
        MissingSourceColumnSnafu { path, column: REALIZATION }
    );
    split_by_ensemble(&batch).context(ArrowSnafu {
        context: format!("splitting {} by ensemble", path.display()),
    })
}

/// Blocking part of a per-realization import.
fn read_realizations(
    snapshot: &EnsembleScanSnapshot,
    relative_pattern: &str,
    kind: SourceKind,
) -> Result<RecordBatch, FactoryError> {
    let files = locate_realization_files(snapshot, relative_pattern)?;
    ensure!(
        !files.is_empty(),
        NoSourceDataSnafu {
            ensemble: snapshot.ensemble_name.as_str(),
            pattern: relative_pattern,
        }
    );

    let column = kind.realization_column();
    let parts = files
        .par_iter()
        .map(|(real, file)| {
            let batch = match kind {
                SourceKind::Parameters => read_parameters_file(file)?,
                SourceKind::Table => read_table_file(file)?,
                SourceKind::Summary => {
                    let batch = read_table_file(file)?;
                    ensure!(
                        batch.schema().index_of(DATE).is_ok(),
                        MissingSourceColumnSnafu { path: file, column: DATE }
                    );
                    cast_column(&batch, DATE, &DATE_TYPE).context(ArrowSnafu {
                        context: format!("casting DATE of {}", file.display()),
                    })?
                }
            };
            tag_realization(&batch, column, *real).context(ArrowSnafu {
                context: format!("tagging {} with realization {real}", file.display()),
            })
        })
        .collect::<Result<Vec<_>, FactoryError>>()?;

    log::debug!(
        "ensemble '{}': read {} realization files matching '{relative_pattern}'",
        snapshot.ensemble_name,
        parts.len()
    );
    concat_outer(&parts).context(ArrowSnafu {
        context: format!("concatenating realizations of '{}'", snapshot.ensemble_name),
    })
}

/// Replace any realization column of `batch` with a constant `real`.
fn tag_realization(batch: &RecordBatch, column: &str, real: u32) -> Result<RecordBatch, ArrowError> {
    let batch = if batch.schema().index_of(column).is_ok() {
        drop_column(batch, column)?
    } else {
        batch.clone()
    };
    prepend_constant_i64(&batch, column, i64::from(real))
}

/// Turn concatenated `[REAL, ..., DATE, ...]` rows into a summary table:
/// `[DATE, REAL, vectors...]`, vectors filtered by `column_keys`, floats
/// optionally downcast, then optionally resampled.
fn shape_summary(
    batch: &RecordBatch,
    ensemble: &str,
    column_keys: Option<&[Pattern]>,
    downcast: bool,
    frequency: Option<Frequency>,
) -> Result<RecordBatch, FactoryError> {
    let schema = batch.schema();
    let mut indices = Vec::with_capacity(schema.fields().len());
    for required in [DATE, REAL] {
        indices.push(schema.index_of(required).context(ArrowSnafu {
            context: format!("locating {required} in '{ensemble}'"),
        })?);
    }
    for (idx, field) in schema.fields().iter().enumerate() {
        let name = field.name().as_str();
        if name == DATE || name == REAL {
            continue;
        }
        if column_keys.is_none_or(|keys| keys.iter().any(|k| k.matches(name))) {
            indices.push(idx);
        }
    }

    let mut batch = batch.project(&indices).context(ArrowSnafu {
        context: format!("selecting vectors of '{ensemble}'"),
    })?;
    if downcast {
        batch = downcast_floats(&batch, &[DATE, REAL]).context(ArrowSnafu {
            context: format!("downcasting '{ensemble}'"),
        })?;
    }

    if let Some(frequency) = frequency {
        let dates = as_i64(batch.column(0)).context(ArrowSnafu {
            context: format!("reading dates of '{ensemble}'"),
        })?;
        let samples = match (min(&dates), max(&dates)) {
            (Some(lo), Some(hi)) => frequency.normalized_sample_dates(lo, hi),
            _ => Vec::new(),
        };
        log::debug!(
            "ensemble '{ensemble}': resampling to {frequency} ({} dates)",
            samples.len()
        );
        batch = resample_table(&batch, &samples).context(ResamplingSnafu { ensemble })?;
    }
    Ok(batch)
}
