//! Multi-ensemble query surface.
//!
//! A [`ProviderSet`] holds summary providers of several ensembles in a fixed
//! order. It answers union queries across members, checks that members agree
//! on vector metadata and builds delta ensembles on demand.

mod delta;
pub mod error;

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use roaring::RoaringBitmap;
use snafu::prelude::*;

pub use delta::DeltaSummaryProvider;
pub use error::ProviderSetError;

use crate::{frequency::Frequency, metadata::VectorMetadata, provider::EnsembleSummaryProvider};
use error::{DuplicateEnsembleSnafu, InconsistentMetadataSnafu, ProviderSnafu, UnknownEnsembleSnafu};

/// Ordered, named summary providers of several ensembles.
pub struct ProviderSet {
    providers: Vec<(String, Arc<dyn EnsembleSummaryProvider>)>,
    deltas: Mutex<HashMap<(String, String), Arc<DeltaSummaryProvider>>>,
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet")
            .field("ensembles", &self.names())
            .finish()
    }
}

impl ProviderSet {
    /// Set over `providers`, keeping their order.
    pub fn new(providers: Vec<(String, Arc<dyn EnsembleSummaryProvider>)>) -> Result<Self, ProviderSetError> {
        let mut seen = HashSet::new();
        for (name, _) in &providers {
            ensure!(seen.insert(name.as_str()), DuplicateEnsembleSnafu { ensemble: name.as_str() });
        }
        Ok(ProviderSet {
            providers,
            deltas: Mutex::new(HashMap::new()),
        })
    }

    /// Member names in order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Members in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn EnsembleSummaryProvider>)> {
        self.providers.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// The member named `name`.
    pub fn provider(&self, name: &str) -> Result<&Arc<dyn EnsembleSummaryProvider>, ProviderSetError> {
        self.providers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
            .context(UnknownEnsembleSnafu {
                ensemble: name,
                available: self.names().into_iter().map(String::from).collect::<Vec<_>>(),
            })
    }

    /// Sorted union of every member's vector names.
    pub fn all_vector_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .providers
            .iter()
            .flat_map(|(_, p)| p.vector_names())
            .collect();
        names.into_iter().collect()
    }

    /// Sorted union of every member's realizations.
    pub fn all_realizations(&self) -> Vec<u32> {
        let mut reals = RoaringBitmap::new();
        for (_, p) in &self.providers {
            reals.extend(p.realizations());
        }
        reals.iter().collect()
    }

    /// Sorted union of every member's dates at `frequency`.
    pub fn all_dates(&self, frequency: Option<Frequency>) -> Result<Vec<i64>, ProviderSetError> {
        let mut dates = BTreeSet::new();
        for (name, p) in &self.providers {
            dates.extend(
                p.dates(frequency, None)
                    .context(ProviderSnafu { ensemble: name.as_str() })?,
            );
        }
        Ok(dates.into_iter().collect())
    }

    /// Metadata of `vector` from the first member that has any.
    ///
    /// Fails if a later member has different metadata for the same vector.
    /// Use [`Self::vector_metadata_with_precedence`] to pick a member
    /// explicitly instead.
    pub fn vector_metadata(&self, vector: &str) -> Result<Option<VectorMetadata>, ProviderSetError> {
        let mut reference: Option<(&str, VectorMetadata)> = None;
        for (name, p) in &self.providers {
            let Some(meta) = p.vector_metadata(vector) else {
                continue;
            };
            if let Some((first, expected)) = &reference {
                if let Some(attribute) = expected.first_mismatch(&meta) {
                    return InconsistentMetadataSnafu {
                        vector,
                        first: *first,
                        second: name.as_str(),
                        attribute,
                    }
                    .fail();
                }
            } else {
                reference = Some((name.as_str(), meta));
            }
        }
        Ok(reference.map(|(_, meta)| meta))
    }

    /// Metadata of `vector` from the first member in `order` that has any.
    ///
    /// Members not listed in `order` are not consulted.
    pub fn vector_metadata_with_precedence(
        &self,
        vector: &str,
        order: &[&str],
    ) -> Result<Option<VectorMetadata>, ProviderSetError> {
        for name in order {
            if let Some(meta) = self.provider(name)?.vector_metadata(vector) {
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }

    /// Check that every vector has the same metadata in every member that
    /// defines it, reporting the first disagreeing pair.
    pub fn verify_consistent_vector_metadata(&self) -> Result<(), ProviderSetError> {
        for vector in self.all_vector_names() {
            self.vector_metadata(&vector)?;
        }
        Ok(())
    }

    /// Delta ensemble `a - b`, built on first request and cached.
    pub fn delta_provider(&self, a: &str, b: &str) -> Result<Arc<DeltaSummaryProvider>, ProviderSetError> {
        let key = (a.to_string(), b.to_string());
        {
            let deltas = self.deltas.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(delta) = deltas.get(&key) {
                return Ok(Arc::clone(delta));
            }
        }

        let delta = Arc::new(DeltaSummaryProvider::new(
            a,
            Arc::clone(self.provider(a)?),
            b,
            Arc::clone(self.provider(b)?),
        ));
        let mut deltas = self.deltas.lock().unwrap_or_else(PoisonError::into_inner);
        let cached = deltas.entry(key).or_insert(delta);
        log::debug!("delta ensemble '{}' ready", cached.name());
        Ok(Arc::clone(cached))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow::{
        array::{ArrayRef, AsArray, Float64Array, Int64Array, TimestampMillisecondArray},
        datatypes::{DataType, Field, Float64Type, Int64Type, Schema},
        record_batch::RecordBatch,
    };
    use tempfile::TempDir;

    use crate::{
        DATE, REAL,
        backing_store::{BackingStore, WriteOptions},
        config::DuplicateColumnPolicy,
        error::ErrorCategory,
        helpers::batch::DATE_TYPE,
        key::StorageKey,
        provider::PresampledSummaryProvider,
        storage::StorageLocation,
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn meta(unit: &str) -> VectorMetadata {
        VectorMetadata {
            unit: unit.to_string(),
            is_total: true,
            is_rate: false,
            is_historical: false,
            source_keyword: "FOPT".to_string(),
            owner_name: None,
            owner_number: None,
        }
    }

    /// Provider with `FOPT = offset + real` and `extra` on two dates.
    async fn member(
        tmp: &TempDir,
        key: &str,
        reals: &[i64],
        offset: f64,
        unit: &str,
        extra: &str,
    ) -> Result<Arc<dyn EnsembleSummaryProvider>, Box<dyn std::error::Error>> {
        let mut dates = Vec::new();
        let mut real_col = Vec::new();
        for d in [0i64, 86_400_000] {
            for r in reals {
                dates.push(d);
                real_col.push(*r);
            }
        }
        let fopt: Vec<f64> = real_col.iter().map(|r| offset + *r as f64).collect();
        let schema = Schema::new(vec![
            Field::new(DATE, DATE_TYPE, false),
            Field::new(REAL, DataType::Int64, false),
            Field::new("FOPT", DataType::Float64, true).with_metadata(meta(unit).to_field_metadata()),
            Field::new(extra, DataType::Float64, true),
        ]);
        let n = dates.len();
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(TimestampMillisecondArray::from(dates)) as ArrayRef,
                Arc::new(Int64Array::from(real_col)),
                Arc::new(Float64Array::from(fopt)),
                Arc::new(Float64Array::from(vec![1.0; n])),
            ],
        )?;
        let store = BackingStore::new(StorageLocation::local(tmp.path()));
        let key = StorageKey::from_validated(key)?;
        store
            .write(&key, &batch, &WriteOptions::default().sorted_by([DATE, REAL]))
            .await?;
        let handle = store.open(&key)?.ok_or("artifact should exist")?;
        Ok(Arc::new(PresampledSummaryProvider::open(handle, None, DuplicateColumnPolicy::Reject)?))
    }

    #[tokio::test]
    async fn unions_are_sorted_and_deduplicated() -> TestResult {
        let tmp = TempDir::new()?;
        let set = ProviderSet::new(vec![
            ("a".into(), member(&tmp, "a", &[2, 0], 0.0, "SM3", "WOPT").await?),
            ("b".into(), member(&tmp, "b", &[3, 2], 0.0, "SM3", "GOPT").await?),
        ])?;
        assert_eq!(set.all_vector_names(), ["FOPT", "GOPT", "WOPT"]);
        assert_eq!(set.all_realizations(), [0, 2, 3]);
        assert_eq!(set.all_dates(None)?, vec![0, 86_400_000]);
        assert_eq!(set.names(), ["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let p = member(&tmp, "a", &[0], 0.0, "SM3", "X").await?;
        let err = ProviderSet::new(vec![("a".into(), Arc::clone(&p)), ("a".into(), p)])
            .expect_err("same name twice");
        assert_eq!(err.category(), ErrorCategory::InvalidRequest);
        Ok(())
    }

    #[tokio::test]
    async fn metadata_gate_reports_the_disagreeing_pair() -> TestResult {
        let tmp = TempDir::new()?;
        let consistent = ProviderSet::new(vec![
            ("a".into(), member(&tmp, "a", &[0], 0.0, "SM3", "X").await?),
            ("b".into(), member(&tmp, "b", &[0], 0.0, "SM3", "Y").await?),
        ])?;
        consistent.verify_consistent_vector_metadata()?;
        assert_eq!(consistent.vector_metadata("FOPT")?, Some(meta("SM3")));
        assert_eq!(consistent.vector_metadata("X")?, None);

        let altered = ProviderSet::new(vec![
            ("a".into(), member(&tmp, "c", &[0], 0.0, "SM3", "X").await?),
            ("b".into(), member(&tmp, "d", &[0], 0.0, "RM3", "Y").await?),
        ])?;
        let err = altered
            .verify_consistent_vector_metadata()
            .expect_err("units differ");
        assert_eq!(err.category(), ErrorCategory::InconsistentMetadata);
        assert!(matches!(
            &err,
            ProviderSetError::InconsistentMetadata { vector, first, second, attribute: "unit" }
                if vector == "FOPT" && first == "a" && second == "b"
        ));

        let picked = altered.vector_metadata_with_precedence("FOPT", &["b", "a"])?;
        assert_eq!(picked, Some(meta("RM3")));
        assert!(altered.vector_metadata_with_precedence("FOPT", &["zz"]).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn delta_covers_the_intersection() -> TestResult {
        let tmp = TempDir::new()?;
        let set = ProviderSet::new(vec![
            ("A".into(), member(&tmp, "a", &[0, 1, 2], 100.0, "SM3", "WOPT").await?),
            ("B".into(), member(&tmp, "b", &[1, 2, 3], 10.0, "SM3", "GOPT").await?),
        ])?;
        let delta = set.delta_provider("A", "B")?;
        assert_eq!(delta.name(), "A - B");
        assert_eq!(delta.realizations(), [1, 2]);
        assert_eq!(delta.vector_names(), ["FOPT"]);
        assert_eq!(delta.vector_metadata("FOPT"), Some(meta("SM3")));

        let out = delta.get_vectors_df(&["FOPT"], None, None)?;
        assert_eq!(out.num_rows(), 4);
        let reals = out.column(1).as_primitive::<Int64Type>().values().to_vec();
        assert_eq!(reals, vec![1, 2, 1, 2]);
        let values = out.column(2).as_primitive::<Float64Type>().values().to_vec();
        assert_eq!(values, vec![90.0; 4]);

        let one = delta.get_vectors_for_date_df(0, &["FOPT"], Some(&[2, 3]))?;
        assert_eq!(one.num_rows(), 1);
        assert_eq!(one.column(0).as_primitive::<Int64Type>().value(0), 2);

        assert!(delta.get_vectors_df(&["WOPT"], None, None).is_err());
        assert!(Arc::ptr_eq(&delta, &set.delta_provider("A", "B")?));
        Ok(())
    }
}
