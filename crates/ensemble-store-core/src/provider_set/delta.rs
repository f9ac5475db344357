//! Delta ensembles: per-realization differences between two ensembles.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use arrow::{
    array::{Array, ArrayRef, Float64Array, UInt32Array},
    compute::take,
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};
use snafu::prelude::*;

use crate::{
    frequency::Frequency,
    helpers::batch::{as_f64, as_i64},
    metadata::VectorMetadata,
    provider::{
        EnsembleSummaryProvider, ProviderError,
        error::{ArrowSnafu, EmptyColumnRequestSnafu, UnknownColumnsSnafu},
    },
};

/// Synthetic summary provider whose values are `a - b`.
///
/// It covers the realizations and vectors both members have. Rows are
/// paired on `(DATE, REAL)`; a row present on only one side is left out.
/// Values are always `Float64`.
#[derive(Debug, Clone)]
pub struct DeltaSummaryProvider {
    name: String,
    a: Arc<dyn EnsembleSummaryProvider>,
    b: Arc<dyn EnsembleSummaryProvider>,
    vector_names: Vec<String>,
    realizations: Vec<u32>,
}

impl DeltaSummaryProvider {
    /// Delta of `a` minus `b`, named `"<a_name> - <b_name>"`.
    pub fn new(
        a_name: &str,
        a: Arc<dyn EnsembleSummaryProvider>,
        b_name: &str,
        b: Arc<dyn EnsembleSummaryProvider>,
    ) -> Self {
        let b_vectors: BTreeSet<String> = b.vector_names().into_iter().collect();
        let vector_names = a
            .vector_names()
            .into_iter()
            .filter(|v| b_vectors.contains(v))
            .collect();
        let b_reals: BTreeSet<u32> = b.realizations().into_iter().collect();
        let realizations = a
            .realizations()
            .into_iter()
            .filter(|r| b_reals.contains(r))
            .collect();

        DeltaSummaryProvider {
            name: format!("{a_name} - {b_name}"),
            a,
            b,
            vector_names,
            realizations,
        }
    }

    /// Display name of the delta ensemble.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn effective_realizations(&self, requested: Option<&[u32]>) -> Vec<u32> {
        match requested {
            None => self.realizations.clone(),
            Some(reals) => {
                let wanted: BTreeSet<u32> = reals.iter().copied().collect();
                self.realizations
                    .iter()
                    .copied()
                    .filter(|r| wanted.contains(r))
                    .collect()
            }
        }
    }

    fn check_vectors(&self, vectors: &[&str]) -> Result<(), ProviderError> {
        ensure!(!vectors.is_empty(), EmptyColumnRequestSnafu);
        let unknown: Vec<String> = vectors
            .iter()
            .filter(|v| !self.vector_names.iter().any(|n| n.as_str() == **v))
            .map(|v| v.to_string())
            .collect();
        ensure!(
            unknown.is_empty(),
            UnknownColumnsSnafu {
                key: self.name.as_str(),
                columns: unknown,
            }
        );
        Ok(())
    }

    /// Pair rows of `a` and `b` on their first `key_columns` columns and
    /// subtract the remaining (vector) columns.
    fn subtract(
        &self,
        a: &RecordBatch,
        b: &RecordBatch,
        key_columns: usize,
    ) -> Result<RecordBatch, ArrowError> {
        let row_keys = |batch: &RecordBatch| -> Result<Vec<Vec<Option<i64>>>, ArrowError> {
            let cols = (0..key_columns)
                .map(|i| as_i64(batch.column(i)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((0..batch.num_rows())
                .map(|row| cols.iter().map(|c| c.is_valid(row).then(|| c.value(row))).collect())
                .collect())
        };

        let b_index: HashMap<Vec<Option<i64>>, u32> = row_keys(b)?
            .into_iter()
            .enumerate()
            .map(|(i, k)| (k, i as u32))
            .collect();
        let (a_rows, b_rows): (Vec<u32>, Vec<u32>) = row_keys(a)?
            .iter()
            .enumerate()
            .filter_map(|(i, k)| b_index.get(k).map(|&j| (i as u32, j)))
            .unzip();
        let a_take = UInt32Array::from(a_rows);
        let b_take = UInt32Array::from(b_rows);

        let a_schema = a.schema();
        let mut fields: Vec<Field> = Vec::with_capacity(a.num_columns());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(a.num_columns());
        for i in 0..key_columns {
            fields.push(a_schema.field(i).as_ref().clone());
            columns.push(take(a.column(i), &a_take, None)?);
        }

        for i in key_columns..a.num_columns() {
            let name = a_schema.field(i).name();
            let b_idx = b.schema().index_of(name)?;
            let lhs = as_f64(&take(a.column(i), &a_take, None)?)?;
            let rhs = as_f64(&take(b.column(b_idx), &b_take, None)?)?;
            let diff: Float64Array = lhs
                .iter()
                .zip(rhs.iter())
                .map(|(x, y)| Some(x? - y?))
                .collect();

            let mut field = Field::new(name, DataType::Float64, true);
            if let Some(meta) = self.vector_metadata(name) {
                field = field.with_metadata(meta.to_field_metadata());
            }
            fields.push(field);
            columns.push(Arc::new(diff));
        }

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
    }
}

impl EnsembleSummaryProvider for DeltaSummaryProvider {
    fn vector_names(&self) -> Vec<String> {
        self.vector_names.clone()
    }

    fn realizations(&self) -> Vec<u32> {
        self.realizations.clone()
    }

    /// Metadata of `vector` when both members agree on it.
    fn vector_metadata(&self, vector: &str) -> Option<VectorMetadata> {
        if !self.vector_names.iter().any(|v| v == vector) {
            return None;
        }
        match (self.a.vector_metadata(vector), self.b.vector_metadata(vector)) {
            (Some(a), Some(b)) if a.first_mismatch(&b).is_none() => Some(a),
            _ => None,
        }
    }

    fn supports_resampling(&self) -> bool {
        self.a.supports_resampling() && self.b.supports_resampling()
    }

    fn dates(
        &self,
        frequency: Option<Frequency>,
        realizations: Option<&[u32]>,
    ) -> Result<Vec<i64>, ProviderError> {
        let reals = self.effective_realizations(realizations);
        let b_dates: BTreeSet<i64> = self.b.dates(frequency, Some(&reals))?.into_iter().collect();
        Ok(self
            .a
            .dates(frequency, Some(&reals))?
            .into_iter()
            .filter(|d| b_dates.contains(d))
            .collect())
    }

    fn get_vectors_df(
        &self,
        vectors: &[&str],
        frequency: Option<Frequency>,
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError> {
        self.check_vectors(vectors)?;
        let reals = self.effective_realizations(realizations);
        let a = self.a.get_vectors_df(vectors, frequency, Some(&reals))?;
        let resolved = vector_columns(&a, 2);
        let b = self.b.get_vectors_df(&resolved, frequency, Some(&reals))?;
        self.subtract(&a, &b, 2)
            .context(ArrowSnafu { key: self.name.as_str() })
    }

    fn get_vectors_for_date_df(
        &self,
        date: i64,
        vectors: &[&str],
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError> {
        self.check_vectors(vectors)?;
        let reals = self.effective_realizations(realizations);
        let a = self.a.get_vectors_for_date_df(date, vectors, Some(&reals))?;
        let resolved = vector_columns(&a, 1);
        let b = self.b.get_vectors_for_date_df(date, &resolved, Some(&reals))?;
        self.subtract(&a, &b, 1)
            .context(ArrowSnafu { key: self.name.as_str() })
    }
}

/// Names of the columns after the first `skip` key columns.
fn vector_columns(batch: &RecordBatch, skip: usize) -> Vec<&str> {
    batch
        .schema_ref()
        .fields()
        .iter()
        .skip(skip)
        .map(|f| f.name().as_str())
        .collect()
}
