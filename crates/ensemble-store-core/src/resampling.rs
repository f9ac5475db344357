//! Resampling of summary vectors onto regular sample dates.
//!
//! Rate vectors are backfilled: the value at sample date `t` is the raw
//! value at the first raw date `>= t`, and `0` outside the raw date range.
//! Every other vector is linearly interpolated in time and clamped to its
//! first/last raw value. Arithmetic is `f64`; output columns keep `Float32`
//! when the input was `Float32` and are `Float64` otherwise.
//!
//! Presampled import and lazy query-time resampling both go through
//! [`resample_table`], so the two modes agree bit for bit.

use std::{collections::BTreeMap, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, Float32Array, Float64Array, Int64Array, TimestampMillisecondArray},
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};
use rayon::prelude::*;
use snafu::prelude::*;

use crate::{
    DATE, REAL,
    helpers::batch::{DATE_TYPE, as_f64, as_i64},
    metadata::{MetadataError, VectorMetadata},
};

/// Errors resampling a summary table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResamplingError {
    /// `DATE` or `REAL` is absent.
    #[snafu(display("summary table has no '{column}' column"))]
    MissingColumn {
        /// The missing column.
        column: &'static str,
    },

    /// Vector metadata on a field is malformed.
    #[snafu(display("{source}"))]
    Metadata {
        /// Underlying metadata error.
        source: MetadataError,
    },

    /// An Arrow kernel failed.
    #[snafu(display("Arrow error while resampling: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Linear interpolation clamped to the end values.
///
/// `dates` must be ascending. Returns `None` for every sample when there
/// are no raw points.
pub fn interpolate_linear(dates: &[i64], values: &[f64], samples: &[i64]) -> Vec<Option<f64>> {
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return vec![None; samples.len()];
    };
    samples
        .iter()
        .map(|&t| {
            if t <= first {
                return Some(values[0]);
            }
            if t >= last {
                return Some(values[values.len() - 1]);
            }
            let hi = dates.partition_point(|&d| d <= t);
            let lo = hi - 1;
            let (d0, d1) = (dates[lo], dates[hi]);
            if d0 == t || d1 == d0 {
                return Some(values[lo]);
            }
            let frac = (t - d0) as f64 / (d1 - d0) as f64;
            Some(values[lo] + (values[hi] - values[lo]) * frac)
        })
        .collect()
}

/// Backfill for rate vectors: first raw value at or after each sample,
/// `0` outside the raw date range.
///
/// `dates` must be ascending. Returns `None` for every sample when there
/// are no raw points.
pub fn interpolate_backfill(dates: &[i64], values: &[f64], samples: &[i64]) -> Vec<Option<f64>> {
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return vec![None; samples.len()];
    };
    samples
        .iter()
        .map(|&t| {
            if t < first || t > last {
                return Some(0.0);
            }
            let idx = dates.partition_point(|&d| d < t);
            Some(values[idx])
        })
        .collect()
}

struct Groups {
    reals: Vec<i64>,
    /// Row indices per realization, ascending by date.
    rows: Vec<Vec<usize>>,
    dates: Int64Array,
}

fn group_by_realization(batch: &RecordBatch) -> Result<Groups, ResamplingError> {
    let date_col = batch
        .column_by_name(DATE)
        .context(MissingColumnSnafu { column: DATE })?;
    let real_col = batch
        .column_by_name(REAL)
        .context(MissingColumnSnafu { column: REAL })?;
    let dates = as_i64(date_col).context(ArrowSnafu)?;
    let reals = as_i64(real_col).context(ArrowSnafu)?;

    let mut by_real: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        if reals.is_valid(row) && dates.is_valid(row) {
            by_real.entry(reals.value(row)).or_default().push(row);
        }
    }
    for rows in by_real.values_mut() {
        rows.sort_by_key(|&r| dates.value(r));
    }

    let (reals, rows) = by_real.into_iter().unzip();
    Ok(Groups { reals, rows, dates })
}

fn resample_vector(
    groups: &Groups,
    values: &Float64Array,
    is_rate: bool,
    samples: &[i64],
) -> Vec<Option<f64>> {
    let per_group: Vec<Vec<Option<f64>>> = groups
        .rows
        .iter()
        .map(|rows| {
            let (d, v): (Vec<i64>, Vec<f64>) = rows
                .iter()
                .filter(|&&r| values.is_valid(r))
                .map(|&r| (groups.dates.value(r), values.value(r)))
                .unzip();
            if is_rate {
                interpolate_backfill(&d, &v, samples)
            } else {
                interpolate_linear(&d, &v, samples)
            }
        })
        .collect();

    // Emit in (DATE, REAL) order.
    let mut out = Vec::with_capacity(samples.len() * per_group.len());
    for s in 0..samples.len() {
        for g in &per_group {
            out.push(g[s]);
        }
    }
    out
}

/// Resample a `[DATE, REAL, vectors...]` table onto `samples`.
///
/// Every realization present in `batch` gets one row per sample date; the
/// result is ordered by `(DATE, REAL)`. Vector field metadata is preserved
/// and decides the rule: `is_rate` vectors are backfilled, all others
/// (including vectors without metadata) are interpolated.
pub fn resample_table(batch: &RecordBatch, samples: &[i64]) -> Result<RecordBatch, ResamplingError> {
    let groups = group_by_realization(batch)?;
    let schema = batch.schema();

    let vector_fields: Vec<(usize, &Arc<Field>)> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name() != DATE && f.name() != REAL)
        .collect();

    let columns: Vec<(Field, ArrayRef)> = vector_fields
        .par_iter()
        .map(|&(idx, field)| {
            let is_rate = VectorMetadata::from_field(field)
                .context(MetadataSnafu)?
                .is_some_and(|m| m.is_rate);
            let values = as_f64(batch.column(idx)).context(ArrowSnafu)?;
            let resampled = resample_vector(&groups, &values, is_rate, samples);

            let (ty, array): (DataType, ArrayRef) = if field.data_type() == &DataType::Float32 {
                let narrowed: Float32Array = resampled.iter().map(|v| v.map(|x| x as f32)).collect();
                (DataType::Float32, Arc::new(narrowed))
            } else {
                (DataType::Float64, Arc::new(Float64Array::from(resampled)))
            };
            let out_field = Field::new(field.name(), ty, true).with_metadata(field.metadata().clone());
            Ok((out_field, array))
        })
        .collect::<Result<_, ResamplingError>>()?;

    let n_groups = groups.reals.len();
    let mut date_values = Vec::with_capacity(samples.len() * n_groups);
    let mut real_values = Vec::with_capacity(samples.len() * n_groups);
    for &t in samples {
        for &r in &groups.reals {
            date_values.push(t);
            real_values.push(r);
        }
    }

    let mut fields = vec![
        Field::new(DATE, DATE_TYPE, false),
        Field::new(REAL, DataType::Int64, false),
    ];
    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(TimestampMillisecondArray::from(date_values)),
        Arc::new(Int64Array::from(real_values)),
    ];
    for (field, array) in columns {
        fields.push(field);
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context(ArrowSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::datatypes::{Float32Type, Float64Type, Int64Type};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn linear_interpolates_and_clamps() {
        let out = interpolate_linear(&[10, 20], &[1.0, 3.0], &[0, 10, 15, 20, 30]);
        assert_eq!(out, vec![Some(1.0), Some(1.0), Some(2.0), Some(3.0), Some(3.0)]);
    }

    #[test]
    fn backfill_takes_next_value_and_zero_outside() {
        let out = interpolate_backfill(&[10, 20, 30], &[1.0, 2.0, 3.0], &[0, 10, 15, 30, 31]);
        assert_eq!(out, vec![Some(0.0), Some(1.0), Some(2.0), Some(3.0), Some(0.0)]);
    }

    #[test]
    fn empty_input_yields_nulls() {
        assert_eq!(interpolate_linear(&[], &[], &[1, 2]), vec![None, None]);
        assert_eq!(interpolate_backfill(&[], &[], &[1]), vec![None]);
    }

    fn raw_table() -> Result<RecordBatch, ArrowError> {
        let rate_meta = VectorMetadata {
            unit: "SM3/DAY".to_string(),
            is_total: false,
            is_rate: true,
            is_historical: false,
            source_keyword: "FOPR".to_string(),
            owner_name: None,
            owner_number: None,
        };
        let schema = Schema::new(vec![
            Field::new(DATE, DATE_TYPE, false),
            Field::new(REAL, DataType::Int64, false),
            Field::new("FOPR", DataType::Float64, true).with_metadata(rate_meta.to_field_metadata()),
            Field::new("FOPT", DataType::Float32, true),
        ]);
        // Realization 1 rows are out of date order on purpose.
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(TimestampMillisecondArray::from(vec![0, 100, 100, 0])),
                Arc::new(Int64Array::from(vec![0, 0, 1, 1])),
                Arc::new(Float64Array::from(vec![5.0, 7.0, 9.0, 8.0])),
                Arc::new(Float32Array::from(vec![0.0, 10.0, 20.0, 0.0])),
            ],
        )
    }

    #[test]
    fn resample_table_orders_by_date_then_realization() -> TestResult {
        let out = resample_table(&raw_table()?, &[0, 50, 100])?;
        assert_eq!(out.num_rows(), 6);

        let dates = out.column(0).as_primitive::<arrow::datatypes::TimestampMillisecondType>();
        assert_eq!(dates.values().to_vec(), vec![0, 0, 50, 50, 100, 100]);
        let reals = out.column(1).as_primitive::<Int64Type>();
        assert_eq!(reals.values().to_vec(), vec![0, 1, 0, 1, 0, 1]);

        // Rate: backfill.
        let fopr = out.column(2).as_primitive::<Float64Type>();
        assert_eq!(fopr.values().to_vec(), vec![5.0, 8.0, 7.0, 9.0, 7.0, 9.0]);
        assert!(out.schema().field(2).metadata().contains_key("is_rate"));

        // Non-rate Float32 stays Float32 and is interpolated.
        assert_eq!(out.schema().field(3).data_type(), &DataType::Float32);
        let fopt = out.column(3).as_primitive::<Float32Type>();
        assert_eq!(fopt.values().to_vec(), vec![0.0, 0.0, 5.0, 10.0, 10.0, 20.0]);
        Ok(())
    }

    #[test]
    fn missing_real_column_is_reported() -> TestResult {
        let batch = raw_table()?.project(&[0, 2])?;
        let err = resample_table(&batch, &[0]).expect_err("no REAL");
        assert!(matches!(err, ResamplingError::MissingColumn { column: "REAL" }));
        Ok(())
    }
}
