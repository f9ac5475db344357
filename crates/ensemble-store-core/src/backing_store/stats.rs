//! Column min/max derived from Parquet row-group statistics.
//!
//! Statistics are read once from the footer when an artifact is opened, so
//! range queries never decode column data.

use std::collections::BTreeMap;

use arrow::datatypes::{DataType, Schema};
use parquet::file::{metadata::ParquetMetaData, statistics::Statistics};

/// Min/max of one numeric column across the whole artifact.
///
/// Timestamp columns report their raw `i64` value (milliseconds since the
/// epoch for `DATE`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnRange {
    /// Integer or timestamp column.
    Int {
        /// Smallest value.
        min: i64,
        /// Largest value.
        max: i64,
    },
    /// Floating-point column.
    Float {
        /// Smallest value.
        min: f64,
        /// Largest value.
        max: f64,
    },
}

impl ColumnRange {
    /// Bounds as `f64`, whatever the column type.
    pub fn as_f64(&self) -> (f64, f64) {
        match *self {
            ColumnRange::Int { min, max } => (min as f64, max as f64),
            ColumnRange::Float { min, max } => (min, max),
        }
    }

    /// Bounds as `i64`; `None` for float columns.
    pub fn as_i64(&self) -> Option<(i64, i64)> {
        match *self {
            ColumnRange::Int { min, max } => Some((min, max)),
            ColumnRange::Float { .. } => None,
        }
    }

    fn merge(self, other: ColumnRange) -> Option<ColumnRange> {
        match (self, other) {
            (ColumnRange::Int { min: a, max: b }, ColumnRange::Int { min: c, max: d }) => {
                Some(ColumnRange::Int {
                    min: a.min(c),
                    max: b.max(d),
                })
            }
            (ColumnRange::Float { min: a, max: b }, ColumnRange::Float { min: c, max: d }) => {
                Some(ColumnRange::Float {
                    min: a.min(c),
                    max: b.max(d),
                })
            }
            _ => None,
        }
    }
}

/// Range of one column chunk, if its statistics carry usable bounds.
pub(crate) fn chunk_range(stats: &Statistics) -> Option<ColumnRange> {
    match stats {
        Statistics::Int32(s) => Some(ColumnRange::Int {
            min: i64::from(*s.min_opt()?),
            max: i64::from(*s.max_opt()?),
        }),
        Statistics::Int64(s) => Some(ColumnRange::Int {
            min: *s.min_opt()?,
            max: *s.max_opt()?,
        }),
        Statistics::Float(s) => float_range(f64::from(*s.min_opt()?), f64::from(*s.max_opt()?)),
        Statistics::Double(s) => float_range(*s.min_opt()?, *s.max_opt()?),
        _ => None,
    }
}

fn float_range(min: f64, max: f64) -> Option<ColumnRange> {
    (!min.is_nan() && !max.is_nan()).then_some(ColumnRange::Float { min, max })
}

fn has_ordered_stats(ty: &DataType) -> bool {
    ty.is_signed_integer()
        || ty.is_floating()
        || matches!(
            ty,
            DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
        )
}

/// Collect ranges for every column whose row groups all carry statistics.
///
/// A column with any non-empty row group lacking bounds is left out rather
/// than reported with a partial range.
pub(crate) fn column_ranges(metadata: &ParquetMetaData, schema: &Schema) -> BTreeMap<String, ColumnRange> {
    let mut out = BTreeMap::new();

    'columns: for (idx, field) in schema.fields().iter().enumerate() {
        if !has_ordered_stats(field.data_type()) {
            continue;
        }
        let mut acc: Option<ColumnRange> = None;
        for rg in metadata.row_groups() {
            if rg.num_rows() == 0 || idx >= rg.num_columns() {
                continue;
            }
            let Some(range) = rg.column(idx).statistics().and_then(chunk_range) else {
                continue 'columns;
            };
            acc = match acc {
                None => Some(range),
                Some(prev) => match prev.merge(range) {
                    Some(merged) => Some(merged),
                    None => continue 'columns,
                },
            };
        }
        if let Some(range) = acc {
            out.insert(field.name().clone(), range);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_widens_bounds() {
        let a = ColumnRange::Int { min: 3, max: 5 };
        let b = ColumnRange::Int { min: -1, max: 4 };
        assert_eq!(a.merge(b), Some(ColumnRange::Int { min: -1, max: 5 }));

        let f = ColumnRange::Float { min: 0.0, max: 1.0 };
        assert_eq!(a.merge(f), None);
        assert_eq!(f.as_f64(), (0.0, 1.0));
        assert_eq!(f.as_i64(), None);
    }

    #[test]
    fn nan_bounds_are_unusable() {
        assert_eq!(float_range(f64::NAN, 1.0), None);
        assert_eq!(
            float_range(-1.0, 1.0),
            Some(ColumnRange::Float { min: -1.0, max: 1.0 })
        );
    }
}
