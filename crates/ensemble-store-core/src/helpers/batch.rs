//! RecordBatch transforms used during import and query.

use std::{collections::BTreeSet, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, new_null_array},
    compute::{SortColumn, cast, concat_batches, lexsort_to_indices, take_record_batch},
    datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit},
    error::ArrowError,
    record_batch::RecordBatch,
};

/// The `DATE` column type used in every artifact.
pub const DATE_TYPE: DataType = DataType::Timestamp(TimeUnit::Millisecond, None);

fn unify_types(a: &DataType, b: &DataType) -> DataType {
    if a == b {
        a.clone()
    } else if a.is_numeric() && b.is_numeric() {
        DataType::Float64
    } else if *a == DataType::Null {
        b.clone()
    } else if *b == DataType::Null {
        a.clone()
    } else {
        DataType::Utf8
    }
}

/// Concatenate batches whose column sets may differ.
///
/// The result holds every column seen in any batch, in order of first
/// appearance. Rows from a batch lacking a column get nulls there. A column
/// whose type differs between batches is widened to `Float64` when all types
/// are numeric and to `Utf8` otherwise. Field metadata is taken from the
/// first batch that carries any for that column.
pub fn concat_outer(batches: &[RecordBatch]) -> Result<RecordBatch, ArrowError> {
    let Some(first) = batches.first() else {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    };
    if batches.iter().all(|b| b.schema() == first.schema()) {
        return concat_batches(&first.schema(), batches);
    }

    let mut fields: Vec<Field> = Vec::new();
    for batch in batches {
        for field in batch.schema().fields() {
            match fields.iter_mut().find(|f| f.name() == field.name()) {
                Some(existing) => {
                    let ty = unify_types(existing.data_type(), field.data_type());
                    let mut merged = Field::new(existing.name(), ty, true);
                    merged = if existing.metadata().is_empty() {
                        merged.with_metadata(field.metadata().clone())
                    } else {
                        merged.with_metadata(existing.metadata().clone())
                    };
                    *existing = merged;
                }
                None => fields.push(field.as_ref().clone().with_nullable(true)),
            }
        }
    }
    let schema: SchemaRef = Arc::new(Schema::new(fields));

    let aligned = batches
        .iter()
        .map(|batch| align_to_schema(batch, &schema))
        .collect::<Result<Vec<_>, _>>()?;
    concat_batches(&schema, &aligned)
}

fn align_to_schema(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch, ArrowError> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(col) if col.data_type() == field.data_type() => Ok(Arc::clone(col)),
            Some(col) => cast(col, field.data_type()),
            None => Ok(new_null_array(field.data_type(), batch.num_rows())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    RecordBatch::try_new(Arc::clone(schema), columns)
}

/// Distinct non-null values of a column, rendered as strings, sorted.
pub fn distinct_strings(array: &ArrayRef) -> Result<BTreeSet<String>, ArrowError> {
    let strings = cast(array, &DataType::Utf8)?;
    Ok(strings
        .as_string::<i32>()
        .iter()
        .flatten()
        .map(str::to_string)
        .collect())
}

/// Replace column `idx` with `array` under `field`.
pub fn replace_column(
    batch: &RecordBatch,
    idx: usize,
    field: Field,
    array: ArrayRef,
) -> Result<RecordBatch, ArrowError> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns = batch.columns().to_vec();
    fields[idx] = field;
    columns[idx] = array;
    RecordBatch::try_new(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
    )
}

/// Drop the named column if present.
pub fn drop_column(batch: &RecordBatch, name: &str) -> Result<RecordBatch, ArrowError> {
    match batch.schema().index_of(name) {
        Ok(idx) => {
            let keep: Vec<usize> = (0..batch.num_columns()).filter(|i| *i != idx).collect();
            batch.project(&keep)
        }
        Err(_) => Ok(batch.clone()),
    }
}

/// Rename column `from` to `to`, keeping its type and metadata.
pub fn rename_column(batch: &RecordBatch, from: &str, to: &str) -> Result<RecordBatch, ArrowError> {
    let Ok(idx) = batch.schema().index_of(from) else {
        return Ok(batch.clone());
    };
    let field = batch.schema().field(idx).clone().with_name(to);
    replace_column(batch, idx, field, Arc::clone(batch.column(idx)))
}

/// Prepend an `Int64` column holding `value` on every row.
pub fn prepend_constant_i64(
    batch: &RecordBatch,
    name: &str,
    value: i64,
) -> Result<RecordBatch, ArrowError> {
    let schema = batch.schema();
    let mut fields = vec![Field::new(name, DataType::Int64, false)];
    fields.extend(schema.fields().iter().map(|f| f.as_ref().clone()));
    let mut columns: Vec<ArrayRef> = vec![Arc::new(Int64Array::from_value(value, batch.num_rows()))];
    columns.extend(batch.columns().iter().cloned());
    RecordBatch::try_new(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
    )
}

/// Cast the named column to `ty` if it has a different type.
pub fn cast_column(batch: &RecordBatch, name: &str, ty: &DataType) -> Result<RecordBatch, ArrowError> {
    let idx = batch.schema().index_of(name)?;
    let field = batch.schema().field(idx).clone();
    if field.data_type() == ty {
        return Ok(batch.clone());
    }
    let array = cast(batch.column(idx), ty)?;
    replace_column(batch, idx, field.with_data_type(ty.clone()), array)
}

/// Store every `Float64` column except those in `skip` as `Float32`.
///
/// Columns that are already `Float32` are left untouched, so applying this
/// twice is the same as applying it once.
pub fn downcast_floats(batch: &RecordBatch, skip: &[&str]) -> Result<RecordBatch, ArrowError> {
    let mut out = batch.clone();
    let schema = batch.schema();
    for (idx, field) in schema.fields().iter().enumerate() {
        if field.data_type() != &DataType::Float64 || skip.contains(&field.name().as_str()) {
            continue;
        }
        let array = cast(batch.column(idx), &DataType::Float32)?;
        let narrowed = field.as_ref().clone().with_data_type(DataType::Float32);
        out = replace_column(&out, idx, narrowed, array)?;
    }
    Ok(out)
}

/// Sort rows lexicographically (ascending) by the named columns.
pub fn sort_batch(batch: &RecordBatch, by: &[&str]) -> Result<RecordBatch, ArrowError> {
    if by.is_empty() || batch.num_rows() < 2 {
        return Ok(batch.clone());
    }
    let sort_columns = by
        .iter()
        .map(|name| {
            let idx = batch.schema().index_of(name)?;
            Ok(SortColumn {
                values: Arc::clone(batch.column(idx)),
                options: None,
            })
        })
        .collect::<Result<Vec<_>, ArrowError>>()?;
    let indices = lexsort_to_indices(&sort_columns, None)?;
    take_record_batch(batch, &indices)
}

/// View any numeric column as `Float64`.
pub fn as_f64(array: &ArrayRef) -> Result<Float64Array, ArrowError> {
    let cast = cast(array, &DataType::Float64)?;
    Ok(cast.as_primitive::<arrow::datatypes::Float64Type>().clone())
}

/// View an integer realization or timestamp column as `i64`.
pub fn as_i64(array: &ArrayRef) -> Result<Int64Array, ArrowError> {
    let cast = cast(array, &DataType::Int64)?;
    Ok(cast.as_primitive::<arrow::datatypes::Int64Type>().clone())
}
