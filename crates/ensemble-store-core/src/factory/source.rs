//! Readers for per-realization and aggregated source files.

use std::{
    fs::File,
    io::{Seek, SeekFrom},
    path::Path,
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, Float64Array, StringArray},
    compute::concat_batches,
    datatypes::{DataType, Field, Schema},
    ipc::reader::FileReader,
    record_batch::RecordBatch,
};
use arrow_csv::{ReaderBuilder, reader::Format};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::prelude::*;

use super::error::{
    FactoryError, InvalidParameterLineSnafu, SourceDecodeSnafu, SourceIoSnafu,
    SourceParquetSnafu, UnsupportedSourceFormatSnafu,
};

/// Rows read to infer a CSV schema.
const CSV_INFER_RECORDS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    ArrowIpc,
    Parquet,
    Csv,
}

fn format_of(path: &Path) -> Option<SourceFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "arrow" | "feather" | "ipc" => Some(SourceFormat::ArrowIpc),
        "parquet" => Some(SourceFormat::Parquet),
        "csv" => Some(SourceFormat::Csv),
        _ => None,
    }
}

/// Read a whole source file into one batch, choosing the reader by extension.
pub(crate) fn read_table_file(path: &Path) -> Result<RecordBatch, FactoryError> {
    let format = format_of(path).context(UnsupportedSourceFormatSnafu { path })?;
    let mut file = File::open(path).context(SourceIoSnafu { path })?;

    let (schema, batches) = match format {
        SourceFormat::ArrowIpc => {
            let reader = FileReader::try_new(file, None).context(SourceDecodeSnafu { path })?;
            let schema = reader.schema();
            let batches = reader
                .collect::<Result<Vec<_>, _>>()
                .context(SourceDecodeSnafu { path })?;
            (schema, batches)
        }
        SourceFormat::Parquet => {
            let builder =
                ParquetRecordBatchReaderBuilder::try_new(file).context(SourceParquetSnafu { path })?;
            let schema = Arc::clone(builder.schema());
            let reader = builder.build().context(SourceParquetSnafu { path })?;
            let batches = reader
                .collect::<Result<Vec<_>, _>>()
                .context(SourceDecodeSnafu { path })?;
            (schema, batches)
        }
        SourceFormat::Csv => {
            let format = Format::default().with_header(true);
            let (schema, _) = format
                .infer_schema(&mut file, Some(CSV_INFER_RECORDS))
                .context(SourceDecodeSnafu { path })?;
            file.seek(SeekFrom::Start(0)).context(SourceIoSnafu { path })?;
            let schema = Arc::new(schema);
            let reader = ReaderBuilder::new(Arc::clone(&schema))
                .with_format(format)
                .build(file)
                .context(SourceDecodeSnafu { path })?;
            let batches = reader
                .collect::<Result<Vec<_>, _>>()
                .context(SourceDecodeSnafu { path })?;
            (schema, batches)
        }
    };

    concat_batches(&schema, &batches).context(SourceDecodeSnafu { path })
}

enum ParameterValue {
    Number(f64),
    Text(String),
}

/// Read a `parameters.txt` file into a one-row batch.
///
/// Each non-blank line is `NAME VALUE`; lines starting with `#` are
/// comments. Values that parse as numbers become `Float64` columns, all
/// others `Utf8`. A name given twice keeps its first position and its last
/// value.
pub(crate) fn read_parameters_file(path: &Path) -> Result<RecordBatch, FactoryError> {
    let text = std::fs::read_to_string(path).context(SourceIoSnafu { path })?;

    let mut params: Vec<(String, ParameterValue)> = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(value)) = (tokens.next(), tokens.next()) else {
            return InvalidParameterLineSnafu {
                path,
                line: idx + 1,
                content: raw,
            }
            .fail();
        };
        let value = match value.parse::<f64>() {
            Ok(v) => ParameterValue::Number(v),
            Err(_) => ParameterValue::Text(value.to_string()),
        };
        match params.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => params.push((name.to_string(), value)),
        }
    }

    let mut fields = Vec::with_capacity(params.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(params.len());
    for (name, value) in params {
        match value {
            ParameterValue::Number(v) => {
                fields.push(Field::new(name, DataType::Float64, true));
                columns.push(Arc::new(Float64Array::from(vec![v])));
            }
            ParameterValue::Text(s) => {
                fields.push(Field::new(name, DataType::Utf8, true));
                columns.push(Arc::new(StringArray::from(vec![s])));
            }
        }
    }

    let options = arrow::record_batch::RecordBatchOptions::new().with_row_count(Some(1));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)
        .context(SourceDecodeSnafu { path })
}
