#![allow(dead_code)]

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, Float64Array, TimestampMillisecondArray},
    datatypes::{DataType, Field, Schema, TimeUnit},
    ipc::writer::FileWriter,
    record_batch::RecordBatch,
};
use chrono::NaiveDate;
use ensemble_store_core::metadata::VectorMetadata;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Relative path of summary files inside a realization.
pub const SUMMARY_FILE: &str = "share/results/unsmry/summary.arrow";

/// One summary vector of a fixture file.
pub struct Vector {
    pub name: String,
    pub metadata: Option<VectorMetadata>,
    pub values: Vec<f64>,
}

impl Vector {
    pub fn new(name: &str, metadata: Option<VectorMetadata>, values: Vec<f64>) -> Self {
        Vector {
            name: name.to_string(),
            metadata,
            values,
        }
    }
}

pub fn total_meta(keyword: &str, unit: &str) -> VectorMetadata {
    VectorMetadata {
        unit: unit.to_string(),
        is_total: true,
        is_rate: false,
        is_historical: false,
        source_keyword: keyword.to_string(),
        owner_name: None,
        owner_number: None,
    }
}

pub fn rate_meta(keyword: &str, unit: &str) -> VectorMetadata {
    VectorMetadata {
        is_total: false,
        is_rate: true,
        ..total_meta(keyword, unit)
    }
}

pub fn millis(y: i32, m: u32, d: u32) -> Result<i64, &'static str> {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or("invalid date")
}

/// First day of `count` consecutive months starting January 2000.
pub fn monthly_dates(count: usize) -> Result<Vec<i64>, &'static str> {
    (0..count as i32)
        .map(|m| millis(2000 + m / 12, (m % 12) as u32 + 1, 1))
        .collect()
}

/// Directory of realization `real` under `root`.
pub fn realization_dir(root: &Path, real: u32) -> PathBuf {
    root.join(format!("realization-{real}")).join("iter-0")
}

/// `(name, glob)` pair for an ensemble laid out by [`realization_dir`].
pub fn ensemble(name: &str, root: &Path) -> (String, PathBuf) {
    (name.to_string(), root.join("realization-*").join("iter-0"))
}

pub fn write_realization_file(root: &Path, real: u32, rel: &str, body: &str) -> std::io::Result<PathBuf> {
    let file = realization_dir(root, real).join(rel);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file, body)?;
    Ok(file)
}

/// Write an Arrow IPC summary file `[DATE, vectors...]` for one realization.
pub fn write_summary(
    root: &Path,
    real: u32,
    dates: &[i64],
    vectors: &[Vector],
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut fields = vec![Field::new(
        "DATE",
        DataType::Timestamp(TimeUnit::Millisecond, None),
        false,
    )];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(TimestampMillisecondArray::from(dates.to_vec()))];
    for v in vectors {
        let mut field = Field::new(&v.name, DataType::Float64, true);
        if let Some(meta) = &v.metadata {
            field = field.with_metadata(meta.to_field_metadata());
        }
        fields.push(field);
        columns.push(Arc::new(Float64Array::from(v.values.clone())));
    }
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;

    let file = realization_dir(root, real).join(SUMMARY_FILE);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = FileWriter::try_new(File::create(&file)?, &schema)?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(file)
}

/// Realizations `reals` with `FOPT = offset + real * 10 + i` and
/// `FOPR = real + 1` on `dates`.
pub fn write_basic_ensemble(
    root: &Path,
    reals: &[u32],
    dates: &[i64],
    offset: f64,
    fopt_unit: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    for &real in reals {
        let fopt = (0..dates.len())
            .map(|i| offset + f64::from(real) * 10.0 + i as f64)
            .collect();
        let fopr = vec![f64::from(real) + 1.0; dates.len()];
        write_summary(
            root,
            real,
            dates,
            &[
                Vector::new("FOPT", Some(total_meta("FOPT", fopt_unit)), fopt),
                Vector::new("FOPR", Some(rate_meta("FOPR", "SM3/DAY")), fopr),
            ],
        )?;
    }
    Ok(())
}
