#![allow(missing_docs)]

mod common;

use std::collections::BTreeSet;

use arrow::{
    array::AsArray,
    datatypes::{DataType, Float64Type, Int64Type, TimeUnit, TimestampMillisecondType},
};
use common::{
    SUMMARY_FILE, TestResult, Vector, ensemble, millis, monthly_dates, rate_meta, total_meta,
    write_basic_ensemble, write_summary,
};
use ensemble_store_core::{
    DATE, REAL,
    config::StoreConfig,
    error::ErrorCategory,
    factory::{ProviderFactory, SummaryImportOptions},
    frequency::Frequency,
    provider::EnsembleSummaryProvider,
};
use futures::future::join_all;
use tempfile::TempDir;

#[tokio::test]
async fn ten_realizations_of_a_wide_summary() -> TestResult {
    let data = TempDir::new()?;
    let store = TempDir::new()?;
    let dates = monthly_dates(380)?;
    for real in 0..10u32 {
        let mut vectors = vec![Vector::new(
            "FOPR",
            Some(rate_meta("FOPR", "SM3/DAY")),
            vec![f64::from(real); dates.len()],
        )];
        vectors.extend((0..472).map(|i| {
            Vector::new(&format!("WOPT:W{i:03}"), None, vec![i as f64; dates.len()])
        }));
        write_summary(data.path(), real, &dates, &vectors)?;
    }

    let factory = ProviderFactory::new(StoreConfig::new(store.path()))?;
    let providers = factory
        .create_presampled_summary_providers(
            &[ensemble("iter-0", data.path())],
            SUMMARY_FILE,
            &SummaryImportOptions::default(),
        )
        .await?;
    let provider = &providers["iter-0"];
    assert_eq!(provider.vector_names().len(), 473);
    assert_eq!(provider.realizations(), (0..10).collect::<Vec<u32>>());

    let out = provider.get_vectors_df(&["FOPR"], None, None)?;
    assert_eq!((out.num_rows(), out.num_columns()), (3800, 3));
    let names: Vec<_> = out.schema().fields().iter().map(|f| f.name().clone()).collect();
    assert_eq!(names, [DATE, REAL, "FOPR"]);
    assert_eq!(
        out.schema().field(0).data_type(),
        &DataType::Timestamp(TimeUnit::Millisecond, None)
    );

    let reals: BTreeSet<i64> = out.column(1).as_primitive::<Int64Type>().values().iter().copied().collect();
    assert_eq!(reals.len(), 10);

    // Sorted by (DATE, REAL).
    let d = out.column(0).as_primitive::<TimestampMillisecondType>();
    let r = out.column(1).as_primitive::<Int64Type>();
    for i in 1..out.num_rows() {
        assert!((d.value(i - 1), r.value(i - 1)) < (d.value(i), r.value(i)));
    }
    assert_eq!(factory.registry().stats().conversions, 1);
    Ok(())
}

#[tokio::test]
async fn realization_and_date_filters() -> TestResult {
    let data = TempDir::new()?;
    let store = TempDir::new()?;
    let dates = monthly_dates(12)?;
    write_basic_ensemble(data.path(), &[0, 1, 2, 3, 4, 5], &dates, 0.0, "SM3")?;

    let factory = ProviderFactory::new(StoreConfig::new(store.path()).with_row_group_size(10))?;
    let providers = factory
        .create_lazy_summary_providers(
            &[ensemble("iter-0", data.path())],
            SUMMARY_FILE,
            &SummaryImportOptions::default(),
        )
        .await?;
    let provider = &providers["iter-0"];

    let out = provider.get_vectors_df(&["FOPT"], None, Some(&[2, 5]))?;
    assert_eq!(out.num_rows(), 24);
    let reals: BTreeSet<i64> = out.column(1).as_primitive::<Int64Type>().values().iter().copied().collect();
    assert_eq!(reals, BTreeSet::from([2, 5]));

    let at = provider.get_vectors_for_date_df(dates[3], &["FOPT", "FOPR"], None)?;
    assert_eq!(at.schema().field(0).name(), REAL);
    assert_eq!(at.column(0).as_primitive::<Int64Type>().values().to_vec(), vec![0, 1, 2, 3, 4, 5]);
    let fopt = at.column(1).as_primitive::<Float64Type>();
    assert_eq!(fopt.value(4), 43.0);

    assert_eq!(provider.dates(None, Some(&[1]))?, dates);

    let err = provider
        .get_vectors_df(&["NOPE"], None, None)
        .expect_err("unknown vector");
    assert_eq!(err.category(), ErrorCategory::InvalidRequest);
    Ok(())
}

#[tokio::test]
async fn presampled_and_lazy_agree_after_resampling() -> TestResult {
    let data = TempDir::new()?;
    let store = TempDir::new()?;
    // Irregular raw dates spanning several months.
    let dates = vec![
        millis(2001, 1, 1)?,
        millis(2001, 1, 20)?,
        millis(2001, 2, 14)?,
        millis(2001, 4, 2)?,
        millis(2001, 6, 30)?,
    ];
    write_basic_ensemble(data.path(), &[0, 1, 2], &dates, 5.0, "SM3")?;
    let ensembles = [ensemble("iter-0", data.path())];

    let factory = ProviderFactory::new(StoreConfig::new(store.path()))?;
    let presampled = factory
        .create_presampled_summary_providers(
            &ensembles,
            SUMMARY_FILE,
            &SummaryImportOptions::at_frequency(Frequency::Monthly),
        )
        .await?;
    let lazy = factory
        .create_lazy_summary_providers(&ensembles, SUMMARY_FILE, &SummaryImportOptions::default())
        .await?;
    let (p, l) = (&presampled["iter-0"], &lazy["iter-0"]);
    assert!(!p.supports_resampling());
    assert!(l.supports_resampling());

    let p_dates = p.dates(None, None)?;
    assert_eq!(p_dates, l.dates(Some(Frequency::Monthly), None)?);
    assert_eq!(p_dates.first(), Some(&millis(2001, 1, 1)?));
    assert_eq!(p_dates.last(), Some(&millis(2001, 7, 1)?));

    let a = p.get_vectors_df(&["FOPT", "FOPR"], None, None)?;
    let b = l.get_vectors_df(&["FOPT", "FOPR"], Some(Frequency::Monthly), None)?;
    assert_eq!(a.columns(), b.columns());

    let err = p
        .get_vectors_df(&["FOPT"], Some(Frequency::Yearly), None)
        .expect_err("presampled data cannot be resampled again");
    assert_eq!(err.category(), ErrorCategory::InvalidRequest);
    assert_eq!(factory.registry().stats().conversions, 2);
    Ok(())
}

#[tokio::test]
async fn column_keys_limit_imported_vectors() -> TestResult {
    let data = TempDir::new()?;
    let store = TempDir::new()?;
    let dates = monthly_dates(3)?;
    for real in 0..2u32 {
        write_summary(
            data.path(),
            real,
            &dates,
            &[
                Vector::new("FOPT", Some(total_meta("FOPT", "SM3")), vec![1.0; 3]),
                Vector::new("WOPR:OP_1", Some(rate_meta("WOPR", "SM3/DAY")), vec![2.0; 3]),
                Vector::new("WOPR:OP_2", Some(rate_meta("WOPR", "SM3/DAY")), vec![3.0; 3]),
            ],
        )?;
    }

    let factory = ProviderFactory::new(StoreConfig::new(store.path()).with_downcast_floats(true))?;
    let options = SummaryImportOptions::default().with_column_keys(["F*", "W*:OP_2"]);
    let providers = factory
        .create_presampled_summary_providers(&[ensemble("iter-0", data.path())], SUMMARY_FILE, &options)
        .await?;
    let provider = &providers["iter-0"];
    assert_eq!(provider.vector_names(), ["FOPT", "WOPR:OP_2"]);

    let out = provider.get_vectors_df(&["WOPR:OP_2"], None, None)?;
    assert_eq!(out.schema().field(2).data_type(), &DataType::Float32);
    let meta = provider.vector_metadata("WOPR:OP_2").ok_or("metadata survives import")?;
    assert!(meta.is_rate);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_convert_once() -> TestResult {
    let data = TempDir::new()?;
    let store = TempDir::new()?;
    write_basic_ensemble(data.path(), &[0, 1, 2, 3], &monthly_dates(24)?, 0.0, "SM3")?;
    let ensembles = [ensemble("iter-0", data.path())];
    let options = SummaryImportOptions::default();

    let factory = ProviderFactory::new(StoreConfig::new(store.path()))?;
    let results = join_all(
        (0..8).map(|_| factory.create_lazy_summary_providers(&ensembles, SUMMARY_FILE, &options)),
    )
    .await;
    for result in results {
        assert_eq!(result?["iter-0"].realizations(), [0, 1, 2, 3]);
    }

    let stats = factory.registry().stats();
    assert_eq!(stats.conversions, 1);
    assert_eq!(stats.scans, 1);
    assert_eq!(stats.cached_summaries, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn raw_presampled_and_lazy_share_one_conversion() -> TestResult {
    let data = TempDir::new()?;
    let store = TempDir::new()?;
    write_basic_ensemble(data.path(), &[0, 1], &monthly_dates(6)?, 0.0, "SM3")?;
    let ensembles = [ensemble("iter-0", data.path())];
    let options = SummaryImportOptions::default();

    let factory = ProviderFactory::new(StoreConfig::new(store.path()))?;
    let (presampled, lazy) = tokio::join!(
        factory.create_presampled_summary_providers(&ensembles, SUMMARY_FILE, &options),
        factory.create_lazy_summary_providers(&ensembles, SUMMARY_FILE, &options),
    );
    let (presampled, lazy) = (presampled?, lazy?);
    let (p, l) = (&presampled["iter-0"], &lazy["iter-0"]);
    assert!(!p.supports_resampling());
    assert!(l.supports_resampling());
    assert_eq!(p.dates(None, None)?, l.dates(None, None)?);

    let stats = factory.registry().stats();
    assert_eq!(stats.conversions, 1);
    assert_eq!(stats.cached_summaries, 2);
    Ok(())
}
