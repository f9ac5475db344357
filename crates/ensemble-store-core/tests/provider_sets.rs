#![allow(missing_docs)]

mod common;

use arrow::{
    array::AsArray,
    datatypes::{DataType, Float64Type, Int64Type},
};
use common::{
    SUMMARY_FILE, TestResult, Vector, ensemble, monthly_dates, total_meta, write_basic_ensemble,
    write_summary,
};
use ensemble_store_core::{
    config::StoreConfig,
    error::ErrorCategory,
    factory::{ProviderFactory, SummaryImportOptions},
    provider::EnsembleSummaryProvider,
    provider_set::ProviderSetError,
};
use tempfile::TempDir;

#[tokio::test]
async fn set_unions_cover_every_member() -> TestResult {
    let a = TempDir::new()?;
    let b = TempDir::new()?;
    let store = TempDir::new()?;
    let dates = monthly_dates(6)?;
    write_basic_ensemble(a.path(), &[0, 1, 2], &dates[..4], 0.0, "SM3")?;
    write_basic_ensemble(b.path(), &[1, 2, 3], &dates[2..], 0.0, "SM3")?;
    write_summary(
        b.path(),
        4,
        &dates[2..],
        &[Vector::new("GOPT", Some(total_meta("GOPT", "SM3")), vec![0.0; 4])],
    )?;

    let factory = ProviderFactory::new(StoreConfig::new(store.path()))?;
    let set = factory
        .create_lazy_summary_provider_set(
            &[ensemble("pred", b.path()), ensemble("hist", a.path())],
            SUMMARY_FILE,
            &SummaryImportOptions::default(),
        )
        .await?;
    assert_eq!(set.names(), ["pred", "hist"]);
    assert_eq!(set.all_vector_names(), ["FOPR", "FOPT", "GOPT"]);
    assert_eq!(set.all_realizations(), [0, 1, 2, 3, 4]);
    assert_eq!(set.all_dates(None)?, dates);

    let err = set.provider("nope").expect_err("not a member");
    assert!(matches!(err, ProviderSetError::UnknownEnsemble { .. }));
    assert_eq!(err.category(), ErrorCategory::NotFound);
    Ok(())
}

#[tokio::test]
async fn inconsistent_units_fail_the_metadata_check() -> TestResult {
    let a = TempDir::new()?;
    let b = TempDir::new()?;
    let store = TempDir::new()?;
    let dates = monthly_dates(3)?;
    write_basic_ensemble(a.path(), &[0, 1], &dates, 0.0, "SM3")?;
    write_basic_ensemble(b.path(), &[0, 1], &dates, 0.0, "STB")?;

    let factory = ProviderFactory::new(StoreConfig::new(store.path()))?;
    let set = factory
        .create_presampled_summary_provider_set(
            &[ensemble("a", a.path()), ensemble("b", b.path())],
            SUMMARY_FILE,
            &SummaryImportOptions::default(),
        )
        .await?;

    let err = set
        .verify_consistent_vector_metadata()
        .expect_err("FOPT units differ");
    assert_eq!(err.category(), ErrorCategory::InconsistentMetadata);
    let message = err.to_string();
    assert!(message.contains("FOPT"));
    assert!(message.contains("unit"));
    assert!(set.vector_metadata("FOPT").is_err());

    // FOPR agrees, and an explicit precedence resolves FOPT.
    assert_eq!(set.vector_metadata("FOPR")?.map(|m| m.unit), Some("SM3/DAY".to_string()));
    let b_meta = set
        .vector_metadata_with_precedence("FOPT", &["b", "a"])?
        .ok_or("b defines FOPT")?;
    assert_eq!(b_meta.unit, "STB");
    Ok(())
}

#[tokio::test]
async fn delta_subtracts_shared_realizations() -> TestResult {
    let a = TempDir::new()?;
    let b = TempDir::new()?;
    let store = TempDir::new()?;
    let dates = monthly_dates(4)?;
    write_basic_ensemble(a.path(), &[0, 1, 2], &dates, 100.0, "SM3")?;
    write_basic_ensemble(b.path(), &[1, 2, 3], &dates, 10.0, "SM3")?;

    let factory = ProviderFactory::new(StoreConfig::new(store.path()).with_downcast_floats(true))?;
    let set = factory
        .create_lazy_summary_provider_set(
            &[ensemble("a", a.path()), ensemble("b", b.path())],
            SUMMARY_FILE,
            &SummaryImportOptions::default(),
        )
        .await?;
    let delta = set.delta_provider("a", "b")?;
    assert_eq!(delta.name(), "a - b");
    assert_eq!(delta.realizations(), [1, 2]);
    assert_eq!(delta.vector_names(), ["FOPT", "FOPR"]);
    assert!(delta.supports_resampling());
    assert_eq!(delta.vector_metadata("FOPT").map(|m| m.unit), Some("SM3".to_string()));

    let out = delta.get_vectors_df(&["FOPT"], None, None)?;
    assert_eq!(out.num_rows(), 8);
    assert_eq!(out.schema().field(2).data_type(), &DataType::Float64);
    assert!(out.column(2).as_primitive::<Float64Type>().values().iter().all(|v| *v == 90.0));

    let at = delta.get_vectors_for_date_df(dates[0], &["FOPR"], Some(&[2, 3]))?;
    assert_eq!(at.column(0).as_primitive::<Int64Type>().values().to_vec(), vec![2]);
    assert_eq!(at.column(1).as_primitive::<Float64Type>().value(0), 0.0);

    let again = set.delta_provider("a", "b")?;
    assert!(std::sync::Arc::ptr_eq(&delta, &again));
    Ok(())
}
