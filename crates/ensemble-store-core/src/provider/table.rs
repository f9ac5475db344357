use arrow::record_batch::RecordBatch;
use snafu::prelude::*;

use super::{
    ProviderError, resolve_column_request,
    error::{BackingStoreSnafu, MissingRequiredColumnSnafu},
};
use crate::{
    REALIZATION,
    backing_store::{ColumnRange, RealizationFilter, StoreHandle},
    config::DuplicateColumnPolicy,
    key::StorageKey,
};

/// Column/realization-filtered reads of one ensemble's table.
///
/// Column names and realizations are computed once when the provider is
/// opened; the realization set is read from the realization column only.
#[derive(Debug, Clone)]
pub struct EnsembleTableProvider {
    handle: StoreHandle,
    realization_column: &'static str,
    column_names: Vec<String>,
    realizations: Vec<u32>,
    duplicate_columns: DuplicateColumnPolicy,
}

impl EnsembleTableProvider {
    /// Open a generic table whose realization column is `REALIZATION`.
    pub fn open(handle: StoreHandle, duplicate_columns: DuplicateColumnPolicy) -> Result<Self, ProviderError> {
        Self::with_realization_column(handle, REALIZATION, duplicate_columns)
    }

    pub(crate) fn with_realization_column(
        handle: StoreHandle,
        realization_column: &'static str,
        duplicate_columns: DuplicateColumnPolicy,
    ) -> Result<Self, ProviderError> {
        let schema = handle.schema();
        ensure!(
            schema.index_of(realization_column).is_ok(),
            MissingRequiredColumnSnafu {
                key: handle.key().as_str(),
                column: realization_column,
            }
        );

        let column_names = schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .filter(|name| name != realization_column)
            .collect();
        let realizations = handle
            .distinct_realizations(realization_column)
            .context(BackingStoreSnafu)?
            .iter()
            .collect();

        Ok(EnsembleTableProvider {
            handle,
            realization_column,
            column_names,
            realizations,
            duplicate_columns,
        })
    }

    /// All columns except the realization column, in storage order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Distinct realizations, ascending.
    pub fn realizations(&self) -> &[u32] {
        &self.realizations
    }

    /// Key of the backing artifact.
    pub fn storage_key(&self) -> &StorageKey {
        self.handle.key()
    }

    /// Cached min/max of a numeric column.
    pub fn column_range(&self, column: &str) -> Option<ColumnRange> {
        self.handle.column_range(column)
    }

    /// Name of the realization column.
    pub fn realization_column(&self) -> &'static str {
        self.realization_column
    }

    pub(crate) fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    pub(crate) fn duplicate_columns(&self) -> DuplicateColumnPolicy {
        self.duplicate_columns
    }

    /// Read `[realization, column_names...]`, restricted to `realizations`
    /// if given.
    ///
    /// Rows come back in storage order.
    pub fn get_column_data(
        &self,
        column_names: &[&str],
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError> {
        let resolved = resolve_column_request(
            column_names,
            &self.column_names,
            self.duplicate_columns,
            self.handle.key().as_str(),
        )?;
        let mut columns = Vec::with_capacity(resolved.len() + 1);
        columns.push(self.realization_column);
        columns.extend(resolved);
        self.read_columns(&columns, realizations)
    }

    /// Read exactly `columns` without request validation.
    pub(crate) fn read_columns(
        &self,
        columns: &[&str],
        realizations: Option<&[u32]>,
    ) -> Result<RecordBatch, ProviderError> {
        let filter = realizations
            .map(|reals| RealizationFilter::new(self.realization_column, reals.iter().copied()));
        self.handle
            .read_columns(columns, filter.as_ref())
            .context(BackingStoreSnafu)
    }
}
