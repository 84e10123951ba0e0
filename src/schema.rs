//! Table schema reconciliation.
//!
//! The only schema mutation is add-if-absent: tables are created when missing and columns are
//! added when missing, never removed or retyped. Changes are not transactional; whatever was added
//! before a failure stays.

use serde::Serialize;

use crate::error::StoreResult;
use crate::store::Store;
use crate::types::{ColumnDef, TableSchema};

/// What a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// The table did not exist and was created.
    pub table_created: bool,
    /// Columns added to an existing table, in dataset order.
    pub columns_added: Vec<String>,
}

impl ReconcileSummary {
    /// Whether the table was left exactly as found.
    pub fn is_noop(&self) -> bool {
        !self.table_created && self.columns_added.is_empty()
    }
}

/// Brings a table's column set up to a wanted column set.
///
/// The table's schema lock is held while comparing and altering so concurrent runs on the same
/// table serialize; every statement is also add-if-absent on its own.
#[derive(Debug, Clone, Copy)]
pub struct SchemaReconciler<'t> {
    table: &'t str,
}

impl<'t> SchemaReconciler<'t> {
    pub fn new(table: &'t str) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &str {
        self.table
    }

    /// Reconcile against plain column names, all generically typed.
    pub fn reconcile_names<S, I>(&self, store: &mut S, columns: I) -> StoreResult<ReconcileSummary>
    where
        S: Store,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let defs: Vec<ColumnDef> = columns
            .into_iter()
            .map(|c| ColumnDef::text(c.as_ref()))
            .collect();
        self.reconcile(store, &defs)
    }

    /// Reconcile against column definitions.
    ///
    /// A missing table is created with exactly `columns`; an existing table gains the columns it
    /// lacks. Existing columns are never altered, whatever their declared type.
    pub fn reconcile<S: Store>(&self, store: &mut S, columns: &[ColumnDef]) -> StoreResult<ReconcileSummary> {
        store.lock_schema(self.table)?;
        let result = self.reconcile_locked(store, columns);
        if let Err(err) = store.unlock_schema(self.table) {
            tracing::warn!(table = self.table, error = %err, "failed to release schema lock");
            if result.is_ok() {
                return Err(err);
            }
        }
        result
    }

    fn reconcile_locked<S: Store>(&self, store: &mut S, columns: &[ColumnDef]) -> StoreResult<ReconcileSummary> {
        let Some(existing) = store.table_schema(self.table)? else {
            store.create_table(self.table, columns)?;
            tracing::info!(table = self.table, columns = columns.len(), "created table");
            return Ok(ReconcileSummary {
                table_created: true,
                columns_added: Vec::new(),
            });
        };

        let mut summary = ReconcileSummary::default();
        for column in missing_columns(&existing, columns) {
            store.add_column(self.table, column)?;
            tracing::info!(table = self.table, column = %column.name, "added column");
            summary.columns_added.push(column.name.clone());
        }
        if summary.is_noop() {
            tracing::debug!(table = self.table, "schema already up to date");
        }
        Ok(summary)
    }
}

fn missing_columns<'c>(existing: &TableSchema, wanted: &'c [ColumnDef]) -> Vec<&'c ColumnDef> {
    let mut missing: Vec<&ColumnDef> = Vec::new();
    for column in wanted {
        if !existing.contains(&column.name) && !missing.iter().any(|m| m.name == column.name) {
            missing.push(column);
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_absent_columns_are_reported_missing() {
        let existing = TableSchema::new(vec![ColumnDef::text("a"), ColumnDef::point("geom", 4326)]);
        let wanted = [ColumnDef::text("a"), ColumnDef::text("b"), ColumnDef::text("geom")];
        let missing = missing_columns(&existing, &wanted);
        assert_eq!(missing, vec![&ColumnDef::text("b")]);
    }
}
