//! Replication of source records into the canonical destination table.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::canonical::{self, CanonicalRecord, RawRecord};
use crate::config::DEFAULT_REPLICATION_TABLE;
use crate::error::{PipelineError, PipelineResult, SourceError, StoreResult};
use crate::observability::{notify, PipelineContext, PipelineKind, PipelineObserver, PipelineSeverity, PipelineStats};
use crate::schema::SchemaReconciler;
use crate::source::RecordSource;
use crate::store::{with_connection, Connector, Store};
use crate::types::StoredRow;

/// Options controlling [`replicate`] and [`insert_record`].
#[derive(Clone)]
pub struct ReplicationOptions {
    /// Destination table.
    pub table: String,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: PipelineSeverity,
}

impl fmt::Debug for ReplicationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationOptions")
            .field("table", &self.table)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            table: DEFAULT_REPLICATION_TABLE.to_string(),
            observer: None,
            alert_at_or_above: PipelineSeverity::Critical,
        }
    }
}

/// Outcome of a successful replication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationSummary {
    pub table: String,
    /// Records returned by the source.
    pub fetched: usize,
    /// Records written.
    pub inserted: u64,
    /// The canonical table was created by this run.
    pub table_created: bool,
    /// Canonical columns added to an existing table.
    pub columns_added: Vec<String>,
}

impl ReplicationSummary {
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            rows: self.inserted,
            columns_added: self.columns_added.len(),
            geometry_rows: 0,
        }
    }
}

fn source_failure(err: SourceError) -> PipelineError {
    match err {
        SourceError::Payload { message } => PipelineError::Unknown {
            message: format!("source payload rejected: {message}"),
        },
        other => PipelineError::SourceUnavailable(other),
    }
}

/// Normalize and project every raw record, in source order.
pub fn prepare_records(raw: &[RawRecord]) -> Vec<CanonicalRecord> {
    raw.iter()
        .map(|r| canonical::project(&canonical::normalize_keys(r)))
        .collect()
}

/// Replicate every record of `source` into `options.table` in one transaction.
///
/// Records are fetched and projected before a connection is opened: an unreachable source or an
/// empty result never touches the destination. The insert is all-or-nothing.
pub fn replicate<R, C>(source: &R, connector: &C, options: &ReplicationOptions) -> PipelineResult<ReplicationSummary>
where
    R: RecordSource + ?Sized,
    C: Connector,
{
    let ctx = PipelineContext::new(PipelineKind::Replicate, &options.table, source.describe());
    let result = run_replication(source, connector, &options.table);
    notify(options.observer.as_ref(), options.alert_at_or_above, &ctx, &result, ReplicationSummary::stats);
    result
}

fn run_replication<R, C>(source: &R, connector: &C, table: &str) -> PipelineResult<ReplicationSummary>
where
    R: RecordSource + ?Sized,
    C: Connector,
{
    let raw = source.fetch().map_err(source_failure)?;
    tracing::info!(source = %source.describe(), records = raw.len(), "source records received");

    let records = prepare_records(&raw);
    if records.is_empty() {
        tracing::warn!(table, "no valid data found after validation");
        return Err(PipelineError::ValidationEmpty);
    }
    let sparse = records.iter().filter(|r| r.populated() == 0).count();
    if sparse > 0 {
        tracing::warn!(table, records = sparse, "records carry no canonical field");
    }
    tracing::info!(table, records = records.len(), "records ready for insertion");

    with_connection(connector, |store| {
        let schema = SchemaReconciler::new(table)
            .reconcile(store, &canonical::canonical_columns())
            .map_err(PipelineError::Schema)?;
        let inserted = insert_atomically(store, table, &records).map_err(PipelineError::Store)?;
        tracing::info!(table, inserted, "records replicated");
        Ok(ReplicationSummary {
            table: table.to_string(),
            fetched: raw.len(),
            inserted,
            table_created: schema.table_created,
            columns_added: schema.columns_added,
        })
    })
}

/// Insert `records` in one transaction, rolling back on any failure.
fn insert_atomically<S: Store>(store: &mut S, table: &str, records: &[CanonicalRecord]) -> StoreResult<u64> {
    let columns = canonical::canonical_column_names();
    let rows: Vec<Vec<Option<String>>> = records.iter().map(CanonicalRecord::to_text_row).collect();
    store.begin()?;
    let written = match store.insert_rows(table, &columns, &rows) {
        Ok(n) => n,
        Err(err) => {
            if let Err(rollback_err) = store.rollback() {
                tracing::warn!(table, error = %rollback_err, "rollback failed");
            }
            return Err(err);
        }
    };
    store.commit()?;
    Ok(written)
}

/// Insert one record after checking it carries every canonical field.
///
/// Keys are normalized first; a record lacking any canonical field is rejected with
/// [`PipelineError::MissingFields`] before a connection is opened.
pub fn insert_record<C: Connector>(record: &RawRecord, connector: &C, options: &ReplicationOptions) -> PipelineResult<u64> {
    let ctx = PipelineContext::new(PipelineKind::Insert, &options.table, "record");
    let result = canonical::require_complete(record).and_then(|projected| {
        with_connection(connector, |store| {
            SchemaReconciler::new(&options.table)
                .reconcile(store, &canonical::canonical_columns())
                .map_err(PipelineError::Schema)?;
            insert_atomically(store, &options.table, std::slice::from_ref(&projected)).map_err(PipelineError::Store)
        })
    });
    notify(options.observer.as_ref(), options.alert_at_or_above, &ctx, &result, |rows| PipelineStats {
        rows: *rows,
        ..PipelineStats::default()
    });
    result
}

/// Every row of `table`.
pub fn dump_table<C: Connector>(connector: &C, table: &str) -> PipelineResult<Vec<StoredRow>> {
    with_connection(connector, |store| store.fetch_all(table).map_err(PipelineError::Store))
}
