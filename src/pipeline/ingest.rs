//! File ingestion: load, reconcile, insert, derive geometry.

use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::config::DEFAULT_INGEST_TABLE;
use crate::error::{IngestionError, PipelineError, PipelineResult, StoreError, StoreResult};
use crate::geometry::{GeometryEnricher, GeometryOptions, GeometryPlan};
use crate::ingestion::{load_from_path, LoadOptions};
use crate::observability::{notify, PipelineContext, PipelineKind, PipelineObserver, PipelineSeverity, PipelineStats};
use crate::schema::{ReconcileSummary, SchemaReconciler};
use crate::store::{with_connection, Connector, Store};
use crate::types::DataSet;

/// When file-ingestion transactions are committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// One transaction for the whole dataset; a failed run keeps nothing.
    #[default]
    AtEnd,
    /// Commit after every `n` rows; chunks committed before a failure are kept.
    EveryRows(usize),
}

impl CommitPolicy {
    fn batches(self, rows: usize) -> Vec<Range<usize>> {
        let size = match self {
            CommitPolicy::AtEnd => rows,
            CommitPolicy::EveryRows(n) => n.max(1),
        };
        if rows == 0 {
            return Vec::new();
        }
        (0..rows)
            .step_by(size)
            .map(|start| start..(start + size).min(rows))
            .collect()
    }
}

/// Options controlling [`ingest_file`].
#[derive(Clone)]
pub struct IngestOptions {
    /// Destination table.
    pub table: String,
    /// How the file is read.
    pub load: LoadOptions,
    /// Geometry detection and derivation.
    pub geometry: GeometryOptions,
    pub commit: CommitPolicy,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: PipelineSeverity,
}

impl fmt::Debug for IngestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestOptions")
            .field("table", &self.table)
            .field("load", &self.load)
            .field("geometry", &self.geometry)
            .field("commit", &self.commit)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            table: DEFAULT_INGEST_TABLE.to_string(),
            load: LoadOptions::default(),
            geometry: GeometryOptions::default(),
            commit: CommitPolicy::default(),
            observer: None,
            alert_at_or_above: PipelineSeverity::Critical,
        }
    }
}

/// Geometry work done during an ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeometrySummary {
    /// `(longitude, latitude)` columns that triggered detection.
    pub detected: (String, String),
    /// Geometry columns added to the table.
    pub columns_added: Vec<String>,
    /// Rows that received a geometry.
    pub updated: u64,
    /// Rows left without geometry (missing identifier or coordinates).
    pub skipped: usize,
    /// Rows skipped because their identifier is not unique in the file.
    pub duplicates: usize,
    /// Rows skipped because their identifier was already stored before the run inserted them.
    pub already_stored: usize,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub table: String,
    /// Rows read from the file.
    pub rows_loaded: usize,
    /// Rows written to the table.
    pub rows_inserted: u64,
    pub schema: ReconcileSummary,
    /// Present when the file carries latitude/longitude columns.
    pub geometry: Option<GeometrySummary>,
}

impl IngestSummary {
    pub fn stats(&self) -> PipelineStats {
        let geometry_columns = self.geometry.as_ref().map_or(0, |g| g.columns_added.len());
        PipelineStats {
            rows: self.rows_inserted,
            columns_added: self.schema.columns_added.len() + geometry_columns,
            geometry_rows: self.geometry.as_ref().map_or(0, |g| g.updated),
        }
    }
}

/// Inserts dataset rows, excluding derived columns, and applies the geometry plan per batch.
#[derive(Debug, Clone)]
pub struct RowIngester<'a> {
    table: &'a str,
    columns: Vec<String>,
    indices: Vec<usize>,
    commit: CommitPolicy,
}

/// Rows written by a [`RowIngester`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub inserted: u64,
    pub geometry_updated: u64,
    /// Geometry updates dropped because the identifier predates the batch.
    pub geometry_already_stored: usize,
}

impl<'a> RowIngester<'a> {
    /// Ingester for `dataset` columns minus `excluded`.
    pub fn new(table: &'a str, dataset: &DataSet, excluded: &[&str], commit: CommitPolicy) -> Self {
        let (indices, columns): (Vec<usize>, Vec<String>) = dataset
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| !excluded.contains(&name.as_str()))
            .map(|(idx, name)| (idx, name.clone()))
            .unzip();
        Self {
            table,
            columns,
            indices,
            commit,
        }
    }

    /// Columns written by this ingester, in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn text_rows(&self, dataset: &DataSet, range: Range<usize>) -> Vec<Vec<Option<String>>> {
        dataset.rows[range]
            .iter()
            .map(|row| {
                self.indices
                    .iter()
                    .map(|&idx| row.get(idx).and_then(|v| v.to_text()))
                    .collect()
            })
            .collect()
    }

    /// Insert every row in order, committing per [`CommitPolicy`].
    ///
    /// A failing batch is rolled back and ends the run; earlier committed batches stay.
    pub fn run<S: Store>(
        &self,
        store: &mut S,
        dataset: &DataSet,
        geometry: Option<(&GeometryEnricher<'_>, &GeometryPlan)>,
    ) -> StoreResult<RowCounts> {
        let mut counts = RowCounts::default();
        for range in self.commit.batches(dataset.row_count()) {
            store.begin()?;
            match self.write_batch(store, dataset, range.clone(), geometry) {
                Ok(batch) => {
                    store.commit()?;
                    counts.inserted += batch.inserted;
                    counts.geometry_updated += batch.geometry_updated;
                    counts.geometry_already_stored += batch.geometry_already_stored;
                    tracing::debug!(table = self.table, rows = ?range, "batch committed");
                }
                Err(err) => {
                    if let Err(rollback_err) = store.rollback() {
                        tracing::warn!(table = self.table, error = %rollback_err, "rollback failed");
                    }
                    tracing::warn!(
                        table = self.table,
                        failed_rows = ?range,
                        committed_rows = counts.inserted,
                        "ingestion aborted"
                    );
                    return Err(err);
                }
            }
        }
        Ok(counts)
    }

    fn write_batch<S: Store>(
        &self,
        store: &mut S,
        dataset: &DataSet,
        range: Range<usize>,
        geometry: Option<(&GeometryEnricher<'_>, &GeometryPlan)>,
    ) -> StoreResult<RowCounts> {
        let rows = self.text_rows(dataset, range.clone());
        let Some((enricher, plan)) = geometry else {
            let inserted = store.insert_rows(self.table, &self.columns, &rows)?;
            return Ok(RowCounts {
                inserted,
                ..RowCounts::default()
            });
        };

        // An identifier stored before this insert would make the update hit the older row too.
        let mut updates = plan.updates_for(range);
        let ids: Vec<String> = updates.iter().map(|u| u.id.clone()).collect();
        let stored = store.stored_ids(self.table, &enricher.options().id_column, &ids)?;
        updates.retain(|u| !stored.contains(&u.id));
        if !stored.is_empty() {
            tracing::warn!(
                table = self.table,
                rows = stored.len(),
                "identifiers already stored; geometry left for a later enrichment pass"
            );
        }

        let inserted = store.insert_rows(self.table, &self.columns, &rows)?;
        let geometry_updated = if updates.is_empty() {
            0
        } else {
            enricher.apply(store, self.table, &updates)?
        };
        Ok(RowCounts {
            inserted,
            geometry_updated,
            geometry_already_stored: ids.len() - updates.len(),
        })
    }
}

/// Load `path` and ingest it into `options.table` through a fresh connection from `connector`.
///
/// The file is read before connecting, so unreadable input never touches the store.
pub fn ingest_file<C: Connector>(
    path: impl AsRef<Path>,
    connector: &C,
    options: &IngestOptions,
) -> PipelineResult<IngestSummary> {
    let path = path.as_ref();
    let ctx = PipelineContext::new(PipelineKind::Ingest, &options.table, path.display().to_string());
    let result = load_from_path(path, &options.load)
        .map_err(PipelineError::from)
        .and_then(|dataset| {
            tracing::info!(path = %path.display(), rows = dataset.row_count(), columns = dataset.columns.len(), "file loaded");
            with_connection(connector, |store| ingest_dataset(store, &dataset, options))
        });
    notify(options.observer.as_ref(), options.alert_at_or_above, &ctx, &result, IngestSummary::stats);
    result
}

/// Reconcile `options.table` with `dataset`, insert its rows and derive geometry.
pub fn ingest_dataset<S: Store>(
    store: &mut S,
    dataset: &DataSet,
    options: &IngestOptions,
) -> PipelineResult<IngestSummary> {
    let table = options.table.as_str();
    let derived = options.geometry.derived_columns();
    let ingester = RowIngester::new(table, dataset, &derived, options.commit);
    if ingester.columns().len() < dataset.columns.len() {
        tracing::warn!(table, columns = ?derived, "derived geometry columns in file are ignored");
    }
    if ingester.columns().is_empty() {
        return Err(PipelineError::Input(IngestionError::SchemaMismatch {
            message: format!(
                "no insertable columns: {:?} are derived and never written",
                dataset.columns
            ),
        }));
    }

    let schema = SchemaReconciler::new(table)
        .reconcile_names(store, ingester.columns())
        .map_err(PipelineError::Schema)?;

    let enricher = GeometryEnricher::detect(&options.geometry, &dataset.columns);
    let mut geometry = None;
    let mut plan = None;
    if let Some(enricher) = &enricher {
        let columns_added = enricher
            .ensure_columns(store, table)
            .map_err(PipelineError::Schema)?;
        let p = enricher.plan(dataset);
        let (lon, lat) = enricher.detected_columns();
        geometry = Some(GeometrySummary {
            detected: (lon.to_string(), lat.to_string()),
            columns_added,
            updated: 0,
            skipped: p.skipped,
            duplicates: p.duplicates,
            already_stored: 0,
        });
        plan = Some(p);
    }

    let counts = ingester
        .run(store, dataset, enricher.as_ref().zip(plan.as_ref()))
        .map_err(store_failure)?;
    if let Some(g) = geometry.as_mut() {
        g.updated = counts.geometry_updated;
        g.already_stored = counts.geometry_already_stored;
    }

    Ok(IngestSummary {
        table: table.to_string(),
        rows_loaded: dataset.row_count(),
        rows_inserted: counts.inserted,
        schema,
        geometry,
    })
}

fn store_failure(err: StoreError) -> PipelineError {
    match err {
        // The table changed underneath the run.
        StoreError::UnknownColumn { .. } | StoreError::UnknownTable { .. } => PipelineError::Schema(err),
        other => PipelineError::Store(other),
    }
}
