//! Standalone geometry backfill pass.

use crate::error::{PipelineError, PipelineResult};
use crate::geometry::{self, GeometryOptions};
use crate::observability::{notify, PipelineContext, PipelineKind, PipelineStats};
use crate::store::{with_connection, Connector, Store};

use super::IngestOptions;

/// Derive geometry for rows of `options.table` that were ingested without it.
///
/// Geometry columns are expected to exist already (an earlier ingestion of a spatial file adds
/// them). Returns the number of rows that received a geometry.
pub fn enrich_table<C: Connector>(connector: &C, options: &IngestOptions) -> PipelineResult<u64> {
    let ctx = PipelineContext::new(PipelineKind::Enrich, &options.table, &options.table);
    let result = with_connection(connector, |store| backfill(store, &options.table, &options.geometry));
    notify(options.observer.as_ref(), options.alert_at_or_above, &ctx, &result, |rows| PipelineStats {
        geometry_rows: *rows,
        ..PipelineStats::default()
    });
    result
}

fn backfill<S: Store>(store: &mut S, table: &str, options: &GeometryOptions) -> PipelineResult<u64> {
    store.begin().map_err(PipelineError::Store)?;
    match geometry::backfill(store, table, options) {
        Ok(updated) => {
            store.commit().map_err(PipelineError::Store)?;
            Ok(updated)
        }
        Err(err) => {
            if let Err(rollback_err) = store.rollback() {
                tracing::warn!(table, error = %rollback_err, "rollback failed");
            }
            Err(PipelineError::Store(err))
        }
    }
}
