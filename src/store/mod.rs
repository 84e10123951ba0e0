//! Destination store abstraction.
//!
//! Pipelines never hold global connection state: each invocation asks a [`Connector`] for a
//! fresh [`Store`] handle through [`with_connection`], which closes it on every exit path.
//!
//! Two backends are provided:
//!
//! - [`postgres::PgConnector`]: PostgreSQL + PostGIS through `sqlx`
//! - [`memory::MemoryConnector`]: an in-process store with the same semantics

pub mod memory;
pub mod postgres;
pub mod sql;

use std::collections::HashSet;

use crate::error::{PipelineError, PipelineResult, StoreResult};
use crate::geometry::Point;
use crate::types::{ColumnDef, StoredRow, TableSchema};

pub use memory::{MemoryConnector, MemoryStore};
pub use postgres::{PgConnector, PgStore};

/// Where derived geometry lives on a table and how rows are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryTarget<'a> {
    /// Stable row identifier column used to match updates.
    pub id_column: &'a str,
    /// Spatial point column.
    pub geometry_column: &'a str,
    /// Textual mirror of the geometry column.
    pub wkt_column: &'a str,
    /// Spatial reference id of the point column.
    pub srid: i32,
}

/// A geometry value for the row carrying `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointUpdate {
    /// Identifier value, as stored (text).
    pub id: String,
    /// Point to store.
    pub point: Point,
}

/// Operations the pipelines need from a destination store.
///
/// All calls are blocking. Data-definition calls are add-if-absent and therefore safe to repeat.
pub trait Store {
    /// Columns of `table`, or `None` when the table does not exist.
    fn table_schema(&mut self, table: &str) -> StoreResult<Option<TableSchema>>;

    /// Create `table` with `columns` unless it already exists.
    fn create_table(&mut self, table: &str, columns: &[ColumnDef]) -> StoreResult<()>;

    /// Add `column` to `table` unless a column with that name already exists.
    fn add_column(&mut self, table: &str, column: &ColumnDef) -> StoreResult<()>;

    /// Make spatial types available (PostGIS extension).
    fn ensure_spatial_support(&mut self) -> StoreResult<()>;

    /// Take the schema lock for `table`, waiting for other holders.
    fn lock_schema(&mut self, table: &str) -> StoreResult<()>;

    /// Release the schema lock for `table`.
    fn unlock_schema(&mut self, table: &str) -> StoreResult<()>;

    /// Open a transaction.
    fn begin(&mut self) -> StoreResult<()>;

    /// Commit the open transaction.
    fn commit(&mut self) -> StoreResult<()>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> StoreResult<()>;

    /// Insert `rows` (aligned with `columns`) as text values. Returns the number of rows written.
    fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
    ) -> StoreResult<u64>;

    /// Which of `ids` already appear in `id_column` of `table`.
    fn stored_ids(&mut self, table: &str, id_column: &str, ids: &[String]) -> StoreResult<HashSet<String>>;

    /// Set geometry and its text mirror on every row whose identifier matches an update.
    ///
    /// Identifiers with no matching row are ignored. Returns the number of rows changed.
    fn update_geometry(
        &mut self,
        table: &str,
        target: &GeometryTarget<'_>,
        points: &[PointUpdate],
    ) -> StoreResult<u64>;

    /// Derive geometry from the stored `x_column`/`y_column` text for rows still lacking it.
    fn backfill_geometry(
        &mut self,
        table: &str,
        target: &GeometryTarget<'_>,
        x_column: &str,
        y_column: &str,
    ) -> StoreResult<u64>;

    /// Every row of `table`.
    fn fetch_all(&mut self, table: &str) -> StoreResult<Vec<StoredRow>>;

    /// Release the connection.
    fn close(self) -> StoreResult<()>
    where
        Self: Sized;
}

/// Opens [`Store`] connections.
pub trait Connector {
    /// Connection type handed to pipelines.
    type Connection: Store;

    /// Open a new connection.
    fn connect(&self) -> StoreResult<Self::Connection>;
}

/// Run `f` with a fresh connection and close it afterwards, whatever `f` returned.
///
/// Failing to connect is reported as [`PipelineError::Store`]. A failure to close is logged and
/// does not mask the result of `f`.
pub fn with_connection<C, T, F>(connector: &C, f: F) -> PipelineResult<T>
where
    C: Connector,
    F: FnOnce(&mut C::Connection) -> PipelineResult<T>,
{
    let mut conn = connector.connect().map_err(PipelineError::Store)?;
    let result = f(&mut conn);
    if let Err(err) = conn.close() {
        tracing::warn!(error = %err, "failed to close store connection");
    }
    result
}
