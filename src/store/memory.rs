//! In-process store.
//!
//! Mirrors the PostgreSQL backend closely enough for the pipelines to be exercised end to end:
//! tables only grow, primary keys are enforced per statement, transactions roll back to a
//! snapshot, and derived geometry is rendered exactly as PostGIS renders it.
//!
//! Transactions snapshot the whole database, so only one connection should write at a time.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{StoreError, StoreResult};
use crate::geometry::Point;
use crate::types::{ColumnDef, ColumnType, StoredRow, TableSchema};

use super::{sql, Connector, GeometryTarget, PointUpdate, Store};

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Text(String),
    Point(Point),
}

impl Cell {
    fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Null => serde_json::Value::Null,
            Cell::Text(s) => serde_json::Value::String(s.clone()),
            Cell::Point(p) => p.to_geojson(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<Cell>>,
}

impl MemoryTable {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn require_column(&self, table: &str, name: &str) -> StoreResult<usize> {
        self.index_of(name).ok_or_else(|| StoreError::UnknownColumn {
            table: table.to_string(),
            column: name.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct MemoryDatabase {
    tables: BTreeMap<String, MemoryTable>,
    spatial: bool,
    open_connections: usize,
    unavailable: bool,
    schema_locks: BTreeSet<String>,
}

impl MemoryDatabase {
    fn table(&self, name: &str) -> StoreResult<&MemoryTable> {
        self.tables.get(name).ok_or_else(|| StoreError::UnknownTable {
            table: name.to_string(),
        })
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut MemoryTable> {
        self.tables.get_mut(name).ok_or_else(|| StoreError::UnknownTable {
            table: name.to_string(),
        })
    }
}

/// Hands out [`MemoryStore`] connections that share one database.
///
/// Cloning the connector shares the database, so tests can inspect what a pipeline wrote after
/// the pipeline closed its connection.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    db: Arc<Mutex<MemoryDatabase>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryDatabase>> {
        lock_db(&self.db)
    }

    /// Make subsequent `connect` calls fail as if the server were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut db) = self.lock() {
            db.unavailable = unavailable;
        }
    }

    /// Connections opened and not yet closed or dropped.
    pub fn open_connections(&self) -> usize {
        self.lock().map(|db| db.open_connections).unwrap_or(0)
    }

    /// Whether spatial support was requested.
    pub fn spatial_enabled(&self) -> bool {
        self.lock().map(|db| db.spatial).unwrap_or(false)
    }

    /// Column set of `table`, if it exists.
    pub fn table_schema(&self, table: &str) -> Option<TableSchema> {
        let db = self.lock().ok()?;
        db.tables
            .get(table)
            .map(|t| TableSchema::new(t.columns.clone()))
    }

    /// Rows of `table` (empty if the table does not exist).
    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.lock()
            .ok()
            .and_then(|db| db.tables.get(table).map(rows_as_json))
            .unwrap_or_default()
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryStore;

    fn connect(&self) -> StoreResult<MemoryStore> {
        let mut db = self.lock()?;
        if db.unavailable {
            return Err(StoreError::Unavailable {
                message: "connection refused".to_string(),
            });
        }
        db.open_connections += 1;
        Ok(MemoryStore {
            db: Arc::clone(&self.db),
            snapshot: None,
            closed: false,
        })
    }
}

fn lock_db(db: &Arc<Mutex<MemoryDatabase>>) -> StoreResult<MutexGuard<'_, MemoryDatabase>> {
    db.lock().map_err(|_| StoreError::Unavailable {
        message: "memory store lock poisoned".to_string(),
    })
}

fn rows_as_json(table: &MemoryTable) -> Vec<StoredRow> {
    table
        .rows
        .iter()
        .map(|row| {
            table
                .columns
                .iter()
                .zip(row)
                .map(|(col, cell)| (col.name.clone(), cell.to_json()))
                .collect()
        })
        .collect()
}

fn parse_coordinate(cell: &Cell) -> Option<f64> {
    let text = cell.as_text()?.trim();
    let value = text.parse::<f64>().ok()?;
    // `f64::from_str` accepts "inf"/"nan", which float8 casts would reject for this purpose.
    value.is_finite().then_some(value)
}

/// One connection to a [`MemoryConnector`] database.
#[derive(Debug)]
pub struct MemoryStore {
    db: Arc<Mutex<MemoryDatabase>>,
    snapshot: Option<BTreeMap<String, MemoryTable>>,
    closed: bool,
}

impl MemoryStore {
    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryDatabase>> {
        if self.closed {
            return Err(StoreError::Unavailable {
                message: "connection already closed".to_string(),
            });
        }
        lock_db(&self.db)
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(mut db) = lock_db(&self.db) {
            if let Some(snapshot) = self.snapshot.take() {
                // Closing with an open transaction aborts it.
                db.tables = snapshot;
            }
            db.open_connections = db.open_connections.saturating_sub(1);
        }
    }
}

fn validate_columns(table: &str, columns: &[ColumnDef]) -> StoreResult<()> {
    sql::quote_ident(table)?;
    let mut seen = BTreeSet::new();
    for column in columns {
        sql::quote_ident(&column.name)?;
        if !seen.insert(column.name.as_str()) {
            return Err(StoreError::DuplicateColumn {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }
    }
    Ok(())
}

impl Store for MemoryStore {
    fn table_schema(&mut self, table: &str) -> StoreResult<Option<TableSchema>> {
        let db = self.lock()?;
        Ok(db
            .tables
            .get(table)
            .map(|t| TableSchema::new(t.columns.clone())))
    }

    fn create_table(&mut self, table: &str, columns: &[ColumnDef]) -> StoreResult<()> {
        validate_columns(table, columns)?;
        let mut db = self.lock()?;
        db.tables.entry(table.to_string()).or_insert_with(|| MemoryTable {
            columns: columns.to_vec(),
            rows: Vec::new(),
        });
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> StoreResult<()> {
        sql::quote_ident(&column.name)?;
        let mut db = self.lock()?;
        if matches!(column.column_type, ColumnType::Point { .. }) && !db.spatial {
            return Err(StoreError::Constraint {
                table: table.to_string(),
                message: "type \"geometry\" does not exist".to_string(),
            });
        }
        let t = db.table_mut(table)?;
        if t.index_of(&column.name).is_some() {
            return Ok(());
        }
        if column.primary_key && !t.rows.is_empty() {
            return Err(StoreError::Constraint {
                table: table.to_string(),
                message: format!("cannot add primary key column '{}' to a non-empty table", column.name),
            });
        }
        t.columns.push(column.clone());
        for row in &mut t.rows {
            row.push(Cell::Null);
        }
        Ok(())
    }

    fn ensure_spatial_support(&mut self) -> StoreResult<()> {
        self.lock()?.spatial = true;
        Ok(())
    }

    fn lock_schema(&mut self, table: &str) -> StoreResult<()> {
        let mut db = self.lock()?;
        if !db.schema_locks.insert(table.to_string()) {
            // A single-process store cannot block; a held lock means a reentrant bug.
            return Err(StoreError::Constraint {
                table: table.to_string(),
                message: "schema lock already held".to_string(),
            });
        }
        Ok(())
    }

    fn unlock_schema(&mut self, table: &str) -> StoreResult<()> {
        self.lock()?.schema_locks.remove(table);
        Ok(())
    }

    fn begin(&mut self) -> StoreResult<()> {
        let tables = self.lock()?.tables.clone();
        if self.snapshot.is_none() {
            self.snapshot = Some(tables);
        }
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.lock()?;
        self.snapshot.take().map(|_| ()).ok_or(StoreError::NoTransaction)
    }

    fn rollback(&mut self) -> StoreResult<()> {
        let snapshot = self.snapshot.take().ok_or(StoreError::NoTransaction)?;
        self.lock()?.tables = snapshot;
        Ok(())
    }

    fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
    ) -> StoreResult<u64> {
        let mut db = self.lock()?;
        let t = db.table_mut(table)?;

        let positions = columns
            .iter()
            .map(|name| {
                let idx = t.require_column(table, name)?;
                if matches!(t.columns[idx].column_type, ColumnType::Point { .. }) {
                    return Err(StoreError::Constraint {
                        table: table.to_string(),
                        message: format!("geometry column '{name}' cannot be written directly"),
                    });
                }
                Ok(idx)
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let mut keys: Vec<(usize, BTreeSet<String>)> = t
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(idx, _)| {
                let existing = t
                    .rows
                    .iter()
                    .filter_map(|r| r[idx].as_text().map(str::to_string))
                    .collect();
                (idx, existing)
            })
            .collect();

        // Build the whole statement first so a failing row leaves the table untouched.
        let mut pending: Vec<Vec<Cell>> = Vec::with_capacity(rows.len());
        for (n, values) in rows.iter().enumerate() {
            let mut row = vec![Cell::Null; t.columns.len()];
            for (&idx, value) in positions.iter().zip(values) {
                row[idx] = value.clone().map(Cell::Text).unwrap_or(Cell::Null);
            }
            for (idx, existing) in &mut keys {
                let column = &t.columns[*idx].name;
                match row[*idx].as_text() {
                    None => {
                        return Err(StoreError::Constraint {
                            table: table.to_string(),
                            message: format!("null value in column '{column}' (row {})", n + 1),
                        });
                    }
                    Some(key) if !existing.insert(key.to_string()) => {
                        return Err(StoreError::Constraint {
                            table: table.to_string(),
                            message: format!("duplicate key value {column}={key} (row {})", n + 1),
                        });
                    }
                    Some(_) => {}
                }
            }
            pending.push(row);
        }

        let written = pending.len() as u64;
        t.rows.append(&mut pending);
        Ok(written)
    }

    fn stored_ids(&mut self, table: &str, id_column: &str, ids: &[String]) -> StoreResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let db = self.lock()?;
        let t = db.table(table)?;
        let idx = t.require_column(table, id_column)?;
        Ok(t.rows
            .iter()
            .filter_map(|row| row[idx].as_text())
            .filter(|id| ids.iter().any(|wanted| wanted == id))
            .map(str::to_string)
            .collect())
    }

    fn update_geometry(
        &mut self,
        table: &str,
        target: &GeometryTarget<'_>,
        points: &[PointUpdate],
    ) -> StoreResult<u64> {
        if points.is_empty() {
            return Ok(0);
        }
        let mut db = self.lock()?;
        let t = db.table_mut(table)?;
        let id_idx = t.require_column(table, target.id_column)?;
        let geom_idx = t.require_column(table, target.geometry_column)?;
        let wkt_idx = t.require_column(table, target.wkt_column)?;

        let by_id: BTreeMap<&str, &Point> = points.iter().map(|u| (u.id.as_str(), &u.point)).collect();
        let mut updated = 0u64;
        for row in &mut t.rows {
            let Some(point) = row[id_idx].as_text().and_then(|id| by_id.get(id)).copied() else {
                continue;
            };
            row[geom_idx] = Cell::Point(*point);
            row[wkt_idx] = Cell::Text(point.to_wkt());
            updated += 1;
        }
        Ok(updated)
    }

    fn backfill_geometry(
        &mut self,
        table: &str,
        target: &GeometryTarget<'_>,
        x_column: &str,
        y_column: &str,
    ) -> StoreResult<u64> {
        let mut db = self.lock()?;
        let t = db.table_mut(table)?;
        let x_idx = t.require_column(table, x_column)?;
        let y_idx = t.require_column(table, y_column)?;
        let geom_idx = t.require_column(table, target.geometry_column)?;
        let wkt_idx = t.require_column(table, target.wkt_column)?;

        let mut updated = 0u64;
        for row in &mut t.rows {
            if row[geom_idx] != Cell::Null {
                continue;
            }
            let (Some(x), Some(y)) = (parse_coordinate(&row[x_idx]), parse_coordinate(&row[y_idx])) else {
                continue;
            };
            let point = Point::new(x, y);
            row[geom_idx] = Cell::Point(point);
            row[wkt_idx] = Cell::Text(point.to_wkt());
            updated += 1;
        }
        Ok(updated)
    }

    fn fetch_all(&mut self, table: &str) -> StoreResult<Vec<StoredRow>> {
        let db = self.lock()?;
        Ok(rows_as_json(db.table(table)?))
    }

    fn close(mut self) -> StoreResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.release();
    }
}
