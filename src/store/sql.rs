//! PostgreSQL statement rendering.
//!
//! Identifiers are always double-quoted so lowercase, accented and reserved names (`usage`,
//! `numéro_d_abonné`) round-trip exactly.

use crate::error::{StoreError, StoreResult};
use crate::types::{ColumnDef, ColumnType};

use super::GeometryTarget;

/// Generic wide text type given to every reconciled column.
pub const GENERIC_TEXT_TYPE: &str = "TEXT";

/// Largest number of bind parameters PostgreSQL accepts in one statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Matches text that `float8` accepts as a plain decimal number.
const NUMERIC_PATTERN: &str = r"^[-+]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][-+]?[0-9]+)?$";

pub const CREATE_POSTGIS: &str = "CREATE EXTENSION IF NOT EXISTS postgis";
pub const TABLE_EXISTS: &str = "SELECT to_regclass($1::text) IS NOT NULL";
pub const TABLE_COLUMNS: &str = "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod), \
     COALESCE((SELECT true FROM pg_index i WHERE i.indrelid = a.attrelid AND i.indisprimary \
     AND a.attnum = ANY(i.indkey)), false) \
     FROM pg_attribute a \
     WHERE a.attrelid = to_regclass($1::text) AND a.attnum > 0 AND NOT a.attisdropped \
     ORDER BY a.attnum";
pub const ADVISORY_LOCK: &str = "SELECT pg_advisory_lock(hashtext($1))";
pub const ADVISORY_UNLOCK: &str = "SELECT pg_advisory_unlock(hashtext($1))";

/// Quote an identifier with double quotes.
pub fn quote_ident(ident: &str) -> StoreResult<String> {
    if ident.is_empty() {
        return Err(StoreError::InvalidIdentifier {
            identifier: ident.to_string(),
            message: "zero-length identifier".to_string(),
        });
    }
    if ident.contains('\0') {
        return Err(StoreError::InvalidIdentifier {
            identifier: ident.replace('\0', "\\0"),
            message: "identifier contains a NUL byte".to_string(),
        });
    }
    Ok(format!("\"{}\"", ident.replace('"', "\"\"")))
}

/// SQL type for a column type.
pub fn column_type_sql(column_type: &ColumnType) -> String {
    match column_type {
        ColumnType::Text => GENERIC_TEXT_TYPE.to_string(),
        ColumnType::Point { srid } => format!("geometry(Point, {srid})"),
    }
}

/// Map a `format_type` rendering back to a [`ColumnType`].
///
/// Anything that is not a point geometry is reported as text; reconciliation only needs to know
/// which names exist and which are spatial.
pub fn parse_column_type(rendered: &str) -> ColumnType {
    let lower = rendered.to_ascii_lowercase().replace(' ', "");
    match lower.strip_prefix("geometry(point,") {
        Some(rest) => ColumnType::Point {
            srid: rest.trim_end_matches(')').parse().unwrap_or(0),
        },
        None => ColumnType::Text,
    }
}

fn column_def_sql(column: &ColumnDef) -> StoreResult<String> {
    let mut sql = format!(
        "{} {}",
        quote_ident(&column.name)?,
        column_type_sql(&column.column_type)
    );
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
    }
    Ok(sql)
}

/// `CREATE TABLE IF NOT EXISTS` for `columns`.
pub fn create_table_sql(table: &str, columns: &[ColumnDef]) -> StoreResult<String> {
    let defs = columns
        .iter()
        .map(column_def_sql)
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table)?,
        defs.join(", ")
    ))
}

/// `ALTER TABLE ... ADD COLUMN IF NOT EXISTS`.
pub fn add_column_sql(table: &str, column: &ColumnDef) -> StoreResult<String> {
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        quote_ident(table)?,
        column_def_sql(column)?
    ))
}

/// `INSERT INTO t (cols) ` prefix; values are appended by the caller.
pub fn insert_prefix_sql(table: &str, columns: &[String]) -> StoreResult<String> {
    let cols = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(format!(
        "INSERT INTO {} ({}) ",
        quote_ident(table)?,
        cols.join(", ")
    ))
}

fn make_point_sql(x: &str, y: &str, srid: i32) -> String {
    format!("ST_SetSRID(ST_MakePoint({x}, {y}), {srid})")
}

/// Bulk geometry update keyed by identifier.
///
/// Binds: `$1` identifiers (`text[]`), `$2` x values (`float8[]`), `$3` y values (`float8[]`).
pub fn update_geometry_sql(table: &str, target: &GeometryTarget<'_>) -> StoreResult<String> {
    let point = make_point_sql("v.x", "v.y", target.srid);
    Ok(format!(
        "UPDATE {table} AS t SET {geom} = {point}, {wkt} = ST_AsText({point}) \
         FROM UNNEST($1::text[], $2::float8[], $3::float8[]) AS v(id, x, y) \
         WHERE t.{id}::text = v.id",
        table = quote_ident(table)?,
        geom = quote_ident(target.geometry_column)?,
        wkt = quote_ident(target.wkt_column)?,
        id = quote_ident(target.id_column)?,
    ))
}

/// Identifiers of `table` that are among `$1` (`text[]`).
pub fn stored_ids_sql(table: &str, id_column: &str) -> StoreResult<String> {
    let id = quote_ident(id_column)?;
    Ok(format!(
        "SELECT DISTINCT {id}::text FROM {table} WHERE {id}::text = ANY($1::text[])",
        table = quote_ident(table)?,
    ))
}

/// Geometry backfill from stored coordinate text, for rows whose geometry is still null.
pub fn backfill_geometry_sql(
    table: &str,
    target: &GeometryTarget<'_>,
    x_column: &str,
    y_column: &str,
) -> StoreResult<String> {
    let x = format!("btrim({}::text)", quote_ident(x_column)?);
    let y = format!("btrim({}::text)", quote_ident(y_column)?);
    let point = make_point_sql(&format!("{x}::float8"), &format!("{y}::float8"), target.srid);
    Ok(format!(
        "UPDATE {table} SET {geom} = {point}, {wkt} = ST_AsText({point}) \
         WHERE {geom} IS NULL AND {x} ~ '{pattern}' AND {y} ~ '{pattern}'",
        table = quote_ident(table)?,
        geom = quote_ident(target.geometry_column)?,
        wkt = quote_ident(target.wkt_column)?,
        pattern = NUMERIC_PATTERN,
    ))
}

/// Full-table fetch, one JSON document per row.
pub fn fetch_all_sql(table: &str) -> StoreResult<String> {
    Ok(format!(
        "SELECT row_to_json(t)::text FROM {} AS t",
        quote_ident(table)?
    ))
}

/// Rows per multi-row `INSERT` so that binds stay under [`MAX_BIND_PARAMS`].
pub fn rows_per_statement(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).max(1)
}
