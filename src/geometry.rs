//! Point geometry derivation.
//!
//! Two column-name resolvers are involved and configured independently:
//!
//! - the *detection* pair ([`MarkerResolver`]) decides whether a dataset is spatial at all, by
//!   looking for a latitude-like and a longitude-like column name;
//! - the *update* pair ([`ExactPair`]) names the columns whose values become the point's X and Y.
//!
//! Rows are matched back to the stored table through an identifier column. Rows without a usable
//! identifier or coordinates keep a null geometry and are picked up later by [`backfill`].

use std::collections::HashMap;
use std::ops::Range;

use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::store::{GeometryTarget, PointUpdate, Store};
use crate::types::{ColumnDef, ColumnType, DataSet};

/// Spatial reference id used for every derived point (WGS 84).
pub const WGS84_SRID: i32 = 4326;

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Canonical text rendering, identical to PostGIS `ST_AsText` (`POINT(x y)`).
    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.x, self.y)
    }

    /// GeoJSON rendering, as PostgreSQL's `row_to_json` emits geometry values.
    pub fn to_geojson(&self) -> serde_json::Value {
        serde_json::json!({ "type": "Point", "coordinates": [self.x, self.y] })
    }
}

/// Finds a pair of coordinate columns among a dataset's column names.
pub trait CoordinateResolver {
    /// The `(x-ish, y-ish)` column names, if both are present.
    fn resolve(&self, columns: &[String]) -> Option<(String, String)>;
}

/// Detects latitude/longitude columns by name-token prefix.
///
/// Names are split on anything that is not alphanumeric; a column matches when one of its tokens
/// starts with the marker. `gps_lat` and `latitude` match `lat`, `population` does not.
///
/// This is narrower than a plain substring test: a marker buried inside a token (`gpslat`,
/// `geolon`) is not detected. Such columns need a separator or a custom resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerResolver {
    pub latitude_marker: String,
    pub longitude_marker: String,
}

impl Default for MarkerResolver {
    fn default() -> Self {
        Self {
            latitude_marker: "lat".to_string(),
            longitude_marker: "lon".to_string(),
        }
    }
}

fn has_token_with_prefix(name: &str, marker: &str) -> bool {
    let marker = marker.to_lowercase();
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| !token.is_empty() && token.starts_with(&marker))
}

impl CoordinateResolver for MarkerResolver {
    /// Returns `(longitude, latitude)`, i.e. `(x, y)`.
    fn resolve(&self, columns: &[String]) -> Option<(String, String)> {
        let lat = columns
            .iter()
            .find(|c| has_token_with_prefix(c, &self.latitude_marker))?;
        let lon = columns
            .iter()
            .find(|c| *c != lat && has_token_with_prefix(c, &self.longitude_marker))?;
        Some((lon.clone(), lat.clone()))
    }
}

/// Uses two explicitly named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactPair {
    pub x: String,
    pub y: String,
}

impl Default for ExactPair {
    fn default() -> Self {
        Self {
            x: "point_x".to_string(),
            y: "point_y".to_string(),
        }
    }
}

impl CoordinateResolver for ExactPair {
    fn resolve(&self, columns: &[String]) -> Option<(String, String)> {
        let has = |name: &str| columns.iter().any(|c| c == name);
        (has(&self.x) && has(&self.y)).then(|| (self.x.clone(), self.y.clone()))
    }
}

/// Geometry derivation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryOptions {
    /// Decides whether the dataset carries coordinates.
    pub detection: MarkerResolver,
    /// Columns whose values become the point.
    pub update_pair: ExactPair,
    /// Stable identifier column used to match rows.
    pub id_column: String,
    /// Spatial point column.
    pub geometry_column: String,
    /// Textual mirror column.
    pub wkt_column: String,
    pub srid: i32,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        Self {
            detection: MarkerResolver::default(),
            update_pair: ExactPair::default(),
            id_column: "objectid".to_string(),
            geometry_column: "geom".to_string(),
            wkt_column: "geom_wkt".to_string(),
            srid: WGS84_SRID,
        }
    }
}

impl GeometryOptions {
    /// Columns that are always derived and never written directly.
    pub fn derived_columns(&self) -> [&str; 2] {
        [self.geometry_column.as_str(), self.wkt_column.as_str()]
    }

    /// Store-facing description of where geometry lives.
    pub fn target(&self) -> GeometryTarget<'_> {
        GeometryTarget {
            id_column: &self.id_column,
            geometry_column: &self.geometry_column,
            wkt_column: &self.wkt_column,
            srid: self.srid,
        }
    }
}

/// Per-row geometry updates computed from a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryPlan {
    per_row: Vec<Option<PointUpdate>>,
    /// Rows without identifier or parseable coordinates.
    pub skipped: usize,
    /// Rows whose identifier appears more than once in the dataset.
    pub duplicates: usize,
}

impl GeometryPlan {
    /// Updates for the dataset rows in `rows`.
    pub fn updates_for(&self, rows: Range<usize>) -> Vec<PointUpdate> {
        let end = rows.end.min(self.per_row.len());
        let start = rows.start.min(end);
        self.per_row[start..end].iter().flatten().cloned().collect()
    }

    /// Number of rows that will receive a geometry.
    pub fn planned(&self) -> usize {
        self.per_row.iter().filter(|u| u.is_some()).count()
    }
}

/// Derives point geometry for one target table.
#[derive(Debug, Clone)]
pub struct GeometryEnricher<'o> {
    options: &'o GeometryOptions,
    detected: (String, String),
}

impl<'o> GeometryEnricher<'o> {
    /// Returns an enricher when `columns` contain a latitude/longitude pair.
    pub fn detect(options: &'o GeometryOptions, columns: &[String]) -> Option<Self> {
        let detected = options.detection.resolve(columns)?;
        tracing::debug!(x = %detected.0, y = %detected.1, "coordinate columns detected");
        Some(Self { options, detected })
    }

    /// The `(longitude, latitude)` columns that triggered detection.
    pub fn detected_columns(&self) -> (&str, &str) {
        (&self.detected.0, &self.detected.1)
    }

    pub fn options(&self) -> &GeometryOptions {
        self.options
    }

    /// Make sure `table` has the point column and its text mirror. Returns the columns added.
    pub fn ensure_columns<S: Store>(&self, store: &mut S, table: &str) -> StoreResult<Vec<String>> {
        store.ensure_spatial_support()?;
        let schema = store
            .table_schema(table)?
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })?;

        let wanted = [
            ColumnDef::point(&self.options.geometry_column, self.options.srid),
            ColumnDef::text(&self.options.wkt_column),
        ];
        let mut added = Vec::new();
        for column in wanted {
            match schema.column(&column.name) {
                Some(existing) if existing.column_type != column.column_type => {
                    if matches!(column.column_type, ColumnType::Point { .. }) {
                        return Err(StoreError::Constraint {
                            table: table.to_string(),
                            message: format!(
                                "column '{}' exists but is not a point geometry",
                                column.name
                            ),
                        });
                    }
                }
                Some(_) => {}
                None => {
                    store.add_column(table, &column)?;
                    tracing::info!(table, column = %column.name, "added geometry column");
                    added.push(column.name);
                }
            }
        }
        Ok(added)
    }

    /// Compute the geometry update for every dataset row.
    ///
    /// A row gets an update when it has a non-null identifier and both update-pair values parse
    /// as finite numbers. Identifiers seen on more than one row are skipped, since the stored row
    /// they would match is ambiguous.
    pub fn plan(&self, dataset: &DataSet) -> GeometryPlan {
        let indices = self
            .options
            .update_pair
            .resolve(&dataset.columns)
            .and_then(|(x, y)| Some((dataset.index_of(&x)?, dataset.index_of(&y)?)))
            .zip(dataset.index_of(&self.options.id_column));
        let Some(((x_idx, y_idx), id_idx)) = indices else {
            tracing::warn!(
                id = %self.options.id_column,
                x = %self.options.update_pair.x,
                y = %self.options.update_pair.y,
                "identifier or coordinate columns missing; geometry left for a later enrichment pass"
            );
            return GeometryPlan {
                per_row: vec![None; dataset.row_count()],
                skipped: dataset.row_count(),
                duplicates: 0,
            };
        };

        let ids: Vec<Option<String>> = dataset
            .rows
            .iter()
            .map(|row| row.get(id_idx).and_then(|v| v.to_text()))
            .collect();
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for id in ids.iter().flatten() {
            *seen.entry(id.as_str()).or_default() += 1;
        }

        let mut plan = GeometryPlan::default();
        for (row, id) in dataset.rows.iter().zip(&ids) {
            let Some(id) = id else {
                plan.skipped += 1;
                plan.per_row.push(None);
                continue;
            };
            if seen.get(id.as_str()).copied().unwrap_or(0) > 1 {
                plan.duplicates += 1;
                plan.per_row.push(None);
                continue;
            }
            let x = row.get(x_idx).and_then(|v| v.as_f64()).filter(|v| v.is_finite());
            let y = row.get(y_idx).and_then(|v| v.as_f64()).filter(|v| v.is_finite());
            match (x, y) {
                (Some(x), Some(y)) => plan.per_row.push(Some(PointUpdate {
                    id: id.clone(),
                    point: Point::new(x, y),
                })),
                _ => {
                    plan.skipped += 1;
                    plan.per_row.push(None);
                }
            }
        }
        if plan.duplicates > 0 {
            tracing::warn!(rows = plan.duplicates, "duplicate identifiers; geometry not derived for those rows");
        }
        plan
    }

    /// Write `updates` to `table`. Identifiers that match no stored row are a no-op.
    pub fn apply<S: Store>(&self, store: &mut S, table: &str, updates: &[PointUpdate]) -> StoreResult<u64> {
        store.update_geometry(table, &self.options.target(), updates)
    }
}

/// Derive geometry for rows of `table` that still lack it, from the stored update-pair columns.
///
/// Rows whose stored coordinates are missing or not numeric are left unchanged.
pub fn backfill<S: Store>(store: &mut S, table: &str, options: &GeometryOptions) -> StoreResult<u64> {
    let schema = store
        .table_schema(table)?
        .ok_or_else(|| StoreError::UnknownTable {
            table: table.to_string(),
        })?;
    for column in [
        options.update_pair.x.as_str(),
        options.update_pair.y.as_str(),
        options.geometry_column.as_str(),
        options.wkt_column.as_str(),
    ] {
        if !schema.contains(column) {
            return Err(StoreError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
    }
    let updated = store.backfill_geometry(
        table,
        &options.target(),
        &options.update_pair.x,
        &options.update_pair.y,
    )?;
    tracing::info!(table, rows = updated, "geometry backfill finished");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wkt_uses_shortest_decimal_form() {
        assert_eq!(Point::new(-1.5, 12.25).to_wkt(), "POINT(-1.5 12.25)");
        assert_eq!(Point::new(1.0, 2.0).to_wkt(), "POINT(1 2)");
    }

    #[test]
    fn detection_matches_name_tokens() {
        let resolver = MarkerResolver::default();
        assert_eq!(
            resolver.resolve(&cols(&["objectid", "gps_latitude", "gps_longitude"])),
            Some(("gps_longitude".to_string(), "gps_latitude".to_string()))
        );
        assert_eq!(resolver.resolve(&cols(&["population", "longitude"])), None);
        assert_eq!(resolver.resolve(&cols(&["point_x", "point_y"])), None);
        assert_eq!(resolver.resolve(&cols(&["gpslat", "gpslon"])), None);
    }

    #[test]
    fn exact_pair_requires_both_columns() {
        let pair = ExactPair::default();
        assert!(pair.resolve(&cols(&["point_x", "point_y"])).is_some());
        assert!(pair.resolve(&cols(&["point_x"])).is_none());
    }

    #[test]
    fn plan_skips_duplicates_and_unparseable_rows() {
        use crate::types::Value;

        let options = GeometryOptions::default();
        let columns = cols(&["objectid", "lat", "lon", "point_x", "point_y"]);
        let enricher = GeometryEnricher::detect(&options, &columns).unwrap();
        let row = |id: Value, x: &str, y: &str| {
            vec![
                id,
                Value::Null,
                Value::Null,
                Value::Utf8(x.to_string()),
                Value::Utf8(y.to_string()),
            ]
        };
        let ds = DataSet::new(
            columns,
            vec![
                row(Value::Int64(1), "-1.5", "12.25"),
                row(Value::Int64(2), "n/a", "12"),
                row(Value::Int64(3), "1", "2"),
                row(Value::Int64(3), "1", "2"),
                row(Value::Null, "1", "2"),
            ],
        );

        let plan = enricher.plan(&ds);
        assert_eq!(plan.planned(), 1);
        assert_eq!(plan.skipped, 2);
        assert_eq!(plan.duplicates, 2);
        assert_eq!(
            plan.updates_for(0..5),
            vec![PointUpdate {
                id: "1".to_string(),
                point: Point::new(-1.5, 12.25),
            }]
        );
        assert!(plan.updates_for(1..5).is_empty());
    }
}
