//! `subscriber-etl` loads utility-subscriber spreadsheets into PostgreSQL/PostGIS and replicates
//! subscriber records between services.
//!
//! ## File ingestion
//!
//! [`pipeline::ingest_file`] reads a CSV, Excel or JSON file into a [`types::DataSet`] (header
//! names lowercased), then:
//!
//! - reconciles the destination table with the file's columns ([`schema::SchemaReconciler`]):
//!   the table is created when missing and columns are only ever added, as `TEXT`
//! - inserts every row, never writing the derived geometry columns directly
//!   ([`pipeline::RowIngester`])
//! - when the file has latitude/longitude columns, adds `geom geometry(Point, 4326)` and its
//!   `geom_wkt` mirror and derives a point per row from `point_x`/`point_y`, matched on `objectid`
//!   ([`geometry::GeometryEnricher`])
//!
//! ```no_run
//! use subscriber_etl::pipeline::{ingest_file, IngestOptions};
//! use subscriber_etl::store::PgConnector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = PgConnector::from_url("postgres://postgres@localhost/bd_ouaga_pdec")?;
//! let summary = ingest_file("abonnes.xlsx", &connector, &IngestOptions::default())?;
//! println!("rows={} new_columns={:?}", summary.rows_inserted, summary.schema.columns_added);
//! # Ok(())
//! # }
//! ```
//!
//! ## Replication
//!
//! [`pipeline::replicate`] fetches records from a [`source::RecordSource`], uppercases their keys,
//! nulls `NaN` sentinels, projects them onto the 45 [`canonical::CANONICAL_FIELDS`] and inserts
//! them in a single transaction.
//!
//! ```rust
//! use subscriber_etl::pipeline::{replicate, ReplicationOptions};
//! use subscriber_etl::source::StaticSource;
//! use subscriber_etl::store::MemoryConnector;
//!
//! let record = serde_json::json!({ "objectid": 1, "Nom": "Kaboré", "prénoms": "NaN" });
//! let source = StaticSource::new(vec![record.as_object().cloned().unwrap()]);
//! let connector = MemoryConnector::new();
//!
//! let summary = replicate(&source, &connector, &ReplicationOptions::default()).unwrap();
//! assert_eq!(summary.inserted, 1);
//! assert_eq!(connector.rows("abonne_reçoit_api")[0]["prénoms"], serde_json::Value::Null);
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: tabular file loading
//! - [`schema`]: add-if-absent table reconciliation
//! - [`geometry`]: coordinate detection and point derivation
//! - [`canonical`]: the canonical record, key normalization and projection
//! - [`source`]: source read endpoint
//! - [`pipeline`]: the ingestion and replication pipelines
//! - [`store`]: destination store trait, PostgreSQL and in-memory backends
//! - [`observability`], [`report`], [`config`], [`error`]

pub mod canonical;
pub mod config;
pub mod error;
pub mod geometry;
pub mod ingestion;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod source;
pub mod store;
pub mod types;

pub use error::{ErrorCategory, IngestionError, PipelineError, SourceError, StoreError};
