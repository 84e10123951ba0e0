//! The two pipelines and their supporting passes.
//!
//! - [`ingest_file`]: tabular file → reconciled table (+ derived point geometry)
//! - [`replicate`]: source read endpoint → canonical table, all-or-nothing
//! - [`insert_record`], [`dump_table`], [`enrich_table`]: single-record insert, full-table fetch,
//!   geometry backfill
//!
//! Every entrypoint takes a [`crate::store::Connector`] and holds one connection for the duration
//! of the call, releasing it on every exit path.

pub mod enrich;
pub mod ingest;
pub mod replication;

pub use enrich::enrich_table;
pub use ingest::{
    ingest_dataset, ingest_file, CommitPolicy, GeometrySummary, IngestOptions, IngestSummary, RowCounts, RowIngester,
};
pub use replication::{
    dump_table, insert_record, prepare_records, replicate, ReplicationOptions, ReplicationSummary,
};
