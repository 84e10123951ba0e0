use std::fmt;

use thiserror::Error;

/// Convenience result type for file loading.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Convenience result type for destination store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Convenience result type for the source read endpoint.
pub type SourceResult<T> = Result<T, SourceError>;

/// Convenience result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned while loading a tabular file into a [`crate::types::DataSet`].
///
/// This is a single error enum shared across CSV/JSON (and optional Excel) loading.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel loading error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV loading error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON document could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension (or forced format) is not one we can load.
    #[error("unsupported format: {message}")]
    UnsupportedFormat { message: String },

    /// The input does not have a usable header (no header row, duplicate column names, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A row could not be read.
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },
}

/// Error type returned by [`crate::store::Store`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the PostgreSQL driver.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The async runtime backing the blocking store facade could not be started.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// The store cannot be reached (connection refused, closed handle, ...).
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// The referenced table does not exist.
    #[error("table '{table}' does not exist")]
    UnknownTable { table: String },

    /// The referenced column does not exist on the table.
    #[error("column '{column}' of table '{table}' does not exist")]
    UnknownColumn { table: String, column: String },

    /// A column name appears more than once in a table definition.
    #[error("column '{column}' specified more than once for table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// An identifier (table or column name) is not usable.
    #[error("invalid identifier '{identifier}': {message}")]
    InvalidIdentifier { identifier: String, message: String },

    /// A row violates a table constraint (primary key, not null).
    #[error("constraint violation on table '{table}': {message}")]
    Constraint { table: String, message: String },

    /// `commit`/`rollback` was called without an open transaction.
    #[error("no transaction in progress")]
    NoTransaction,
}

impl StoreError {
    /// Whether the error means the store itself is unreachable rather than a statement failing.
    pub fn is_connectivity(&self) -> bool {
        match self {
            StoreError::Unavailable { .. } | StoreError::Runtime(_) => true,
            StoreError::Sqlx(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Error type returned by [`crate::source::RecordSource`] implementations.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The endpoint could not be reached or the response body could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("source returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// The payload is not a JSON array of objects.
    #[error("invalid payload: {message}")]
    Payload { message: String },

    /// A file-backed source could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure category reported to callers of the pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Source endpoint unreachable or answered with a non-success status.
    SourceUnavailable,
    /// Nothing left to write after normalisation and projection.
    ValidationEmpty,
    /// Table or column creation/alteration failed.
    Schema,
    /// Insert, update or commit failed.
    Store,
    /// The input file could not be read.
    Input,
    /// A strictly validated record lacks canonical fields.
    MissingFields,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    /// Stable label used in reports and logs.
    pub fn label(self) -> &'static str {
        match self {
            ErrorCategory::SourceUnavailable => "source_unavailable",
            ErrorCategory::ValidationEmpty => "validation_empty",
            ErrorCategory::Schema => "schema_error",
            ErrorCategory::Store => "store_error",
            ErrorCategory::Input => "input_error",
            ErrorCategory::MissingFields => "missing_fields",
            ErrorCategory::Unknown => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error type returned by the ingestion and replication pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source endpoint is unreachable or returned a non-success status.
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),

    /// Zero records remained after normalisation and projection.
    #[error("no valid data found")]
    ValidationEmpty,

    /// Data-definition failure; earlier schema changes of the run are kept.
    #[error("schema error: {0}")]
    Schema(#[source] StoreError),

    /// Insert/update/commit failure.
    #[error("store error: {0}")]
    Store(#[source] StoreError),

    /// The input file could not be loaded.
    #[error("input error: {0}")]
    Input(#[from] IngestionError),

    /// A record submitted for strict insertion lacks canonical fields.
    #[error("missing fields: {}", .fields.join(", "))]
    MissingFields { fields: Vec<String> },

    /// Any other failure.
    #[error("{message}")]
    Unknown { message: String },
}

impl PipelineError {
    /// Category used for reporting and severity classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::SourceUnavailable(_) => ErrorCategory::SourceUnavailable,
            PipelineError::ValidationEmpty => ErrorCategory::ValidationEmpty,
            PipelineError::Schema(_) => ErrorCategory::Schema,
            PipelineError::Store(_) => ErrorCategory::Store,
            PipelineError::Input(_) => ErrorCategory::Input,
            PipelineError::MissingFields { .. } => ErrorCategory::MissingFields,
            PipelineError::Unknown { .. } => ErrorCategory::Unknown,
        }
    }

    /// `ValidationEmpty` is a "nothing to do" outcome rather than a failure of the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::ValidationEmpty)
    }
}

/// Error type returned while reading process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: '{value}' ({message})")]
    Invalid {
        name: String,
        value: String,
        message: String,
    },

    /// The `.env` file exists but cannot be read.
    #[error("failed to load .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),
}
