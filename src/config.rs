//! Process configuration read from the environment (and an optional `.env` file).

use std::env;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;

use crate::error::{ConfigError, StoreResult};
use crate::store::PgConnector;

/// Table receiving ingested files unless configured otherwise.
pub const DEFAULT_INGEST_TABLE: &str = "abonne_sonabel_pdec_spatial";
/// Canonical table receiving replicated records unless configured otherwise.
pub const DEFAULT_REPLICATION_TABLE: &str = "abonne_reçoit_api";
/// Source read endpoint unless configured otherwise.
pub const DEFAULT_SOURCE_URL: &str = "http://localhost:5000/api/abonne";
pub const DEFAULT_DATABASE: &str = "bd_ouaga_pdec";

/// Where the destination database lives.
#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// A full `postgres://` URL (`DATABASE_URL`).
    Url(String),
    /// Individual `PG*` settings.
    Parts {
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    },
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseConfig::Url(_) => f.write_str("DatabaseConfig::Url(..)"),
            DatabaseConfig::Parts {
                host,
                port,
                user,
                database,
                ..
            } => f
                .debug_struct("DatabaseConfig::Parts")
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .field("database", database)
                .finish_non_exhaustive(),
        }
    }
}

/// Settings for the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub source_url: String,
    pub source_timeout: Duration,
    pub ingest_table: String,
    pub replication_table: String,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let database = match lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            Some(url) => DatabaseConfig::Url(url),
            None => DatabaseConfig::Parts {
                host: var("PGHOST", "localhost"),
                port: parse_number(&lookup, "PGPORT", 5432)?,
                user: var("PGUSER", "postgres"),
                password: var("PGPASSWORD", ""),
                database: var("PGDATABASE", DEFAULT_DATABASE),
            },
        };

        Ok(Self {
            database,
            source_url: var("SOURCE_URL", DEFAULT_SOURCE_URL),
            source_timeout: Duration::from_secs(parse_number(&lookup, "SOURCE_TIMEOUT_SECS", 30)?),
            ingest_table: var("INGEST_TABLE", DEFAULT_INGEST_TABLE),
            replication_table: var("REPLICATION_TABLE", DEFAULT_REPLICATION_TABLE),
        })
    }

    /// PostgreSQL connector for the configured database.
    pub fn connector(&self) -> StoreResult<PgConnector> {
        let connector = match &self.database {
            DatabaseConfig::Url(url) => PgConnector::from_url(url)?,
            DatabaseConfig::Parts {
                host,
                port,
                user,
                password,
                database,
            } => PgConnector::new(
                PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(user)
                    .password(password)
                    .database(database),
            ),
        };
        Ok(connector)
    }
}

fn parse_number<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name: name.to_string(),
            value: raw.clone(),
            message: e.to_string(),
        }),
    }
}
