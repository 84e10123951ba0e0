//! Source read endpoint for the replication pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::canonical::RawRecord;
use crate::error::{SourceError, SourceResult};
use crate::ingestion::json::parse_json_objects;

/// Produces the full list of raw records to replicate.
pub trait RecordSource {
    /// Fetch every record. Any failure is terminal for the run.
    fn fetch(&self) -> SourceResult<Vec<RawRecord>>;

    /// Human-readable location, used in logs and observer context.
    fn describe(&self) -> String;
}

/// Reads records with a GET request against the source service.
pub struct HttpSource {
    client: Client,
    url: String,
}

impl fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSource").field("url", &self.url).finish()
    }
}

impl HttpSource {
    /// Source for `url`, giving up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl RecordSource for HttpSource {
    fn fetch(&self) -> SourceResult<Vec<RawRecord>> {
        tracing::info!(url = %self.url, "fetching source records");
        let response = self.client.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        let body = response.text()?;
        let records = parse_payload(&body)?;
        tracing::debug!(records = records.len(), "source records received");
        Ok(records)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Reads records from a JSON file (array of objects or NDJSON).
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecordSource for FileSource {
    fn fetch(&self) -> SourceResult<Vec<RawRecord>> {
        let body = std::fs::read_to_string(&self.path)?;
        parse_payload(&body)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Serves a fixed list of records.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<RawRecord>,
}

impl StaticSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }
}

impl RecordSource for StaticSource {
    fn fetch(&self) -> SourceResult<Vec<RawRecord>> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

fn parse_payload(body: &str) -> SourceResult<Vec<RawRecord>> {
    parse_json_objects(body).map_err(|e| SourceError::Payload {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_must_hold_objects() {
        assert!(parse_payload("[]").unwrap().is_empty());
        assert_eq!(parse_payload(r#"[{"a":1},{"b":2}]"#).unwrap().len(), 2);
        assert!(matches!(
            parse_payload("[1, 2]"),
            Err(SourceError::Payload { .. })
        ));
    }
}
