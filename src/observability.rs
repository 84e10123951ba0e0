//! Pipeline outcome observers.
//!
//! Both pipelines report their outcome to an optional [`PipelineObserver`]: `on_success` with the
//! run's [`PipelineStats`], `on_failure` with a computed [`PipelineSeverity`], and `on_alert` when
//! that severity reaches the configured threshold.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{IngestionError, PipelineError};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PipelineSeverity {
    /// Informational event.
    Info,
    /// Non-fatal outcome (nothing to do).
    Warning,
    /// The run failed.
    Error,
    /// Infrastructure failure: source or store unreachable, unreadable input.
    Critical,
}

/// Which pipeline produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// File ingestion into a reconciled table.
    Ingest,
    /// Source endpoint replication.
    Replicate,
    /// Strict single-record insert.
    Insert,
    /// Geometry backfill.
    Enrich,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineKind::Ingest => "ingest",
            PipelineKind::Replicate => "replicate",
            PipelineKind::Insert => "insert",
            PipelineKind::Enrich => "enrich",
        })
    }
}

/// Context about a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub kind: PipelineKind,
    /// Destination table.
    pub table: String,
    /// Where the records came from (file path, source URL).
    pub input: String,
}

impl PipelineContext {
    pub fn new(kind: PipelineKind, table: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            input: input.into(),
        }
    }
}

/// Counters reported on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Rows written to the destination.
    pub rows: u64,
    /// Columns added to the destination table.
    pub columns_added: usize,
    /// Rows that received a geometry.
    pub geometry_rows: u64,
}

/// Observer interface for pipeline outcomes.
pub trait PipelineObserver: Send + Sync {
    /// Called when a run succeeds.
    fn on_success(&self, _ctx: &PipelineContext, _stats: PipelineStats) {}

    /// Called when a run fails.
    fn on_failure(&self, _ctx: &PipelineContext, _severity: PipelineSeverity, _error: &PipelineError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Severity of a pipeline failure.
pub fn severity_for_error(error: &PipelineError) -> PipelineSeverity {
    match error {
        PipelineError::SourceUnavailable(_) => PipelineSeverity::Critical,
        PipelineError::ValidationEmpty => PipelineSeverity::Warning,
        PipelineError::Schema(e) | PipelineError::Store(e) if e.is_connectivity() => {
            PipelineSeverity::Critical
        }
        PipelineError::Input(e) => match e {
            IngestionError::Io(_) => PipelineSeverity::Critical,
            IngestionError::Csv(err) if matches!(err.kind(), ::csv::ErrorKind::Io(_)) => {
                PipelineSeverity::Critical
            }
            _ => PipelineSeverity::Error,
        },
        _ => PipelineSeverity::Error,
    }
}

/// Report `result` to `observer`, alerting when the failure severity is at least `alert_at_or_above`.
pub(crate) fn notify<T>(
    observer: Option<&Arc<dyn PipelineObserver>>,
    alert_at_or_above: PipelineSeverity,
    ctx: &PipelineContext,
    result: &Result<T, PipelineError>,
    stats: impl FnOnce(&T) -> PipelineStats,
) {
    let Some(obs) = observer else {
        return;
    };
    match result {
        Ok(value) => obs.on_success(ctx, stats(value)),
        Err(e) => {
            let sev = severity_for_error(e);
            obs.on_failure(ctx, sev, e);
            if sev >= alert_at_or_above {
                obs.on_alert(ctx, sev, e);
            }
        }
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_success(&self, ctx: &PipelineContext, stats: PipelineStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits pipeline events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_success(&self, ctx: &PipelineContext, stats: PipelineStats) {
        tracing::info!(
            pipeline = %ctx.kind,
            table = %ctx.table,
            input = %ctx.input,
            rows = stats.rows,
            columns_added = stats.columns_added,
            geometry_rows = stats.geometry_rows,
            "pipeline succeeded"
        );
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        let category = error.category();
        if severity >= PipelineSeverity::Error {
            tracing::error!(pipeline = %ctx.kind, table = %ctx.table, input = %ctx.input, ?severity, %category, %error, "pipeline failed");
        } else {
            tracing::warn!(pipeline = %ctx.kind, table = %ctx.table, input = %ctx.input, ?severity, %category, %error, "pipeline finished without writing");
        }
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        tracing::error!(
            alert = true,
            pipeline = %ctx.kind,
            table = %ctx.table,
            input = %ctx.input,
            ?severity,
            %error,
            "ALERT"
        );
    }
}

/// Appends pipeline events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl PipelineObserver for FileObserver {
    fn on_success(&self, ctx: &PipelineContext, stats: PipelineStats) {
        self.append_line(&format!(
            "{} ok pipeline={} table={} input={} rows={} columns_added={} geometry_rows={}",
            unix_ts(),
            ctx.kind,
            ctx.table,
            ctx.input,
            stats.rows,
            stats.columns_added,
            stats.geometry_rows
        ));
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        self.append_line(&format!(
            "{} fail severity={:?} category={} pipeline={} table={} input={} err={}",
            unix_ts(),
            severity,
            error.category(),
            ctx.kind,
            ctx.table,
            ctx.input,
            error
        ));
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} category={} pipeline={} table={} input={} err={}",
            unix_ts(),
            severity,
            error.category(),
            ctx.kind,
            ctx.table,
            ctx.input,
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
