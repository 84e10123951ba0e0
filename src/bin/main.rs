//! subscriber-etl CLI
//!
//! Usage:
//!   subscriber-etl ingest <file> [--table <name>] [--sheet <name> | --all-sheets] [--commit-every <n>]
//!   subscriber-etl replicate [--source-url <url> | --from-file <file.json>] [--table <name>]
//!   subscriber-etl enrich [--table <name>]
//!   subscriber-etl dump [--table <name>]
//!   subscriber-etl insert '<json object>' [--table <name>]
//!
//! Connection settings come from the environment (`DATABASE_URL` or `PG*`, see `.env`).
//! `--dry-run` runs against an in-memory store and prints the resulting table.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use subscriber_etl::config::AppConfig;
use subscriber_etl::error::PipelineError;
use subscriber_etl::ingestion::{ExcelSheetSelection, LoadOptions};
use subscriber_etl::observability::{
    CompositeObserver, FileObserver, PipelineObserver, PipelineSeverity, TracingObserver,
};
use subscriber_etl::pipeline::{
    dump_table, enrich_table, ingest_file, insert_record, replicate, CommitPolicy, IngestOptions,
    ReplicationOptions,
};
use subscriber_etl::report::PipelineReport;
use subscriber_etl::source::{FileSource, HttpSource, RecordSource};
use subscriber_etl::store::{Connector, MemoryConnector};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "subscriber-etl")]
#[command(about = "Load subscriber files into PostGIS and replicate subscriber records")]
#[command(version)]
struct Cli {
    /// Run against an in-memory store instead of PostgreSQL
    #[arg(long, global = true)]
    dry_run: bool,

    /// Append pipeline events to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a CSV, Excel or JSON file into a reconciled table
    Ingest {
        /// Path to the input file
        file: PathBuf,

        /// Destination table (default: INGEST_TABLE)
        #[arg(short, long)]
        table: Option<String>,

        /// Excel sheet to load (default: first sheet)
        #[arg(long, conflicts_with = "all_sheets")]
        sheet: Option<String>,

        /// Load and concatenate every sheet of the workbook
        #[arg(long)]
        all_sheets: bool,

        /// Commit after every N rows instead of once at the end
        #[arg(long)]
        commit_every: Option<usize>,
    },

    /// Replicate source records into the canonical table
    Replicate {
        /// Source read endpoint (default: SOURCE_URL)
        #[arg(long, conflicts_with = "from_file")]
        source_url: Option<String>,

        /// Read source records from a JSON file instead
        #[arg(long)]
        from_file: Option<PathBuf>,

        /// Destination table (default: REPLICATION_TABLE)
        #[arg(short, long)]
        table: Option<String>,

        /// Source request timeout in seconds (default: SOURCE_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Derive geometry for rows ingested without it
    Enrich {
        /// Table to enrich (default: INGEST_TABLE)
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Print every row of a table as JSON
    Dump {
        /// Table to read (default: REPLICATION_TABLE)
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Insert one record carrying all canonical fields
    Insert {
        /// The record, as a JSON object
        record: String,

        /// Destination table (default: REPLICATION_TABLE)
        #[arg(short, long)]
        table: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let mut observers: Vec<Arc<dyn PipelineObserver>> = vec![Arc::new(TracingObserver)];
    if let Some(path) = &cli.log_file {
        observers.push(Arc::new(FileObserver::new(path)));
    }
    let observer: Arc<dyn PipelineObserver> = Arc::new(CompositeObserver::new(observers));

    if cli.dry_run {
        let connector = MemoryConnector::new();
        let (report, table) = run(&cli.command, &connector, &config, observer);
        print_json(&report);
        if let Some(table) = table {
            print_json(&connector.rows(&table));
        }
        exit_code(&report)
    } else {
        let connector = match config.connector() {
            Ok(c) => c.with_connect_timeout(Duration::from_secs(30)),
            Err(e) => {
                let report = PipelineReport::failure(&PipelineError::Store(e));
                print_json(&report);
                return exit_code(&report);
            }
        };
        let (report, _) = run(&cli.command, &connector, &config, observer);
        print_json(&report);
        exit_code(&report)
    }
}

/// Run one command; returns its report and the table it wrote to.
fn run<C: Connector>(
    command: &Commands,
    connector: &C,
    config: &AppConfig,
    observer: Arc<dyn PipelineObserver>,
) -> (PipelineReport, Option<String>) {
    match command {
        Commands::Ingest {
            file,
            table,
            sheet,
            all_sheets,
            commit_every,
        } => {
            let excel_sheet_selection = match (sheet, all_sheets) {
                (Some(name), _) => ExcelSheetSelection::Sheet(name.clone()),
                (None, true) => ExcelSheetSelection::AllSheets,
                (None, false) => ExcelSheetSelection::First,
            };
            let options = IngestOptions {
                table: table.clone().unwrap_or_else(|| config.ingest_table.clone()),
                load: LoadOptions {
                    excel_sheet_selection,
                    ..Default::default()
                },
                commit: commit_every.map_or(CommitPolicy::AtEnd, CommitPolicy::EveryRows),
                observer: Some(observer),
                alert_at_or_above: PipelineSeverity::Critical,
                ..Default::default()
            };
            let result = ingest_file(file, connector, &options);
            let report = PipelineReport::from_result(&result, |s| s.rows_inserted, "rows ingested");
            (report, Some(options.table))
        }
        Commands::Replicate {
            source_url,
            from_file,
            table,
            timeout_secs,
        } => {
            let options = ReplicationOptions {
                table: table.clone().unwrap_or_else(|| config.replication_table.clone()),
                observer: Some(observer),
                alert_at_or_above: PipelineSeverity::Critical,
            };
            let source: Box<dyn RecordSource> = match from_file {
                Some(path) => Box::new(FileSource::new(path)),
                None => {
                    let url = source_url.clone().unwrap_or_else(|| config.source_url.clone());
                    let timeout = timeout_secs.map_or(config.source_timeout, Duration::from_secs);
                    match HttpSource::new(url, timeout) {
                        Ok(s) => Box::new(s),
                        Err(e) => {
                            return (PipelineReport::failure(&PipelineError::SourceUnavailable(e)), None);
                        }
                    }
                }
            };
            let result = replicate(source.as_ref(), connector, &options);
            let report = PipelineReport::from_result(&result, |s| s.inserted, "records replicated");
            (report, Some(options.table))
        }
        Commands::Enrich { table } => {
            let options = IngestOptions {
                table: table.clone().unwrap_or_else(|| config.ingest_table.clone()),
                observer: Some(observer),
                ..Default::default()
            };
            let result = enrich_table(connector, &options);
            let report = PipelineReport::from_result(&result, |n| *n, "rows enriched");
            (report, Some(options.table))
        }
        Commands::Dump { table } => {
            let table = table.clone().unwrap_or_else(|| config.replication_table.clone());
            match dump_table(connector, &table) {
                Ok(rows) => {
                    print_json(&rows);
                    (PipelineReport::success(rows.len() as u64, format!("{} rows", rows.len())), None)
                }
                Err(e) => (PipelineReport::failure(&e), None),
            }
        }
        Commands::Insert { record, table } => {
            let options = ReplicationOptions {
                table: table.clone().unwrap_or_else(|| config.replication_table.clone()),
                observer: Some(observer),
                alert_at_or_above: PipelineSeverity::Critical,
            };
            let parsed = serde_json::from_str::<serde_json::Value>(record)
                .map_err(|e| PipelineError::Unknown {
                    message: format!("record is not valid json: {e}"),
                })
                .and_then(|v| match v {
                    serde_json::Value::Object(map) => Ok(map),
                    _ => Err(PipelineError::Unknown {
                        message: "record must be a json object".to_string(),
                    }),
                });
            let result = parsed.and_then(|map| insert_record(&map, connector, &options));
            let report = PipelineReport::from_result(&result, |n| *n, "record inserted");
            (report, Some(options.table))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to render output: {e}"),
    }
}

fn exit_code(report: &PipelineReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
