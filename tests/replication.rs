use serde_json::{json, Map, Value as Json};
use subscriber_etl::canonical::{RawRecord, CANONICAL_FIELDS, CANONICAL_FIELD_COUNT};
use subscriber_etl::error::{SourceError, SourceResult};
use subscriber_etl::pipeline::{dump_table, insert_record, replicate, ReplicationOptions};
use subscriber_etl::source::{FileSource, HttpSource, RecordSource, StaticSource};
use subscriber_etl::store::MemoryConnector;
use subscriber_etl::{ErrorCategory, PipelineError};

const TABLE: &str = "abonne_reçoit_api";

fn record(value: Json) -> RawRecord {
    match value {
        Json::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

/// A record carrying every canonical field except the last `missing`, keys in lowercase.
fn record_without_last(objectid: i64, missing: usize) -> RawRecord {
    let mut map = Map::new();
    for (idx, field) in CANONICAL_FIELDS.iter().enumerate().take(CANONICAL_FIELDS.len() - missing) {
        let value = if idx == 0 { json!(objectid) } else { json!(format!("v{idx}")) };
        map.insert(field.to_lowercase(), value);
    }
    map
}

struct FailingSource;

impl RecordSource for FailingSource {
    fn fetch(&self) -> SourceResult<Vec<RawRecord>> {
        Err(SourceError::Status {
            status: 503,
            url: "http://localhost:5000/api/abonne".to_string(),
        })
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

#[test]
fn empty_source_reports_no_valid_data_and_leaves_destination_untouched() {
    let connector = MemoryConnector::new();
    let err = replicate(&StaticSource::default(), &connector, &ReplicationOptions::default()).unwrap_err();

    assert!(matches!(err, PipelineError::ValidationEmpty));
    assert!(!err.is_fatal());
    assert_eq!(err.to_string(), "no valid data found");
    assert!(connector.table_schema(TABLE).is_none());
    assert_eq!(connector.open_connections(), 0);
}

#[test]
fn record_without_canonical_fields_fails_the_whole_batch() {
    let connector = MemoryConnector::new();
    let source = StaticSource::new(vec![
        record(json!({ "OBJECTID": 1, "nom": "a" })),
        record(json!({ "foo": 1 })),
    ]);

    let err = replicate(&source, &connector, &ReplicationOptions::default()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Store);
    assert!(connector.rows(TABLE).is_empty());
    assert_eq!(connector.open_connections(), 0);
}

#[test]
fn record_with_only_an_identifier_is_inserted() {
    let connector = MemoryConnector::new();
    let source = StaticSource::new(vec![record(json!({ "objectid": 3, "foo": 1, "nom": "NaN" }))]);

    let summary = replicate(&source, &connector, &ReplicationOptions::default()).unwrap();
    assert_eq!((summary.fetched, summary.inserted), (1, 1));
    let rows = connector.rows(TABLE);
    assert_eq!(rows[0]["objectid"], json!("3"));
    assert_eq!(rows[0]["nom"], Json::Null);
}

#[test]
fn record_missing_ten_fields_is_inserted_with_nulls() {
    let connector = MemoryConnector::new();
    let source = StaticSource::new(vec![record_without_last(1, 10)]);

    let summary = replicate(&source, &connector, &ReplicationOptions::default()).unwrap();
    assert_eq!(summary.inserted, 1);
    assert!(summary.table_created);

    let rows = connector.rows(TABLE);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.len(), CANONICAL_FIELD_COUNT);
    let nulls: Vec<&String> = row.iter().filter(|(_, v)| v.is_null()).map(|(k, _)| k).collect();
    assert_eq!(nulls.len(), 10);
    assert_eq!(row["objectid"], json!("1"));
    assert_eq!(row["section"], json!("v1"));
    assert_eq!(row["fcfa_2023_2024"], Json::Null);
}

#[test]
fn constraint_violation_mid_batch_commits_nothing() {
    let connector = MemoryConnector::new();
    let records = [1, 2, 1, 4, 5]
        .into_iter()
        .map(|id| record(json!({ "OBJECTID": id, "nom": format!("abonné {id}") })))
        .collect();

    let err = replicate(&StaticSource::new(records), &connector, &ReplicationOptions::default()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Store);
    assert!(connector.rows(TABLE).is_empty());
    assert_eq!(connector.open_connections(), 0);
}

#[test]
fn keys_are_matched_case_insensitively_and_unknown_fields_dropped() {
    let connector = MemoryConnector::new();
    let source = FileSource::new("tests/fixtures/source_records.json");

    let summary = replicate(&source, &connector, &ReplicationOptions::default()).unwrap();
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.inserted, 2);

    let rows = connector.rows(TABLE);
    assert_eq!(rows[0]["nom"], json!("Ouedraogo"));
    assert_eq!(rows[0]["prénoms"], json!("Awa"));
    assert_eq!(rows[1]["objectid"], json!("102"));
    assert_eq!(rows[1]["prénoms"], Json::Null);
    assert!(!rows[0].contains_key("unknown_field"));
}

#[test]
fn replication_appends_on_later_runs() {
    let connector = MemoryConnector::new();
    let opts = ReplicationOptions::default();
    replicate(&StaticSource::new(vec![record_without_last(1, 0)]), &connector, &opts).unwrap();
    let second = replicate(&StaticSource::new(vec![record_without_last(2, 0)]), &connector, &opts).unwrap();

    assert!(!second.table_created);
    assert!(second.columns_added.is_empty());
    assert_eq!(connector.rows(TABLE).len(), 2);
}

#[test]
fn unavailable_source_never_touches_destination() {
    let connector = MemoryConnector::new();
    let err = replicate(&FailingSource, &connector, &ReplicationOptions::default()).unwrap_err();

    assert_eq!(err.category(), ErrorCategory::SourceUnavailable);
    assert_eq!(err.category().label(), "source_unavailable");
    assert!(connector.table_schema(TABLE).is_none());
}

#[test]
fn unreachable_http_source_is_source_unavailable() {
    let connector = MemoryConnector::new();
    let source = HttpSource::new("http://127.0.0.1:9/api/abonne", std::time::Duration::from_secs(2)).unwrap();

    let err = replicate(&source, &connector, &ReplicationOptions::default()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::SourceUnavailable);
}

#[test]
fn unreachable_store_is_reported_and_nothing_leaks() {
    let connector = MemoryConnector::new();
    connector.set_unavailable(true);
    let source = StaticSource::new(vec![record_without_last(1, 0)]);

    let err = replicate(&source, &connector, &ReplicationOptions::default()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Store);
    assert_eq!(connector.open_connections(), 0);
}

#[test]
fn strict_insert_requires_every_canonical_field() {
    let connector = MemoryConnector::new();
    let opts = ReplicationOptions::default();

    let err = insert_record(&record_without_last(7, 2), &connector, &opts).unwrap_err();
    match err {
        PipelineError::MissingFields { fields } => {
            assert_eq!(fields, vec!["KWH_2023_2024", "FCFA_2023_2024"]);
        }
        other => panic!("expected MissingFields, got {other}"),
    }
    assert!(connector.table_schema(TABLE).is_none());

    assert_eq!(insert_record(&record_without_last(7, 0), &connector, &opts).unwrap(), 1);
    let rows = dump_table(&connector, TABLE).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["objectid"], json!("7"));
}

#[test]
fn dump_of_missing_table_is_a_store_error() {
    let connector = MemoryConnector::new();
    let err = dump_table(&connector, "nope").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Store);
}
