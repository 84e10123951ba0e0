use subscriber_etl::schema::SchemaReconciler;
use subscriber_etl::store::{Connector, MemoryConnector, Store};
use subscriber_etl::types::{ColumnDef, ColumnType};
use subscriber_etl::StoreError;

fn names(connector: &MemoryConnector, table: &str) -> Vec<String> {
    connector
        .table_schema(table)
        .map(|s| s.column_names().map(str::to_string).collect())
        .unwrap_or_default()
}

#[test]
fn missing_table_is_created_with_exactly_the_dataset_columns() {
    let connector = MemoryConnector::new();
    let mut store = connector.connect().unwrap();

    let summary = SchemaReconciler::new("abonnes")
        .reconcile_names(&mut store, ["objectid", "section", "nom"])
        .unwrap();

    assert!(summary.table_created);
    assert!(summary.columns_added.is_empty());
    assert_eq!(names(&connector, "abonnes"), vec!["objectid", "section", "nom"]);
    let schema = connector.table_schema("abonnes").unwrap();
    assert!(schema.columns.iter().all(|c| c.column_type == ColumnType::Text));
}

#[test]
fn reconciliation_is_idempotent() {
    let connector = MemoryConnector::new();
    let mut store = connector.connect().unwrap();
    let reconciler = SchemaReconciler::new("abonnes");

    reconciler.reconcile_names(&mut store, ["a", "b"]).unwrap();
    let again = reconciler.reconcile_names(&mut store, ["a", "b"]).unwrap();
    let subset = reconciler.reconcile_names(&mut store, ["b"]).unwrap();

    assert!(again.is_noop());
    assert!(subset.is_noop());
    assert_eq!(names(&connector, "abonnes"), vec!["a", "b"]);
}

#[test]
fn only_missing_columns_are_added_and_existing_ones_untouched() {
    let connector = MemoryConnector::new();
    let mut store = connector.connect().unwrap();
    store
        .create_table("abonnes", &[ColumnDef::text("objectid").primary_key(), ColumnDef::point("geom", 4326)])
        .unwrap();

    let summary = SchemaReconciler::new("abonnes")
        .reconcile_names(&mut store, ["objectid", "nom", "geom"])
        .unwrap();

    assert_eq!(summary.columns_added, vec!["nom"]);
    let schema = connector.table_schema("abonnes").unwrap();
    assert!(schema.column("objectid").unwrap().primary_key);
    assert_eq!(schema.column("geom").unwrap().column_type, ColumnType::Point { srid: 4326 });
}

#[test]
fn invalid_identifier_aborts_and_keeps_earlier_changes() {
    let connector = MemoryConnector::new();
    let mut store = connector.connect().unwrap();
    let reconciler = SchemaReconciler::new("abonnes");
    reconciler.reconcile_names(&mut store, ["a"]).unwrap();

    let err = reconciler.reconcile_names(&mut store, ["b", ""]).unwrap_err();
    assert!(matches!(err, StoreError::InvalidIdentifier { .. }));
    assert_eq!(names(&connector, "abonnes"), vec!["a", "b"]);

    // The schema lock was released despite the failure.
    reconciler.reconcile_names(&mut store, ["c"]).unwrap();
    assert_eq!(names(&connector, "abonnes"), vec!["a", "b", "c"]);
}

#[test]
fn racing_runs_converge_on_the_same_columns() {
    let connector = MemoryConnector::new();
    let mut first = connector.connect().unwrap();
    let mut second = connector.connect().unwrap();

    SchemaReconciler::new("abonnes")
        .reconcile_names(&mut first, ["a", "b"])
        .unwrap();
    let summary = SchemaReconciler::new("abonnes")
        .reconcile_names(&mut second, ["a", "b", "c"])
        .unwrap();

    assert!(!summary.table_created);
    assert_eq!(summary.columns_added, vec!["c"]);
    // Adding an already present column is a no-op rather than an error.
    second.add_column("abonnes", &ColumnDef::text("c")).unwrap();
    assert_eq!(names(&connector, "abonnes"), vec!["a", "b", "c"]);
}
