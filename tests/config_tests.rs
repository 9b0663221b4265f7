// Configuration Tests
// Test query file loading and settings files, read from real temp files

use index_perf::config::{load_test_queries, HarnessConfig};
use index_perf::{ConfigError, IndexHint, OutputFormat};
use mongodb::bson::{doc, Bson};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_full_entry() {
    let file = write_temp(
        r#"[
            {
                "name": "recent orders",
                "query": {
                    "filter": {"status": "A", "qty": {"$gt": 10}},
                    "project": {"_id": 0, "qty": 1},
                    "sort": {"created_at": -1},
                    "skip": 5,
                    "limit": 20
                },
                "hints": [{"status": 1, "created_at": -1}, {}],
                "database": "shop",
                "collection": "orders"
            }
        ]"#,
    );

    let queries = load_test_queries(file.path()).unwrap();
    assert_eq!(queries.len(), 1);

    let entry = &queries[0];
    assert_eq!(entry.name, "recent orders");
    assert_eq!(entry.namespace().to_string(), "shop.orders");
    assert_eq!(
        entry.query.filter,
        doc! { "status": "A", "qty": { "$gt": 10 } }
    );
    assert_eq!(entry.query.project, Some(doc! { "_id": 0, "qty": 1 }));
    assert_eq!(entry.query.sort, Some(doc! { "created_at": -1 }));
    assert_eq!(entry.query.skip, Some(5));
    assert_eq!(entry.query.limit, Some(20));

    assert_eq!(entry.hints.len(), 2);
    assert_eq!(
        entry.hints[0].to_document(),
        doc! { "status": 1, "created_at": -1 }
    );
    assert_eq!(entry.hints[1], IndexHint::none());
}

#[test]
fn test_missing_database_is_rejected() {
    let file = write_temp(r#"[{"name": "q", "query": {"filter": {}}, "collection": "orders"}]"#);

    let err = load_test_queries(file.path()).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingField {
            field: "database",
            ..
        }
    ));
}

#[test]
fn test_empty_collection_is_rejected() {
    let file = write_temp(
        r#"[{"name": "q", "query": {"filter": {}}, "database": "shop", "collection": ""}]"#,
    );

    let err = load_test_queries(file.path()).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingField {
            field: "collection",
            ..
        }
    ));
}

#[test]
fn test_missing_filter_is_rejected() {
    let file = write_temp(
        r#"[{"name": "q", "query": {"limit": 3}, "database": "shop", "collection": "orders"}]"#,
    );
    assert!(load_test_queries(file.path()).is_err());
}

#[test]
fn test_invalid_hint_direction_is_rejected() {
    let file = write_temp(
        r#"[{"query": {"filter": {}}, "hints": [{"loc": "2dsphere"}],
             "database": "shop", "collection": "orders"}]"#,
    );

    let err = load_test_queries(file.path()).unwrap_err();
    assert!(err.to_string().contains("hint.loc"), "error was {err}");
}

#[test]
fn test_malformed_object_id_is_rejected() {
    let file = write_temp(
        r#"[{"query": {"filter": {"_id": "ObjectId(\"xyz\")"}},
             "database": "shop", "collection": "orders"}]"#,
    );
    assert!(matches!(
        load_test_queries(file.path()),
        Err(ConfigError::InvalidInput { .. })
    ));
}

#[test]
fn test_object_id_literals_in_nested_arrays() {
    let file = write_temp(
        r#"[{"query": {"filter": {"_id": {"$in": [
                "ObjectId('5f1d7f3e9d3b2c1a2b3c4d5e')",
                "ObjectId(\"5f1d7f3e9d3b2c1a2b3c4d5f\")"
             ]}}},
             "database": "shop", "collection": "orders"}]"#,
    );

    let queries = load_test_queries(file.path()).unwrap();
    let ids = queries[0]
        .query
        .filter
        .get_document("_id")
        .unwrap()
        .get_array("$in")
        .unwrap();
    assert!(ids.iter().all(|id| matches!(id, Bson::ObjectId(_))));
}

#[test]
fn test_malformed_json_and_missing_file() {
    let file = write_temp("[{not json");
    assert!(matches!(
        load_test_queries(file.path()),
        Err(ConfigError::Parse { .. })
    ));

    let missing = PathBuf::from("/definitely/not/here/queries.json");
    assert!(matches!(
        load_test_queries(&missing),
        Err(ConfigError::Read { .. })
    ));
}

#[test]
fn test_top_level_must_be_array() {
    let file = write_temp(r#"{"query": {"filter": {}}, "database": "shop", "collection": "o"}"#);
    assert!(load_test_queries(file.path()).is_err());
}

#[test]
fn test_settings_file_round_trip() {
    let file = write_temp(
        r#"
        [connection]
        uri = "mongodb://replica:27017/?replicaSet=rs0"
        max_retries = 5
        retry_delay_base = 1.5
        server_selection_timeout = "10s"

        [trial]
        iterations = 250
        warmup_iterations = 0
        sample_interval = 10

        [output]
        format = "json"
        directory = "results"
        "#,
    );

    let config = HarnessConfig::from_file(file.path()).unwrap();
    assert_eq!(config.connection.uri, "mongodb://replica:27017/?replicaSet=rs0");
    assert_eq!(config.connection.server_selection_timeout, Duration::from_secs(10));
    assert_eq!(config.retry_policy().max_retries, 5);
    assert_eq!(config.retry_policy().retry_delay_base, 1.5);

    let trial = config.trial_settings();
    assert_eq!(trial.iterations, 250);
    assert_eq!(trial.warmup_iterations, 0);
    assert_eq!(trial.sample_interval, 10);

    assert_eq!(config.output.format, OutputFormat::Json);
    assert_eq!(config.output.directory, PathBuf::from("results"));
}

#[test]
fn test_bad_settings_file_is_a_settings_error() {
    let file = write_temp("[trial]\niterations = \"many\"\n");
    assert!(matches!(
        HarnessConfig::from_file(file.path()),
        Err(ConfigError::Settings { .. })
    ));
}
