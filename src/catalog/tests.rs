use super::*;
use std::time::{Duration, UNIX_EPOCH};
use tempfile::TempDir;

fn fingerprint() -> Fingerprint {
    Fingerprint::from_system_time(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
}

const SAMPLE: &str = r#"[
    {
        "name": "USERS",
        "description": "user accounts",
        "columns": [
            {"name": "id", "description": "identifier", "dataTypeDisplay": "BIGINT", "isPrimaryKey": true},
            {"name": "email", "description": "login address"}
        ],
        "fullyQualifiedName": "warehouse.public.users"
    },
    {
        "name": "ORDERS",
        "description": "customer orders"
    }
]"#;

#[test]
fn parse_applies_column_defaults() {
    let snapshot = CatalogSnapshot::parse(Path::new("meta.json"), fingerprint(), SAMPLE)
        .expect("sample should parse");

    assert_eq!(snapshot.len(), 2);
    let users = snapshot.get("USERS").expect("USERS present");
    assert_eq!(users.columns.len(), 2);
    assert_eq!(users.columns[0].data_type, "BIGINT");
    assert!(users.columns[0].is_primary_key);
    assert_eq!(users.columns[1].data_type, UNKNOWN_DATA_TYPE);
    assert!(!users.columns[1].is_primary_key);

    let orders = snapshot.get("ORDERS").expect("ORDERS present");
    assert!(orders.columns.is_empty());
}

#[test]
fn parse_treats_null_optionals_as_defaults() {
    let content = r#"[{"name": "T", "description": "d", "columns": [
        {"name": "c", "description": "x", "dataTypeDisplay": null, "isPrimaryKey": null}
    ]}]"#;
    let snapshot =
        CatalogSnapshot::parse(Path::new("meta.json"), fingerprint(), content).expect("parses");
    let column = &snapshot.get("T").expect("T present").columns[0];
    assert_eq!(column.data_type, UNKNOWN_DATA_TYPE);
    assert!(!column.is_primary_key);
}

#[test]
fn parse_error_reports_position() {
    let result = CatalogSnapshot::parse(Path::new("broken.json"), fingerprint(), "[\n  {\"name\": ");

    match result {
        Err(CatalogError::Parse {
            path, line, column, ..
        }) => {
            assert_eq!(path, PathBuf::from("broken.json"));
            assert_eq!(line, Some(2));
            assert!(column.is_some());
        }
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn missing_description_is_a_parse_error() {
    let result = CatalogSnapshot::parse(Path::new("m.json"), fingerprint(), r#"[{"name": "T"}]"#);
    assert!(matches!(result, Err(CatalogError::Parse { .. })));
}

#[test]
fn duplicate_names_resolve_to_last_entry() {
    let content = r#"[
        {"name": "T", "description": "first"},
        {"name": "T", "description": "second"}
    ]"#;
    let snapshot =
        CatalogSnapshot::parse(Path::new("m.json"), fingerprint(), content).expect("parses");

    assert_eq!(snapshot.entries().len(), 2);
    assert_eq!(snapshot.get("T").map(|e| e.description.as_str()), Some("second"));
}

#[test]
fn document_text_layout() {
    let entry = CatalogEntry {
        name: "USERS".to_string(),
        description: "user accounts".to_string(),
        columns: vec![
            ColumnEntry {
                name: "id".to_string(),
                description: "identifier".to_string(),
                data_type: "BIGINT".to_string(),
                is_primary_key: true,
            },
            ColumnEntry {
                name: "email".to_string(),
                description: "login address".to_string(),
                data_type: UNKNOWN_DATA_TYPE.to_string(),
                is_primary_key: false,
            },
        ],
    };

    assert_eq!(
        entry.document_text(),
        "테이블명: USERS\n테이블 설명: user accounts\n포함된 컬럼 정보:\n- 컬럼 'id': identifier\n- 컬럼 'email': login address"
    );
}

#[test]
fn document_text_without_columns_ends_with_header() {
    let entry = CatalogEntry {
        name: "EMPTY".to_string(),
        description: "nothing".to_string(),
        columns: vec![],
    };
    assert!(entry.document_text().ends_with("포함된 컬럼 정보:\n"));
}

#[tokio::test]
async fn load_missing_file_is_not_found() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("absent.json");

    let result = CatalogSnapshot::load(&path, fingerprint()).await;
    assert!(matches!(result, Err(CatalogError::NotFound { .. })));

    let result = Fingerprint::read(&path).await;
    assert!(matches!(result, Err(CatalogError::NotFound { .. })));
}

#[tokio::test]
async fn load_non_utf8_file_is_parse_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("binary.json");
    std::fs::write(&path, b"\xff\xfe[]").expect("should write file");

    let error = CatalogSnapshot::load(&path, fingerprint())
        .await
        .expect_err("invalid UTF-8 should not load");

    assert_eq!(error.kind(), crate::ErrorKind::ParseError);
    match error {
        CatalogError::Parse { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[tokio::test]
async fn fingerprint_tracks_modification_time() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("meta.json");
    std::fs::write(&path, SAMPLE).expect("should write metadata");

    let before = Fingerprint::read(&path).await.expect("fingerprint readable");

    let file = std::fs::File::options()
        .write(true)
        .open(&path)
        .expect("should open metadata");
    file.set_modified(SystemTime::now() + Duration::from_secs(10))
        .expect("should bump mtime");

    let after = Fingerprint::read(&path).await.expect("fingerprint readable");
    assert!(after > before);
}

#[test]
fn fingerprint_serializes_with_full_precision() {
    let original =
        Fingerprint::from_system_time(UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789));
    let json = serde_json::to_string(&original).expect("serializes");
    let parsed: Fingerprint = serde_json::from_str(&json).expect("parses");
    assert_eq!(original, parsed);
}
