use super::*;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn manifest(source: &str, secs: u64) -> IndexManifest {
    IndexManifest {
        source_path: PathBuf::from(source),
        fingerprint: Fingerprint::from_system_time(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)),
        table_name: Some("catalog_abc".to_string()),
        document_count: 2,
        dimension: 5,
        built_at: Utc::now(),
    }
}

#[tokio::test]
async fn missing_manifest_reads_as_none() {
    let dir = TempDir::new().expect("should create temp dir");
    assert!(!IndexManifest::exists_in(dir.path()).await);
    let read = IndexManifest::read(dir.path()).await.expect("missing is not an error");
    assert!(read.is_none());
}

#[tokio::test]
async fn write_then_read() {
    let dir = TempDir::new().expect("should create temp dir");
    let storage = dir.path().join("nested").join("store");
    let original = manifest("/data/meta.json", 100);

    original.write(&storage).await.expect("should write manifest");
    assert!(IndexManifest::exists_in(&storage).await);
    assert!(!storage.join(MANIFEST_TMP_FILE).exists());

    let read = IndexManifest::read(&storage)
        .await
        .expect("should read manifest")
        .expect("manifest should exist");
    assert_eq!(read, original);
}

#[tokio::test]
async fn corrupt_manifest_is_an_index_error() {
    let dir = TempDir::new().expect("should create temp dir");
    std::fs::write(IndexManifest::path_in(dir.path()), "{ not json").expect("should write");

    let err = IndexManifest::read(dir.path())
        .await
        .expect_err("corrupt manifest should fail");
    assert!(matches!(err, CatalogError::Index(_)));
}

#[test]
fn covers_same_source_at_or_before_fingerprint() {
    let recorded = manifest("/data/meta.json", 100);
    let at = |secs| Fingerprint::from_system_time(SystemTime::UNIX_EPOCH + Duration::from_secs(secs));

    assert!(recorded.covers(Path::new("/data/meta.json"), at(100)));
    assert!(recorded.covers(Path::new("/data/meta.json"), at(50)));
    assert!(!recorded.covers(Path::new("/data/meta.json"), at(101)));
    assert!(!recorded.covers(Path::new("/data/other.json"), at(100)));
}
