#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

mod common;

use catalog_search::config::OllamaConfig;
use catalog_search::embeddings::{EmbeddingGateway, OllamaClient};
use catalog_search::lifecycle::RefreshStatus;
use catalog_search::service::{CatalogService, ResponseStatus};
use common::{SHOP_CATALOG, config_in, write_catalog};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

fn ollama_config() -> OllamaConfig {
    let defaults = OllamaConfig::default();
    OllamaConfig {
        host: env::var("OLLAMA_HOST").unwrap_or(defaults.host),
        port: env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port),
        model: env::var("OLLAMA_MODEL").unwrap_or(defaults.model),
        batch_size: 4,
        ..OllamaConfig::default()
    }
}

fn create_integration_test_client() -> OllamaClient {
    OllamaClient::new(&ollama_config())
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[test]
#[ignore = "requires a running Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();
    let client = create_integration_test_client();

    let result = client.health_check();
    assert!(result.is_ok(), "Health check should succeed: {:?}", result);
}

#[test]
#[ignore = "requires a running Ollama instance"]
fn real_ollama_embeddings_share_a_dimension() {
    init_test_tracing();
    let client = create_integration_test_client();

    let documents: Vec<String> = [
        "테이블명: USERS\n테이블 설명: 회원 정보",
        "테이블명: ORDERS\n테이블 설명: 주문 내역",
        "테이블명: PRODUCTS\n테이블 설명: 상품 목록",
        "테이블명: PAYMENTS\n테이블 설명: 결제 기록",
        "테이블명: REVIEWS\n테이블 설명: 상품 후기",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    let vectors = client
        .embed_documents(&documents)
        .expect("documents should embed");
    assert_eq!(vectors.len(), documents.len());

    let query = client.embed_query("회원 목록").expect("query should embed");
    info!("Embedding dimension: {}", query.len());
    assert!(!query.is_empty());
    assert!(vectors.iter().all(|v| v.len() == query.len()));
}

#[tokio::test]
#[ignore = "requires a running Ollama instance"]
async fn real_ollama_end_to_end_search() {
    init_test_tracing();
    let dir = TempDir::new().expect("should create temp dir");
    let mut config = config_in(&dir);
    config.ollama = ollama_config();
    write_catalog(&config.catalog.metadata_path, SHOP_CATALOG, 0);

    let service = CatalogService::start_with(&config, Arc::new(create_integration_test_client()))
        .await
        .expect("service should start against Ollama");

    let response = service.search("ORDERS").await;
    assert_eq!(response.status, ResponseStatus::Success);
    let results = response.results.expect("success carries results");
    assert_eq!(results[0].table_name, "ORDERS");
    assert_eq!(results[0].similarity_score, 0.0);

    let outcome = service.refresh(None).await.expect("refresh should succeed");
    assert_eq!(outcome.status, RefreshStatus::Skipped);

    service.shutdown().await;
}
