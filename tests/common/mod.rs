//! Helpers shared by the integration tests

#![allow(dead_code, reason = "each test binary uses a different subset")]

use catalog_search::config::{CatalogConfig, Config, LinksConfig};
use catalog_search::embeddings::EmbeddingGateway;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const KEYWORDS: [&str; 5] = ["user", "order", "product", "payment", "review"];

/// Deterministic stand-in for Ollama: one dimension per keyword plus one for everything else
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    pub document_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = KEYWORDS
            .iter()
            .map(|keyword| lower.matches(keyword).count() as f32)
            .collect();
        let misc = if vector.iter().all(|&v| v == 0.0) { 1.0 } else { 0.0 };
        vector.push(misc);
        vector
    }
}

impl EmbeddingGateway for KeywordEmbedder {
    fn embed_documents(&self, documents: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        Ok(documents.iter().map(|d| Self::vector(d)).collect())
    }

    fn embed_query(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(query))
    }
}

pub fn gateway(embedder: &Arc<KeywordEmbedder>) -> Arc<dyn EmbeddingGateway> {
    Arc::<KeywordEmbedder>::clone(embedder)
}

pub const SHOP_CATALOG: &str = r#"[
    {
        "name": "USERS",
        "description": "registered user accounts",
        "columns": [
            {"name": "user_id", "description": "user key", "dataTypeDisplay": "BIGINT", "isPrimaryKey": true},
            {"name": "email", "description": "contact address", "dataTypeDisplay": "VARCHAR"}
        ]
    },
    {
        "name": "ORDERS",
        "description": "customer orders",
        "columns": [
            {"name": "order_id", "description": "order key", "dataTypeDisplay": "BIGINT", "isPrimaryKey": true}
        ]
    },
    {
        "name": "PRODUCTS",
        "description": "product catalogue",
        "columns": [
            {"name": "sku", "description": "product code", "dataTypeDisplay": "VARCHAR"}
        ]
    }
]"#;

pub const REVIEWS_CATALOG: &str = r#"[
    {
        "name": "USERS",
        "description": "registered user accounts",
        "columns": []
    },
    {
        "name": "REVIEWS",
        "description": "product review scores",
        "columns": [
            {"name": "rating", "description": "review rating", "dataTypeDisplay": "INT"}
        ]
    }
]"#;

/// Write `content` to `path` and push its modification time `seconds_ahead` into the future
pub fn write_catalog(path: &Path, content: &str, seconds_ahead: u64) {
    fs::write(path, content).expect("should write catalog");
    let mtime = SystemTime::now() + Duration::from_secs(seconds_ahead);
    fs::File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(mtime))
        .expect("should set modification time");
}

/// Configuration rooted in `dir` with a link file that pins the base URL
pub fn config_in(dir: &TempDir) -> Config {
    let link_file = dir.path().join("catalog.env");
    fs::write(&link_file, "OPENMETADATA_BASE_URL=http://catalog.test:8585/\n")
        .expect("should write link config");

    Config {
        catalog: CatalogConfig {
            metadata_path: dir.path().join("metadata.json"),
            ..CatalogConfig::default()
        },
        links: LinksConfig {
            config_file: Some(link_file),
            ..LinksConfig::default()
        },
        base_dir: dir.path().to_path_buf(),
        ..Config::default()
    }
}
