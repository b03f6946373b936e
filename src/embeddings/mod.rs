// Embedding gateway
// Turns catalog documents and search queries into vectors

pub mod ollama;

pub use ollama::OllamaClient;

use anyhow::Result;

/// Opaque text to vector service.
///
/// Implementations block the calling thread; async callers go through
/// `tokio::task::spawn_blocking`. Every vector returned by one gateway must have the same length.
pub trait EmbeddingGateway: Send + Sync {
    /// Embed catalog documents, returning one vector per input in input order
    fn embed_documents(&self, documents: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query
    fn embed_query(&self, query: &str) -> Result<Vec<f32>>;
}
