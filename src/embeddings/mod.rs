// Embeddings module
// Word-window chunking and the embedding capability used by the document index

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{Chunk, ChunkingConfig, chunk_pages};
pub use ollama::OllamaClient;

/// Turns texts into vectors of a fixed dimension.
///
/// Index builds and queries must go through the same embedder, otherwise
/// similarity scores are meaningless.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text, returning one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
