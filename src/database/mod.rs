// Database module
// Vector storage for indexed chunks, one collection per source document

pub mod lancedb;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use self::lancedb::VectorStore;

/// Provenance stored alongside each embedded chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Name of the source document
    pub source: String,
    /// Page the chunk was cut from
    pub page: u32,
    /// Short 8-hex-digit identifier of the chunk
    pub chunk_id: String,
}

/// One embedded chunk as stored in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// UUID of the record
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: RecordMetadata,
}

/// A stored chunk returned by a nearest-neighbour query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub text: String,
    pub metadata: RecordMetadata,
    /// Cosine distance to the query vector
    pub distance: f32,
}

/// Namespaced vector storage with cosine nearest-neighbour search
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Whether a collection with this name currently exists
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Remove every record of a collection; a missing collection is not an error
    async fn reset_collection(&self, collection: &str) -> Result<()>;

    /// Insert records, creating the collection on first use
    async fn upsert(&self, collection: &str, records: Vec<IndexedRecord>) -> Result<()>;

    /// Up to `limit` records ordered by ascending cosine distance, none for a missing collection
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Number of records in a collection, 0 when it does not exist
    async fn count(&self, collection: &str) -> Result<u64>;
}
