// Document index module
// One isolated vector collection per source document


use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{IndexedRecord, RecordMetadata, VectorBackend};
use crate::embeddings::{Chunk, Embedder};
use crate::{ManualError, Result};

const COLLECTION_PREFIX: &str = "pdf_";

/// Handle to a built collection; replaced wholesale on every load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentIndex {
    pub collection_name: String,
    pub source_id: String,
    pub record_count: u64,
}

/// Read-only introspection of a document index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub source_id: String,
    pub count: u64,
}

/// Embedded records waiting to replace a collection
#[derive(Debug, Clone)]
pub struct PreparedIndex {
    collection_name: String,
    source_id: String,
    records: Vec<IndexedRecord>,
}

impl PreparedIndex {
    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub text: String,
    pub metadata: RecordMetadata,
    /// Cosine similarity, `1 - distance`
    pub score: f32,
}

/// Deterministic collection name for a source document.
///
/// The readable part is lowercased with every non-alphanumeric run folded to `_`;
/// a name-based UUID suffix keeps ids that normalize alike apart.
#[inline]
pub fn collection_name_for(source_id: &str) -> String {
    let stem = source_id
        .strip_suffix(".pdf")
        .or_else(|| source_id.strip_suffix(".PDF"))
        .unwrap_or(source_id);

    let mut readable = String::with_capacity(stem.len());
    for ch in stem.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            readable.push(ch);
        } else if !readable.ends_with('_') {
            readable.push('_');
        }
    }
    let readable = readable.trim_matches('_');

    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, source_id.as_bytes()).simple().to_string();
    let suffix: String = digest.chars().take(8).collect();

    if readable.is_empty() {
        format!("{}{}", COLLECTION_PREFIX, suffix)
    } else {
        format!("{}{}_{}", COLLECTION_PREFIX, readable, suffix)
    }
}

fn short_chunk_id() -> String {
    Uuid::new_v4().simple().to_string().chars().take(8).collect()
}

/// Builds and queries per-document collections through the embedding and vector capabilities
#[derive(Clone)]
pub struct IndexStore {
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn VectorBackend>,
}

impl IndexStore {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, backend: Arc<dyn VectorBackend>) -> Self {
        Self { embedder, backend }
    }

    /// Embed every chunk in one call and replace the document's collection with them
    #[inline]
    pub async fn build(&self, source_id: &str, chunks: &[Chunk]) -> Result<DocumentIndex> {
        let prepared = self.prepare(source_id, chunks).await?;
        self.commit(prepared).await
    }

    /// Embed every chunk in one call without touching storage
    #[inline]
    pub async fn prepare(&self, source_id: &str, chunks: &[Chunk]) -> Result<PreparedIndex> {
        let collection_name = collection_name_for(source_id);

        if chunks.is_empty() {
            return Err(ManualError::IndexBuild(format!(
                "document {} contains no extractable text",
                source_id
            )));
        }

        info!(
            "Building index {} from {} chunks of {}",
            collection_name,
            chunks.len(),
            source_id
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await.map_err(|e| match e {
            ManualError::Embedding(_) => e,
            other => ManualError::Embedding(other.to_string()),
        })?;

        if embeddings.len() != chunks.len() {
            return Err(ManualError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let records: Vec<IndexedRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedRecord {
                id: Uuid::new_v4().to_string(),
                embedding,
                text: chunk.text.clone(),
                metadata: RecordMetadata {
                    source: chunk.source_id.clone(),
                    page: chunk.page_number,
                    chunk_id: short_chunk_id(),
                },
            })
            .collect();

        Ok(PreparedIndex {
            collection_name,
            source_id: source_id.to_string(),
            records,
        })
    }

    /// Replace the collection's contents with prepared records
    #[inline]
    pub async fn commit(&self, prepared: PreparedIndex) -> Result<DocumentIndex> {
        let PreparedIndex {
            collection_name,
            source_id,
            records,
        } = prepared;

        self.backend
            .reset_collection(&collection_name)
            .await
            .map_err(|e| ManualError::IndexBuild(e.to_string()))?;
        self.backend
            .upsert(&collection_name, records)
            .await
            .map_err(|e| ManualError::IndexBuild(e.to_string()))?;

        let record_count = self
            .backend
            .count(&collection_name)
            .await
            .map_err(|e| ManualError::IndexBuild(e.to_string()))?;

        info!("Index {} holds {} records", collection_name, record_count);

        Ok(DocumentIndex {
            collection_name,
            source_id,
            record_count,
        })
    }

    /// Up to `k` matches in descending score order; empty when the collection has no content
    #[inline]
    pub async fn search(&self, index: &DocumentIndex, query: &str, k: usize) -> Result<Vec<SearchMatch>> {
        if k == 0 || self.backend.count(&index.collection_name).await? == 0 {
            debug!("Index {} is empty", index.collection_name);
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ManualError::Embedding("no embedding returned for query".to_string()))?;

        let records = self
            .backend
            .query(&index.collection_name, &query_vector, k)
            .await?;

        let mut matches: Vec<SearchMatch> = records
            .into_iter()
            .map(|record| SearchMatch {
                text: record.text,
                metadata: record.metadata,
                score: 1.0 - record.distance,
            })
            .collect();

        // Stable, so equal scores keep the backend's order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(k);

        if let Some(best) = matches.first() {
            debug!(
                "Best match in {} scored {:.3} on page {}",
                index.collection_name, best.score, best.metadata.page
            );
        } else {
            warn!("Search in {} returned no records", index.collection_name);
        }

        Ok(matches)
    }

    /// Current name, source and record count of an index
    #[inline]
    pub async fn info(&self, index: &DocumentIndex) -> Result<IndexInfo> {
        let count = self.backend.count(&index.collection_name).await?;
        Ok(IndexInfo {
            name: index.collection_name.clone(),
            source_id: index.source_id.clone(),
            count,
        })
    }
}
