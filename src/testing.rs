// Deterministic capability doubles shared by unit tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::answer::Completer;
use crate::database::{IndexedRecord, ScoredRecord, VectorBackend};
use crate::embeddings::Embedder;
use crate::{ManualError, Result};

/// Stems the keyword embedder projects texts onto
pub(crate) const KEYWORDS: [&str; 6] = ["масл", "тормоз", "шин", "фар", "аккумулятор", "ремн"];

/// Embeds a text as a bias component plus one count per keyword stem.
///
/// Texts sharing a single stem score close to 1, texts sharing none close to 0.
#[derive(Debug, Default)]
pub(crate) struct KeywordEmbedder {
    calls: Mutex<Vec<usize>>,
    /// Applied to calls with more than one text, so document builds are slow and queries are not
    batch_delay: Duration,
}

impl KeywordEmbedder {
    pub(crate) fn with_batch_delay(batch_delay: Duration) -> Self {
        Self {
            calls: Mutex::default(),
            batch_delay,
        }
    }

    pub(crate) fn vector_for(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let mut vector = vec![0.1];
        vector.extend(
            KEYWORDS
                .iter()
                .map(|stem| lowered.matches(stem).count() as f32),
        );
        vector
    }

    /// Batch sizes of every embed call so far
    pub(crate) fn calls(&self) -> Vec<usize> {
        self.calls.lock().expect("lock should not be poisoned").clone()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls
            .lock()
            .expect("lock should not be poisoned")
            .push(texts.len());
        if texts.len() > 1 && !self.batch_delay.is_zero() {
            tokio::time::sleep(self.batch_delay).await;
        }
        Ok(texts.iter().map(|text| Self::vector_for(text)).collect())
    }
}

/// Always fails like an unreachable embedding server
pub(crate) struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(ManualError::Embedding("connection refused".to_string()))
    }
}

/// Returns one vector fewer than requested
pub(crate) struct ShortEmbedder;

#[async_trait]
impl Embedder for ShortEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Replies with a fixed answer and records every prompt pair it receives
#[derive(Debug)]
pub(crate) struct ScriptedCompleter {
    reply: String,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedCompleter {
    pub(crate) fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<(String, String)> {
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .clone()
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .push((system_prompt.to_string(), user_prompt.to_string()));
        Ok(self.reply.clone())
    }
}

pub(crate) struct FailingCompleter;

#[async_trait]
impl Completer for FailingCompleter {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        Err(ManualError::Completion("model crashed".to_string()))
    }
}

/// Brute-force cosine store kept in memory
#[derive(Debug, Default)]
pub(crate) struct MemoryBackend {
    collections: Mutex<Vec<(String, Vec<IndexedRecord>)>>,
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

impl MemoryBackend {
    pub(crate) fn collection_names(&self) -> Vec<String> {
        self.collections
            .lock()
            .expect("lock should not be poisoned")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collection_names().iter().any(|name| name == collection))
    }

    async fn reset_collection(&self, collection: &str) -> Result<()> {
        self.collections
            .lock()
            .expect("lock should not be poisoned")
            .retain(|(name, _)| name != collection);
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: Vec<IndexedRecord>) -> Result<()> {
        let mut collections = self.collections.lock().expect("lock should not be poisoned");
        match collections.iter_mut().find(|(name, _)| name == collection) {
            Some((_, stored)) => stored.extend(records),
            None => collections.push((collection.to_string(), records)),
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.lock().expect("lock should not be poisoned");
        let Some((_, stored)) = collections.iter().find(|(name, _)| name == collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredRecord> = stored
            .iter()
            .map(|record| ScoredRecord {
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance: cosine_distance(&record.embedding, vector),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        Ok(self
            .collections
            .lock()
            .expect("lock should not be poisoned")
            .iter()
            .find(|(name, _)| name == collection)
            .map_or(0, |(_, stored)| stored.len() as u64))
    }
}

/// Backend whose writes always fail
pub(crate) struct ReadOnlyBackend;

#[async_trait]
impl VectorBackend for ReadOnlyBackend {
    async fn collection_exists(&self, _collection: &str) -> Result<bool> {
        Ok(false)
    }

    async fn reset_collection(&self, _collection: &str) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _collection: &str, _records: Vec<IndexedRecord>) -> Result<()> {
        Err(ManualError::Database("disk is read-only".to_string()))
    }

    async fn query(
        &self,
        _collection: &str,
        _vector: &[f32],
        _limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        Ok(Vec::new())
    }

    async fn count(&self, _collection: &str) -> Result<u64> {
        Ok(0)
    }
}

/// Backend that answers every query with fixed distances, in the given order
pub(crate) struct FixedDistanceBackend {
    distances: Vec<f32>,
}

impl FixedDistanceBackend {
    pub(crate) fn with_scores(scores: &[f32]) -> Self {
        Self {
            distances: scores.iter().map(|score| 1.0 - score).collect(),
        }
    }
}

#[async_trait]
impl VectorBackend for FixedDistanceBackend {
    async fn collection_exists(&self, _collection: &str) -> Result<bool> {
        Ok(!self.distances.is_empty())
    }

    async fn reset_collection(&self, _collection: &str) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _collection: &str, _records: Vec<IndexedRecord>) -> Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        _collection: &str,
        _vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        Ok(self
            .distances
            .iter()
            .zip(1_u32..)
            .take(limit)
            .map(|(distance, page)| ScoredRecord {
                text: format!("Фрагмент со страницы {}", page),
                metadata: crate::database::RecordMetadata {
                    source: "Lada_Vesta.pdf".to_string(),
                    page,
                    chunk_id: format!("{:08x}", page),
                },
                distance: *distance,
            })
            .collect())
    }

    async fn count(&self, _collection: &str) -> Result<u64> {
        Ok(self.distances.len() as u64)
    }
}
