
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::documents::RawPage;
use crate::{ManualError, Result};

/// A word window cut from a single page, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Words of the window joined by single spaces, never empty
    pub text: String,
    /// Page the window was cut from
    pub page_number: u32,
    pub source_id: String,
}

/// Configuration for word-window chunking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in words
    pub chunk_size: usize,
    /// Words shared by consecutive windows of the same page
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// The stride must be positive or windowing never terminates
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ManualError::InvalidConfig(
                "chunk size must be greater than 0".to_string(),
            ));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ManualError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        Ok(())
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// Split pages into overlapping word windows, keeping page provenance.
///
/// Pages without any non-whitespace text produce no chunks. A page of at most
/// `chunk_size` words yields exactly one chunk; longer pages yield windows that
/// start `stride` words apart, the last one ending at the page's final word.
#[inline]
pub fn chunk_pages(pages: &[RawPage], config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    let mut chunks = Vec::new();
    for page in pages {
        let words: Vec<&str> = page.text.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        let mut start = 0;
        loop {
            let end = (start + config.chunk_size).min(words.len());
            chunks.push(Chunk {
                text: words[start..end].join(" "),
                page_number: page.page_number,
                source_id: page.source_id.clone(),
            });

            if end == words.len() {
                break;
            }
            start += config.stride();
        }
    }

    debug!(
        "Chunked {} pages into {} chunks (size {}, overlap {})",
        pages.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    Ok(chunks)
}
