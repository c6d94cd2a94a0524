// Session coordination module
// Per-chat active-document state machine over the shared retrieval pipeline


use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::answer::AnswerComposer;
use crate::documents::DocumentSource;
use crate::embeddings::{ChunkingConfig, chunk_pages};
use crate::index::{DocumentIndex, IndexStore};
use crate::retrieval::{
    DEFAULT_TOP_N, NO_INFORMATION_FOUND, NOT_PRECISE_ENOUGH, Retrieval, format_context, retrieve,
};
use crate::{ManualError, Result};

pub const NOT_READY: &str = "Пожалуйста, сначала загрузите PDF-файл с помощью команды /load_pdf";
pub const AGENTS_RUNNING: &str = "all_running";

const CITATION_PREFIX: &str = "\n\nСтраница: ";
const ERROR_DETAIL_LIMIT: usize = 100;

/// Capabilities and settings shared by every session
pub struct Pipeline {
    source: Arc<dyn DocumentSource>,
    store: IndexStore,
    composer: AnswerComposer,
    chunking: ChunkingConfig,
    chat_model: String,
    offered: Vec<String>,
    /// Per-collection guards: commits take one exclusively, searches shared
    collections: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl Pipeline {
    #[inline]
    pub fn new(
        source: Arc<dyn DocumentSource>,
        store: IndexStore,
        composer: AnswerComposer,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            source,
            store,
            composer,
            chunking,
            chat_model: String::new(),
            offered: Vec::new(),
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Model name reported by `status()`
    #[inline]
    #[must_use]
    pub fn with_chat_model(mut self, chat_model: impl Into<String>) -> Self {
        self.chat_model = chat_model.into();
        self
    }

    /// Restrict the documents offered to chat users
    #[inline]
    #[must_use]
    pub fn with_offered_documents(mut self, documents: Vec<String>) -> Self {
        self.offered = documents;
        self
    }

    /// Documents a user may pick from; everything in the source when no list is configured
    #[inline]
    pub fn offered_documents(&self) -> Result<Vec<String>> {
        if self.offered.is_empty() {
            self.source.list()
        } else {
            Ok(self.offered.clone())
        }
    }

    #[inline]
    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    async fn build(&self, document: &str) -> Result<DocumentIndex> {
        let source = Arc::clone(&self.source);
        let source_id = document.to_string();
        let pages = tokio::task::spawn_blocking(move || source.fetch(&source_id))
            .await
            .map_err(|e| ManualError::Other(anyhow::anyhow!("document read task failed: {}", e)))??;

        let chunks = chunk_pages(&pages, &self.chunking)?;
        debug!(
            "{} produced {} pages and {} chunks",
            document,
            pages.len(),
            chunks.len()
        );

        let prepared = self.store.prepare(document, &chunks).await?;

        let guard = self.collection_guard(prepared.collection_name());
        let _exclusive = guard.write().await;
        self.store.commit(prepared).await
    }

    fn collection_guard(&self, collection: &str) -> Arc<RwLock<()>> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(collections.entry(collection.to_string()).or_default())
    }

    async fn answer(&self, index: &DocumentIndex, query: &str) -> Result<String> {
        let retrieval = {
            let guard = self.collection_guard(&index.collection_name);
            let _shared = guard.read().await;
            retrieve(&self.store, index, query, DEFAULT_TOP_N).await?
        };

        let matches = match retrieval {
            Retrieval::NoInformation => return Ok(NO_INFORMATION_FOUND.to_string()),
            Retrieval::NotPrecise => return Ok(NOT_PRECISE_ENOUGH.to_string()),
            Retrieval::Matches(matches) => matches,
        };

        let context = format_context(&matches);
        let answer = self.composer.compose(query, &context).await?;

        Ok(match matches.first() {
            Some(first) => format!("{}{}{}", answer, CITATION_PREFIX, first.metadata.page),
            None => answer,
        })
    }
}

/// Where a session is in its document lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    /// A load is running; `previous` is restored if it fails
    Loading {
        document: String,
        previous: Option<DocumentIndex>,
    },
    Ready(DocumentIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorDbStatus {
    Active,
    NotInitialized,
}

impl std::fmt::Display for VectorDbStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::NotInitialized => write!(f, "not_initialized"),
        }
    }
}

/// Snapshot reported by [`Session::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub document_loaded: bool,
    pub active_document: Option<String>,
    /// Document currently being loaded, if any
    pub loading: Option<String>,
    pub agents_status: String,
    pub chat_model: String,
    pub vector_db_status: VectorDbStatus,
    pub collection_name: Option<String>,
    pub documents_count: Option<u64>,
}

/// One user's conversation: at most one ready document, operations serialized
pub struct Session {
    pipeline: Arc<Pipeline>,
    operation: AsyncMutex<()>,
    state: RwLock<SessionState>,
}

impl Session {
    #[inline]
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            operation: AsyncMutex::new(()),
            state: RwLock::new(SessionState::Empty),
        }
    }

    #[inline]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    #[inline]
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    #[inline]
    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.read().await, SessionState::Ready(_))
    }

    /// Load a document and describe the outcome for the user
    #[inline]
    pub async fn load(&self, document: &str) -> String {
        match self.try_load(document).await {
            Ok(_) => format!(
                "PDF '{}' успешно загружен!\n\nТеперь можете задавать вопросы по этому руководству.",
                document
            ),
            Err(ManualError::NotFound(_)) => {
                format!("Файл '{}' не найден в папке документов", document)
            }
            Err(e) => format!("Ошибка при загрузке PDF: {}", e),
        }
    }

    /// Chunk and index a document, making it the active one.
    ///
    /// On failure the session keeps whatever it had before.
    #[inline]
    pub async fn try_load(&self, document: &str) -> Result<DocumentIndex> {
        let _operation = self.operation.lock().await;

        let previous = {
            let mut state = self.state.write().await;
            let previous = match &*state {
                SessionState::Ready(index) => Some(index.clone()),
                SessionState::Loading { previous, .. } => previous.clone(),
                SessionState::Empty => None,
            };
            *state = SessionState::Loading {
                document: document.to_string(),
                previous: previous.clone(),
            };
            previous
        };

        info!("Loading document {}", document);
        let result = self.pipeline.build(document).await;

        let mut state = self.state.write().await;
        match result {
            Ok(index) => {
                info!(
                    "Document {} ready with {} records",
                    document, index.record_count
                );
                *state = SessionState::Ready(index.clone());
                Ok(index)
            }
            Err(e) => {
                warn!("Failed to load {}: {}", document, e);
                *state = previous.map_or(SessionState::Empty, SessionState::Ready);
                Err(e)
            }
        }
    }

    /// Answer a question from the active document; never fails
    #[inline]
    pub async fn ask(&self, query: &str) -> String {
        match self.begin_question().await {
            Some(question) => question.answer(query).await,
            None => NOT_READY.to_string(),
        }
    }

    /// Wait for any running operation, then claim the session for one question.
    ///
    /// `None` when no document is ready once the wait is over.
    #[inline]
    pub async fn begin_question(&self) -> Option<ReadyQuestion<'_>> {
        let operation = self.operation.lock().await;

        let SessionState::Ready(index) = self.state().await else {
            return None;
        };

        Some(ReadyQuestion {
            pipeline: self.pipeline.as_ref(),
            index,
            _operation: operation,
        })
    }

    /// Side-effect-free report of the session and its index
    #[inline]
    pub async fn status(&self) -> SystemStatus {
        let state = self.state().await;

        let (active, loading) = match state {
            SessionState::Empty => (None, None),
            SessionState::Loading { document, previous } => (previous, Some(document)),
            SessionState::Ready(index) => (Some(index), None),
        };

        let documents_count = match &active {
            Some(index) => Some(match self.pipeline.store.info(index).await {
                Ok(info) => info.count,
                Err(e) => {
                    warn!("Failed to read index info: {}", e);
                    index.record_count
                }
            }),
            None => None,
        };

        SystemStatus {
            document_loaded: active.is_some(),
            active_document: active.as_ref().map(|index| index.source_id.clone()),
            loading,
            agents_status: AGENTS_RUNNING.to_string(),
            chat_model: self.pipeline.chat_model.clone(),
            vector_db_status: if active.is_some() {
                VectorDbStatus::Active
            } else {
                VectorDbStatus::NotInitialized
            },
            collection_name: active.map(|index| index.collection_name),
            documents_count,
        }
    }
}

/// Exclusive claim on a ready session, held until the answer is produced
pub struct ReadyQuestion<'a> {
    pipeline: &'a Pipeline,
    index: DocumentIndex,
    _operation: AsyncMutexGuard<'a, ()>,
}

impl ReadyQuestion<'_> {
    /// Retrieve, compose and cite; failures become user-facing apologies
    #[inline]
    pub async fn answer(self, query: &str) -> String {
        match self.pipeline.answer(&self.index, query).await {
            Ok(answer) => answer,
            Err(ManualError::Completion(detail)) => {
                warn!("Answer composition failed: {}", detail);
                format!(
                    "Извините, не удалось сформировать ответ: {}",
                    shorten(&detail)
                )
            }
            Err(e) => {
                warn!("Question failed: {}", e);
                format!("Ошибка при обработке вопроса: {}", shorten(&e.to_string()))
            }
        }
    }
}

fn shorten(detail: &str) -> String {
    detail.chars().take(ERROR_DETAIL_LIMIT).collect()
}

/// Independent sessions keyed by chat id, created on first use
pub struct SessionRegistry {
    pipeline: Arc<Pipeline>,
    sessions: Mutex<HashMap<i64, Arc<Session>>>,
}

impl SessionRegistry {
    #[inline]
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// The session for `chat_id`, creating an empty one if needed
    #[inline]
    pub fn session(&self, chat_id: i64) -> Arc<Session> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            sessions
                .entry(chat_id)
                .or_insert_with(|| Arc::new(Session::new(Arc::clone(&self.pipeline)))),
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
