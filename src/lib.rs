use thiserror::Error;

pub type Result<T> = std::result::Result<T, ManualError>;

#[derive(Error, Debug)]
pub enum ManualError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index build error: {0}")]
    IndexBuild(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("No document is loaded")]
    NotReady,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod answer;
pub mod chat;
pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod index;
pub mod retrieval;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
