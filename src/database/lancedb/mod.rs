// LanceDB vector database module
// Handles per-document vector tables and cosine similarity search

pub mod vector_store;

pub use vector_store::VectorStore;
