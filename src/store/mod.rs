//! Datastore boundary: `documents` and `chunks` with upsert-by-key semantics.

pub mod memory;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, NewChunk, StoredChunk};

pub use memory::MemoryStore;
pub use rest::RestStore;

#[async_trait]
pub trait LegalStore: Send + Sync {
    /// Create or merge a document row keyed by id.
    async fn upsert_document(&self, document: &Document) -> Result<()>;

    /// Create or merge chunk rows keyed by (document_id, label). Returns the
    /// number of rows written.
    async fn upsert_chunks(&self, chunks: &[NewChunk]) -> Result<usize>;

    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Chunks whose label ends with `label_suffix` (case-insensitive),
    /// optionally restricted to one document. Labels end with the article
    /// number, so "Artikel 1" never pulls in "Artikel 10" or "Artikel 1:2".
    async fn find_chunks_by_label_suffix(
        &self,
        label_suffix: &str,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredChunk>>;

    /// Chunks whose text contains `phrase` (case-insensitive).
    async fn find_chunks_by_text(
        &self,
        phrase: &str,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredChunk>>;

    /// Candidate chunks with embeddings for semantic ranking, at most `limit`
    /// rows ordered by (document_id, label).
    async fn candidate_chunks(
        &self,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredChunk>>;
}
