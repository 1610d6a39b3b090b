use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::{Document, NewChunk, StoredChunk};
use crate::store::LegalStore;

/// Process-local store. Used for local runs (`STORE_BACKEND=memory`) and tests.
/// Rows keep insertion order; upserts replace in place.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<Vec<Document>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Rows in insertion order, filtered on document and `keep`.
    fn matching(
        &self,
        document_id: Option<&str>,
        limit: usize,
        keep: impl Fn(&StoredChunk) -> bool,
    ) -> Vec<StoredChunk> {
        self.chunks
            .read()
            .iter()
            .filter(|c| document_id.map_or(true, |id| c.document_id == id))
            .filter(|c| keep(*c))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LegalStore for MemoryStore {
    async fn upsert_document(&self, document: &Document) -> Result<()> {
        let mut documents = self.documents.write();
        match documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document.clone(),
            None => documents.push(document.clone()),
        }
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[NewChunk]) -> Result<usize> {
        let mut stored = self.chunks.write();
        for chunk in chunks {
            let row = StoredChunk {
                document_id: chunk.document_id.clone(),
                label: chunk.label.clone(),
                text: chunk.text.clone(),
                source_url: chunk.source_url.clone(),
                embedding: chunk.embedding.clone(),
            };
            match stored
                .iter_mut()
                .find(|c| c.document_id == chunk.document_id && c.label == chunk.label)
            {
                Some(existing) => *existing = row,
                None => stored.push(row),
            }
        }
        Ok(chunks.len())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        Ok(self.documents.read().clone())
    }

    async fn find_chunks_by_label_suffix(
        &self,
        label_suffix: &str,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredChunk>> {
        let needle = label_suffix.to_lowercase();
        Ok(self.matching(document_id, limit, |c| {
            c.label.to_lowercase().ends_with(&needle)
        }))
    }

    async fn find_chunks_by_text(
        &self,
        phrase: &str,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredChunk>> {
        let needle = phrase.to_lowercase();
        Ok(self.matching(document_id, limit, |c| {
            c.text.to_lowercase().contains(&needle)
        }))
    }

    async fn candidate_chunks(
        &self,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredChunk>> {
        let mut rows = self.matching(document_id, usize::MAX, |_| true);
        rows.sort_by(|a, b| (&a.document_id, &a.label).cmp(&(&b.document_id, &b.label)));
        rows.truncate(limit);
        Ok(rows)
    }
}
