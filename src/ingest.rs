//! Ingestion pipeline: resolve, fetch, segment, embed and store one law.
//!
//! The document row is written before its chunks and the two writes are not
//! transactional; a failure between them leaves a document without (new)
//! chunks until the next ingest of the same id overwrites it.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use thiserror::Error;

use crate::llm::Embedder;
use crate::models::{Document, IngestRequest, IngestResponse, NewChunk};
use crate::segment::{segment_articles, SegmentError};
use crate::sru::{is_valid_law_id, LawRegistry};
use crate::store::LegalStore;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

pub struct Ingestor {
    store: Arc<dyn LegalStore>,
    embedder: Arc<dyn Embedder>,
    registry: Arc<dyn LawRegistry>,
    /// Public URL of a law; `{id}` is replaced by the law id
    source_url_template: String,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn LegalStore>,
        embedder: Arc<dyn Embedder>,
        registry: Arc<dyn LawRegistry>,
        source_url_template: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            registry,
            source_url_template: source_url_template.into(),
        }
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, IngestError> {
        let started_at = Utc::now();
        let id = request.bwb_id.trim().to_string();
        if id.is_empty() {
            return Err(IngestError::InvalidRequest("bwb_id is required".into()));
        }
        if !is_valid_law_id(&id) {
            return Err(IngestError::InvalidRequest(format!("invalid bwb_id: {id:?}")));
        }

        let title = self.resolve_title(&id, request.title.as_deref()).await?;
        let label_prefix = request
            .label_prefix
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&title)
            .to_string();

        let raw = match request.content {
            Some(content) if !content.trim().is_empty() => content,
            _ => self
                .registry
                .fetch_law_text(&id)
                .await
                .with_context(|| format!("Failed to download text of {id}"))?,
        };

        let segments = segment_articles(&raw, &label_prefix)?;
        tracing::info!("Segmented {id} ({title}) into {} articles", segments.len());

        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Failed to embed articles of {id}"))?;
        if embeddings.len() != segments.len() {
            return Err(IngestError::Upstream(anyhow::anyhow!(
                "Embedder returned {} vectors for {} articles",
                embeddings.len(),
                segments.len()
            )));
        }

        let source_url = self.source_url_template.replace("{id}", &id);
        let document = Document {
            id: id.clone(),
            title: title.clone(),
            source_url: source_url.clone(),
        };
        self.store
            .upsert_document(&document)
            .await
            .with_context(|| format!("Failed to store document {id}"))?;

        let chunks: Vec<NewChunk> = segments
            .into_iter()
            .zip(embeddings)
            .map(|(segment, embedding)| NewChunk {
                document_id: id.clone(),
                label: segment.label,
                text: segment.text,
                source_url: source_url.clone(),
                embedding,
            })
            .collect();
        let articles_found = chunks.len();
        let chunks_upserted = self
            .store
            .upsert_chunks(&chunks)
            .await
            .with_context(|| format!("Failed to store chunks of {id}"))?;

        let finished_at = Utc::now();
        tracing::info!(
            "Ingested {id}: {chunks_upserted} chunks in {}ms",
            (finished_at - started_at).num_milliseconds()
        );

        Ok(IngestResponse {
            ok: true,
            document_id: id,
            title,
            articles_found,
            chunks_upserted,
            started_at,
            finished_at,
        })
    }

    async fn resolve_title(&self, id: &str, requested: Option<&str>) -> Result<String, IngestError> {
        if let Some(title) = requested.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(title.to_string());
        }
        let record = self
            .registry
            .find_by_identifier(id)
            .await
            .with_context(|| format!("Registry lookup of {id} failed"))?;
        match record {
            Some(r) if !r.title.is_empty() => Ok(r.title),
            _ => Err(IngestError::InvalidRequest(format!(
                "no title given and {id} is unknown to the registry"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LawRecord;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct StaticRegistry;

    #[async_trait]
    impl LawRegistry for StaticRegistry {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<LawRecord>> {
            Ok(Vec::new())
        }

        async fn find_by_identifier(&self, identifier: &str) -> Result<Option<LawRecord>> {
            Ok((identifier == "BWBR0045754").then(|| LawRecord {
                identifier: identifier.into(),
                title: "Wet open overheid".into(),
                kind: "wet".into(),
                collection: "BWB".into(),
            }))
        }

        async fn fetch_law_text(&self, _identifier: &str) -> Result<String> {
            let body = "Dit artikel bevat voldoende tekst om als volwaardig artikel te gelden \
                        en niet als ruis te worden weggefilterd door de segmentatie van wetten.";
            Ok(format!(
                "<wet><artikel><nr>1.1</nr><al>{body}</al></artikel>\
                 <artikel><nr>1.2</nr><al>{body}</al></artikel></wet>"
            ))
        }
    }

    fn ingestor(store: Arc<MemoryStore>) -> Ingestor {
        Ingestor::new(
            store,
            Arc::new(UnitEmbedder),
            Arc::new(StaticRegistry),
            "https://wetten.overheid.nl/{id}",
        )
    }

    fn request(id: &str) -> IngestRequest {
        IngestRequest {
            bwb_id: id.into(),
            title: None,
            label_prefix: None,
            content: None,
        }
    }

    #[tokio::test]
    async fn test_ingest_fetches_and_stores() {
        let store = Arc::new(MemoryStore::new());
        let mut req = request("BWBR0045754");
        req.label_prefix = Some("Woo".into());
        let response = ingestor(store.clone()).ingest(req).await.unwrap();

        assert_eq!(response.title, "Wet open overheid");
        assert_eq!(response.articles_found, 2);
        assert_eq!(response.chunks_upserted, 2);
        assert_eq!(store.chunk_count(), 2);
        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs[0].source_url, "https://wetten.overheid.nl/BWBR0045754");
        let hits = store.find_chunks_by_label_suffix("Artikel 1:2", None, 5).await.unwrap();
        assert_eq!(hits[0].label, "Woo — Artikel 1:2");
    }

    #[tokio::test]
    async fn test_reingest_overwrites() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone());
        ingestor.ingest(request("BWBR0045754")).await.unwrap();
        ingestor.ingest(request("BWBR0045754")).await.unwrap();
        assert_eq!(store.chunk_count(), 2);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let ingestor = ingestor(Arc::new(MemoryStore::new()));
        assert!(matches!(
            ingestor.ingest(request("  ")).await,
            Err(IngestError::InvalidRequest(_))
        ));
        assert!(matches!(
            ingestor.ingest(request("BWBR9999999")).await,
            Err(IngestError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_content_without_articles() {
        let ingestor = ingestor(Arc::new(MemoryStore::new()));
        let mut req = request("BWBR0045754");
        req.content = Some("<p>Geen artikelen</p>".into());
        assert!(matches!(
            ingestor.ingest(req).await,
            Err(IngestError::Segment(SegmentError::NoArticlesFound))
        ));
    }
}
