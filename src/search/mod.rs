//! Evidence retrieval: exact article lookup first, semantic ranking second.
//!
//! ```text
//!        question
//!           │ normalize
//!           ▼
//!   detect document ──────────────┐
//!           │                     │ (optional filter)
//!   article ref? ──yes──► exact lookup ──hits──► Exact
//!           │ no                  │ none: retry without filter
//!           ▼                     ▼
//!   embed query ─► candidates ─► cosine + boosts ─► top-K ─► Semantic
//!                      ▲
//!                      └── boost-eligible chunks
//! ```

pub mod ranking;
pub mod vector;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::llm::Embedder;
use crate::models::{RetrievalMode, SearchHit, StoredChunk};
use crate::query::{
    detect_document, extract_article_ref, label_matches_article, normalize_query, ArticleRef,
    Detection, DetectionTable,
};
use crate::store::LegalStore;

pub use ranking::{rank_chunks, BoostRule, BoostTable, ChunkCondition, QueryCondition};

/// Upper bound on exact-lookup hits.
pub const MAX_EXACT_HITS: usize = 8;

/// Labels fetched from the store before the strict filter.
const EXACT_FETCH_LIMIT: usize = 64;

/// Rows fetched per boost condition on top of the plain candidates.
const BOOST_FETCH_LIMIT: usize = 64;

/// Store lookup for labels ending in `Artikel <article>`, strictly filtered.
/// Store order is kept, then a stable sort on label.
pub async fn exact_lookup(
    store: &dyn LegalStore,
    article: &ArticleRef,
    document_id: Option<&str>,
) -> Result<Vec<SearchHit>> {
    let rows = store
        .find_chunks_by_label_suffix(&article.label_pattern(), document_id, EXACT_FETCH_LIMIT)
        .await
        .with_context(|| format!("Label lookup for artikel {article} failed"))?;

    let mut hits: Vec<SearchHit> = rows
        .into_iter()
        .filter(|c| label_matches_article(&c.label, article))
        .take(MAX_EXACT_HITS)
        .map(|c| SearchHit {
            document_id: c.document_id,
            label: c.label,
            text: c.text,
            source_url: c.source_url,
            similarity: 0.0,
            score: 1.0,
        })
        .collect();
    hits.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(hits)
}

/// Result of one retrieval pass.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub mode: RetrievalMode,
    pub hits: Vec<SearchHit>,
    pub detection: Option<Detection>,
}

/// Retrieval pipeline over a store and an embedding provider.
pub struct Retriever {
    store: Arc<dyn LegalStore>,
    embedder: Arc<dyn Embedder>,
    detection: DetectionTable,
    boosts: BoostTable,
    top_k: usize,
    candidate_limit: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn LegalStore>,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
        candidate_limit: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            detection: DetectionTable::default(),
            boosts: BoostTable::default(),
            top_k,
            candidate_limit,
        }
    }

    pub fn with_tables(mut self, detection: DetectionTable, boosts: BoostTable) -> Self {
        self.detection = detection;
        self.boosts = boosts;
        self
    }

    pub async fn retrieve(&self, question: &str) -> Result<Retrieval> {
        let normalized = normalize_query(question);
        if normalized.is_empty() {
            return Ok(Retrieval {
                mode: RetrievalMode::None,
                hits: Vec::new(),
                detection: None,
            });
        }

        let documents = self
            .store
            .list_documents()
            .await
            .context("Failed to list documents")?;
        let detection = detect_document(&normalized, &documents, &self.detection);
        let document_id = detection.as_ref().map(|d| d.document_id.as_str());

        if let Some(article) = extract_article_ref(&normalized) {
            let mut hits = exact_lookup(self.store.as_ref(), &article, document_id).await?;
            if hits.is_empty() && document_id.is_some() {
                tracing::debug!("No artikel {article} in {document_id:?}, retrying unfiltered");
                hits = exact_lookup(self.store.as_ref(), &article, None).await?;
            }
            if !hits.is_empty() {
                tracing::info!(
                    "Exact lookup for artikel {article} returned {} hit(s)",
                    hits.len()
                );
                return Ok(Retrieval {
                    mode: RetrievalMode::Exact,
                    hits,
                    detection,
                });
            }
            tracing::debug!("No label matches artikel {article}, falling back to semantic");
        }

        let hits = self.semantic_retrieve(&normalized, document_id).await?;
        let mode = if hits.is_empty() {
            RetrievalMode::None
        } else {
            RetrievalMode::Semantic
        };
        Ok(Retrieval {
            mode,
            hits,
            detection,
        })
    }

    /// Embed the query, fetch candidates (restricted to the detected
    /// document when there is one) and rank them. The plain candidate set is
    /// capped at `candidate_limit`; chunks that an active boost rule would
    /// lift are fetched separately so the cap never hides them.
    pub async fn semantic_retrieve(
        &self,
        normalized: &str,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let mut candidates = self
            .store
            .candidate_chunks(document_id, self.candidate_limit)
            .await
            .context("Failed to fetch candidate chunks")?;
        let boosted = self.boost_candidates(normalized, document_id).await?;
        merge_candidates(&mut candidates, boosted);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self
            .embedder
            .embed(&[normalized.to_string()])
            .await
            .context("Failed to embed query")?;
        let query_embedding = vectors.pop().unwrap_or_default();

        let hits = rank_chunks(
            &query_embedding,
            normalized,
            candidates,
            &self.boosts,
            self.top_k,
        );
        tracing::info!(
            "Semantic ranking kept {} hit(s) (document filter: {:?})",
            hits.len(),
            document_id
        );
        Ok(hits)
    }

    async fn boost_candidates(
        &self,
        normalized: &str,
        document_id: Option<&str>,
    ) -> Result<Vec<StoredChunk>> {
        let mut rows = Vec::new();
        for condition in self.boosts.active_conditions(normalized) {
            match condition {
                ChunkCondition::TextContains(phrase) => {
                    let found = self
                        .store
                        .find_chunks_by_text(phrase, document_id, BOOST_FETCH_LIMIT)
                        .await
                        .with_context(|| format!("Text lookup for {phrase:?} failed"))?;
                    rows.extend(found);
                }
                ChunkCondition::LabelIsArticle(raw) => {
                    let Some(article) = ArticleRef::parse(raw) else {
                        continue;
                    };
                    let found = self
                        .store
                        .find_chunks_by_label_suffix(
                            &article.label_pattern(),
                            document_id,
                            BOOST_FETCH_LIMIT,
                        )
                        .await
                        .with_context(|| format!("Label lookup for artikel {article} failed"))?;
                    rows.extend(found);
                }
            }
        }
        Ok(rows)
    }
}

/// Append `extra` rows not already present, keyed by (document_id, label).
fn merge_candidates(candidates: &mut Vec<StoredChunk>, extra: Vec<StoredChunk>) {
    let mut seen: HashSet<(String, String)> = candidates
        .iter()
        .map(|c| (c.document_id.clone(), c.label.clone()))
        .collect();
    for chunk in extra {
        if seen.insert((chunk.document_id.clone(), chunk.label.clone())) {
            candidates.push(chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, NewChunk};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn new_chunk(doc: &str, label: &str, text: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            document_id: doc.into(),
            label: label.into(),
            text: text.into(),
            source_url: format!("https://wetten.overheid.nl/{doc}"),
            embedding,
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_document(&Document {
                id: "BWBR0005537".into(),
                title: "Algemene wet bestuursrecht".into(),
                source_url: String::new(),
            })
            .await
            .unwrap();
        store
            .upsert_chunks(&[
                new_chunk("BWBR0005537", "Awb — Artikel 5:10", "Tien.", vec![0.0, 1.0]),
                new_chunk("BWBR0005537", "Awb — Artikel 15:1", "Vijftien.", vec![0.0, 1.0]),
                new_chunk("BWBR0005537", "Awb — Artikel 5:1", "Een.", vec![0.0, 1.0]),
                new_chunk("BWBR0005537", "Awb — Artikel 1:3", "Besluit.", vec![0.6, 0.8]),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_exact_lookup_is_strict() {
        let store = seeded_store().await;
        let hits = exact_lookup(store.as_ref(), &ArticleRef::parse("5:1").unwrap(), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "Awb — Artikel 5:1");
    }

    #[tokio::test]
    async fn test_exact_lookup_sees_past_longer_numbers() {
        let store = MemoryStore::new();
        let mut rows: Vec<NewChunk> = (1..=200)
            .map(|n| new_chunk("A", &format!("Wet A — Artikel {n}"), "Tekst.", vec![1.0, 0.0]))
            .collect();
        rows.push(new_chunk("B", "Wet B — Artikel 1", "Tekst.", vec![1.0, 0.0]));
        store.upsert_chunks(&rows).await.unwrap();

        let hits = exact_lookup(&store, &ArticleRef::parse("1").unwrap(), None)
            .await
            .unwrap();
        let labels: Vec<&str> = hits.iter().map(|h| h.label.as_str()).collect();
        assert_eq!(labels, vec!["Wet A — Artikel 1", "Wet B — Artikel 1"]);
    }

    #[tokio::test]
    async fn test_exact_lookup_caps_hits_and_sorts_by_label() {
        let store = MemoryStore::new();
        let prefixes = [
            "Wet K", "Wet C", "Wet J", "Wet A", "Wet H", "Wet E", "Wet B", "Wet I", "Wet D",
            "Wet G", "Wet F",
        ];
        let rows: Vec<NewChunk> = prefixes
            .iter()
            .map(|p| new_chunk(p, &format!("{p} — Artikel 2:1"), "Tekst.", vec![1.0, 0.0]))
            .collect();
        store.upsert_chunks(&rows).await.unwrap();

        let hits = exact_lookup(&store, &ArticleRef::parse("2.1").unwrap(), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), MAX_EXACT_HITS);
        let labels: Vec<&str> = hits.iter().map(|h| h.label.as_str()).collect();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);
        // The first eight in store order survive the cap.
        assert!(!labels.contains(&"Wet D — Artikel 2:1"));
        assert!(labels.contains(&"Wet K — Artikel 2:1"));
    }

    #[tokio::test]
    async fn test_filtered_exact_miss_retries_all_documents() {
        let store = MemoryStore::new();
        for (id, title) in [
            ("BWBR0005291", "Burgerlijk Wetboek Boek 3"),
            ("BWBR0005289", "Burgerlijk Wetboek Boek 6"),
        ] {
            store
                .upsert_document(&Document {
                    id: id.into(),
                    title: title.into(),
                    source_url: String::new(),
                })
                .await
                .unwrap();
        }
        store
            .upsert_chunks(&[
                new_chunk("BWBR0005291", "BW3 — Artikel 3:1", "Goederen.", vec![1.0, 0.0]),
                new_chunk("BWBR0005289", "BW6 — Artikel 6:162", "Daad.", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        // The title mentions "boek 3", which the question shares.
        let retriever = Retriever::new(Arc::new(store), Arc::new(ConstEmbedder), 5, 100);
        let result = retriever
            .retrieve("Wat zegt artikel 6:162 Burgerlijk Wetboek Boek 3?")
            .await
            .unwrap();
        assert_eq!(result.detection.unwrap().document_id, "BWBR0005291");
        assert_eq!(result.mode, RetrievalMode::Exact);
        assert_eq!(result.hits[0].label, "BW6 — Artikel 6:162");
    }

    #[tokio::test]
    async fn test_definition_article_survives_candidate_cap() {
        let store = MemoryStore::new();
        // Sorts before the Awb id, so the capped candidate set is all Vw.
        let mut rows: Vec<NewChunk> = (1..=50)
            .map(|n| {
                let label = format!("Vw — Artikel {n}");
                new_chunk("BWBR0000001", &label, "Vreemdelingen.", vec![1.0, 0.0])
            })
            .collect();
        rows.push(new_chunk(
            "BWBR0005537",
            "Awb — Artikel 1:3",
            "Onder besluit wordt verstaan: een schriftelijke beslissing van een bestuursorgaan.",
            vec![0.0, 1.0],
        ));
        store.upsert_chunks(&rows).await.unwrap();

        let retriever = Retriever::new(Arc::new(store), Arc::new(ConstEmbedder), 3, 10);
        let result = retriever.retrieve("Wat is een besluit?").await.unwrap();
        assert_eq!(result.mode, RetrievalMode::Semantic);
        assert_eq!(result.hits[0].label, "Awb — Artikel 1:3");
    }

    #[test]
    fn test_merge_candidates_skips_known_rows() {
        let row = |doc: &str, label: &str| StoredChunk {
            document_id: doc.into(),
            label: label.into(),
            text: String::new(),
            source_url: String::new(),
            embedding: Vec::new(),
        };
        let mut candidates = vec![row("A", "Artikel 1")];
        merge_candidates(&mut candidates, vec![row("A", "Artikel 1"), row("B", "Artikel 1")]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].document_id, "B");
    }

    #[tokio::test]
    async fn test_retrieve_prefers_exact_path() {
        let store = seeded_store().await;
        let retriever = Retriever::new(store, Arc::new(ConstEmbedder), 5, 100);
        let result = retriever.retrieve("Wat staat in artikel 5.1 Awb?").await.unwrap();
        assert_eq!(result.mode, RetrievalMode::Exact);
        assert_eq!(result.hits[0].label, "Awb — Artikel 5:1");
        assert_eq!(result.detection.unwrap().document_id, "BWBR0005537");
    }

    #[tokio::test]
    async fn test_unknown_article_falls_back_to_semantic() {
        let store = seeded_store().await;
        let retriever = Retriever::new(store, Arc::new(ConstEmbedder), 2, 100);
        let result = retriever.retrieve("artikel 99:9").await.unwrap();
        assert_eq!(result.mode, RetrievalMode::Semantic);
        assert_eq!(result.hits.len(), 2);
        assert_eq!(result.hits[0].label, "Awb — Artikel 1:3");
    }

    #[tokio::test]
    async fn test_empty_store_yields_none() {
        let retriever = Retriever::new(Arc::new(MemoryStore::new()), Arc::new(ConstEmbedder), 5, 100);
        let result = retriever.retrieve("wat is een besluit").await.unwrap();
        assert_eq!(result.mode, RetrievalMode::None);
        assert!(result.hits.is_empty());
    }
}
