//! Semantic ranking: cosine similarity plus declarative score boosts.
//!
//! Boosts are hand-tuned overrides for definitional questions. The
//! label-match rule is deliberately large enough to dominate similarity,
//! so "wat is een besluit" always surfaces the Awb definition article.

use std::cmp::Ordering;

use crate::models::{SearchHit, StoredChunk};
use crate::query::{is_definition_question, label_matches_article, words, ArticleRef};
use crate::search::vector::cosine_similarity;

/// What the (normalized) question must look like for a rule to apply.
#[derive(Debug, Clone)]
pub enum QueryCondition {
    /// A "what is / what does ... mean" question
    Definitional,
    /// A definitional question that mentions this word
    DefinitionalMentioning(&'static str),
}

/// What the chunk must look like for a rule to apply.
#[derive(Debug, Clone)]
pub enum ChunkCondition {
    /// Lowercased chunk text contains the phrase
    TextContains(&'static str),
    /// Chunk label cites exactly this article
    LabelIsArticle(&'static str),
}

#[derive(Debug, Clone)]
pub struct BoostRule {
    pub query: QueryCondition,
    pub chunk: ChunkCondition,
    pub weight: f32,
}

/// Features of the question evaluated once per ranking call.
struct QueryFeatures<'a> {
    definitional: bool,
    words: Vec<&'a str>,
}

impl BoostRule {
    fn query_applies(&self, features: &QueryFeatures<'_>) -> bool {
        match &self.query {
            QueryCondition::Definitional => features.definitional,
            QueryCondition::DefinitionalMentioning(word) => {
                features.definitional && features.words.iter().any(|w| w == word)
            }
        }
    }

    fn chunk_applies(&self, chunk: &StoredChunk, text_lower: &str) -> bool {
        match &self.chunk {
            ChunkCondition::TextContains(phrase) => text_lower.contains(phrase),
            ChunkCondition::LabelIsArticle(article) => ArticleRef::parse(article)
                .map_or(false, |wanted| label_matches_article(&chunk.label, &wanted)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoostTable {
    pub rules: Vec<BoostRule>,
}

impl Default for BoostTable {
    fn default() -> Self {
        Self {
            rules: vec![
                BoostRule {
                    query: QueryCondition::Definitional,
                    chunk: ChunkCondition::TextContains("wordt verstaan"),
                    weight: 0.25,
                },
                BoostRule {
                    query: QueryCondition::DefinitionalMentioning("besluit"),
                    chunk: ChunkCondition::TextContains("schriftelijke beslissing"),
                    weight: 0.5,
                },
                BoostRule {
                    query: QueryCondition::DefinitionalMentioning("besluit"),
                    chunk: ChunkCondition::LabelIsArticle("1:3"),
                    weight: 2.5,
                },
            ],
        }
    }
}

impl BoostTable {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Chunk conditions of the rules this question activates. Chunks meeting
    /// one of them can outrank any similarity, so retrieval fetches them
    /// alongside the plain candidates.
    pub fn active_conditions(&self, normalized_query: &str) -> Vec<&ChunkCondition> {
        let features = QueryFeatures {
            definitional: is_definition_question(normalized_query),
            words: words(normalized_query).collect(),
        };
        self.rules
            .iter()
            .filter(|r| r.query_applies(&features))
            .map(|r| &r.chunk)
            .collect()
    }

    /// Sum of the weights of all rules matching `chunk` for this question.
    pub fn boost_for(&self, normalized_query: &str, chunk: &StoredChunk) -> f32 {
        let features = QueryFeatures {
            definitional: is_definition_question(normalized_query),
            words: words(normalized_query).collect(),
        };
        self.boost_with(&features, chunk)
    }

    fn boost_with(&self, features: &QueryFeatures<'_>, chunk: &StoredChunk) -> f32 {
        let active: Vec<&BoostRule> = self
            .rules
            .iter()
            .filter(|r| r.query_applies(features))
            .collect();
        if active.is_empty() {
            return 0.0;
        }
        let text_lower = chunk.text.to_lowercase();
        active
            .iter()
            .filter(|r| r.chunk_applies(chunk, &text_lower))
            .map(|r| r.weight)
            .sum()
    }
}

/// Score every chunk against the query embedding, add boosts, and keep the
/// best `top_k`. Equal scores keep store order.
pub fn rank_chunks(
    query_embedding: &[f32],
    normalized_query: &str,
    chunks: Vec<StoredChunk>,
    table: &BoostTable,
    top_k: usize,
) -> Vec<SearchHit> {
    let features = QueryFeatures {
        definitional: is_definition_question(normalized_query),
        words: words(normalized_query).collect(),
    };

    let mut hits: Vec<SearchHit> = chunks
        .into_iter()
        .map(|chunk| {
            let similarity = cosine_similarity(query_embedding, &chunk.embedding);
            let boost = table.boost_with(&features, &chunk);
            SearchHit {
                document_id: chunk.document_id,
                label: chunk.label,
                text: chunk.text,
                source_url: chunk.source_url,
                similarity,
                score: similarity + boost,
            }
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(top_k);
    hits
}
