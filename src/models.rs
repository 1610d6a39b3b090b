use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A law known to the datastore
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Government law id, e.g. "BWBR0005537"
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub source_url: String,
}

/// A chunk row ready to be written, keyed by (document_id, label)
#[derive(Debug, Clone, Serialize)]
pub struct NewChunk {
    pub document_id: String,
    pub label: String,
    pub text: String,
    pub source_url: String,
    pub embedding: Vec<f32>,
}

/// A chunk row as read back from the datastore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub document_id: String,
    pub label: String,
    pub text: String,
    #[serde(default)]
    pub source_url: String,
    /// pgvector columns come back as `"[0.1,0.2]"` strings over PostgREST.
    #[serde(default, deserialize_with = "deserialize_embedding")]
    pub embedding: Vec<f32>,
}

/// A retrieved chunk with its final score
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub label: String,
    pub text: String,
    pub source_url: String,
    /// Raw cosine similarity (0 for exact lookups)
    pub similarity: f32,
    /// Similarity plus boosts
    pub score: f32,
}

/// Which retrieval path produced the evidence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Exact,
    Semantic,
    None,
}

/// Chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub session_id: Option<String>,
}

/// Source reference returned alongside an answer
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub label: String,
    pub url: String,
    pub document_id: String,
    pub score: f32,
}

/// Chat response
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// `?q=` query string for GET endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// Search response shared by the evidence and registry endpoints
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse<T> {
    pub ok: bool,
    pub query: String,
    pub mode: String,
    pub results: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A hit from the government search service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LawRecord {
    pub identifier: String,
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// SRU connection the record came from ("BWB", "CVDR", ...)
    #[serde(default)]
    pub collection: String,
}

/// Ingest request
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub bwb_id: String,
    /// Falls back to the registry title when absent
    pub title: Option<String>,
    /// Short label prefix, e.g. "Awb"; defaults to the title
    pub label_prefix: Option<String>,
    /// Raw law text; fetched from the registry when absent
    pub content: Option<String>,
}

/// Ingest response
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub document_id: String,
    pub title: String,
    pub articles_found: usize,
    pub chunks_upserted: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

fn deserialize_embedding<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<f32>),
        Text(String),
        Null,
    }

    match Raw::deserialize(deserializer)? {
        Raw::List(v) => Ok(v),
        Raw::Null => Ok(Vec::new()),
        Raw::Text(s) => {
            let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
            if inner.trim().is_empty() {
                return Ok(Vec::new());
            }
            inner
                .split(',')
                .map(|v| v.trim().parse::<f32>().map_err(serde::de::Error::custom))
                .collect()
        }
    }
}
