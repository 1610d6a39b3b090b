use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::upstream::CallError;

/// Maximum characters to send per text to the embedding API.
/// Long articles (definition lists, transitional law) easily exceed the
/// model context; the head of an article carries most of its meaning.
const MAX_EMBED_CHARS: usize = 6_000;

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Generate embeddings for one batch of texts using the configured provider.
/// Callers split large inputs with [`batch_size`].
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, CallError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let truncated: Vec<String> = texts
        .iter()
        .map(|t| truncate_for_embedding(t).to_string())
        .collect();

    let embeddings = match config.provider.as_str() {
        "ollama" => embed_ollama(client, config, truncated).await?,
        "openai" => embed_openai(client, config, truncated).await?,
        other => {
            return Err(CallError::fatal(anyhow::anyhow!(
                "Unknown LLM provider: {other}"
            )))
        }
    };

    if embeddings.len() != texts.len() {
        return Err(CallError::fatal(anyhow::anyhow!(
            "Embedding API returned {} vectors for {} inputs",
            embeddings.len(),
            texts.len()
        )));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != config.embedding_dim) {
        return Err(CallError::fatal(anyhow::anyhow!(
            "Embedding dimension {} does not match configured {}",
            bad.len(),
            config.embedding_dim
        )));
    }
    Ok(embeddings)
}

/// Inputs per request for the configured provider.
pub fn batch_size(config: &LlmConfig) -> usize {
    match config.provider.as_str() {
        "ollama" => 32,
        _ => 64,
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, CallError> {
    let url = format!("{}/api/embed", config.base_url);

    let req = OllamaEmbedRequest {
        model: config.embedding_model.clone(),
        input: texts,
        truncate: true,
    };

    let resp = client
        .post(&url)
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .json(&req)
        .send()
        .await
        .map_err(|e| CallError::from_reqwest(e, "Ollama embed API"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(CallError::from_status(status, &body, "Ollama embed API"));
    }

    let body: OllamaEmbedResponse = resp
        .json()
        .await
        .context("Failed to parse Ollama embed response")
        .map_err(CallError::fatal)?;

    Ok(body.embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, CallError> {
    let url = format!("{}/v1/embeddings", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = OpenAiEmbedRequest {
        model: config.embedding_model.clone(),
        input: texts,
    };

    let resp = client
        .post(&url)
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .map_err(|e| CallError::from_reqwest(e, "OpenAI embed API"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(CallError::from_status(status, &body, "OpenAI embed API"));
    }

    let body: OpenAiEmbedResponse = resp
        .json()
        .await
        .context("Failed to parse OpenAI embed response")
        .map_err(CallError::fatal)?;

    Ok(order_by_index(body.data))
}

/// The API may return items out of order; `index` is authoritative.
fn order_by_index(mut data: Vec<OpenAiEmbedData>) -> Vec<Vec<f32>> {
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate_for_embedding("kort"), "kort");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let long = "é".repeat(MAX_EMBED_CHARS);
        let cut = truncate_for_embedding(&long);
        assert!(cut.len() <= MAX_EMBED_CHARS);
        assert!(long.is_char_boundary(cut.len()));
    }

    #[test]
    fn test_openai_items_are_reordered_by_index() {
        let data: OpenAiEmbedResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#,
        )
        .unwrap();
        assert_eq!(order_by_index(data.data), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_batch_size_per_provider() {
        let mut config = LlmConfig::default();
        assert_eq!(batch_size(&config), 64);
        config.provider = "ollama".into();
        assert_eq!(batch_size(&config), 32);
    }
}
