//! Hosted LLM provider: embeddings and chat completions.

pub mod completion;
pub mod embeddings;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{LlmConfig, UpstreamConfig};
use crate::upstream::{guarded, CircuitBreaker, RetryPolicy};

pub use completion::ChatMessage;

/// Turns texts into fixed-dimension vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Answers a system instruction plus user message with free text.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Provider client shared by both traits. Embedding and completion failures
/// trip separate breakers.
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
    retry: RetryPolicy,
    embed_breaker: CircuitBreaker,
    chat_breaker: CircuitBreaker,
}

impl LlmClient {
    pub fn new(http: reqwest::Client, config: LlmConfig, upstream: &UpstreamConfig) -> Self {
        Self {
            http,
            config,
            retry: RetryPolicy::from_config(upstream),
            embed_breaker: CircuitBreaker::from_config("embedding provider", upstream),
            chat_breaker: CircuitBreaker::from_config("completion provider", upstream),
        }
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(embeddings::batch_size(&self.config)) {
            let vectors = guarded(&self.retry, &self.embed_breaker, || {
                embeddings::embed_batch(&self.http, &self.config, batch)
            })
            .await?;
            all.extend(vectors);
        }
        Ok(all)
    }
}

#[async_trait]
impl Completer for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        guarded(&self.retry, &self.chat_breaker, || {
            completion::complete(&self.http, &self.config, &messages)
        })
        .await
    }
}
