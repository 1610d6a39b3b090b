//! PostgREST client (e.g. Supabase) for the `documents` and `chunks` tables.
//!
//! Upserts use `on_conflict` plus `Prefer: resolution=merge-duplicates`, so
//! re-ingesting a law overwrites rows instead of failing on the unique key.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::config::{StoreConfig, UpstreamConfig};
use crate::models::{Document, NewChunk, StoredChunk};
use crate::store::LegalStore;
use crate::upstream::{guarded, CallError, CircuitBreaker, RetryPolicy};

const CHUNK_COLUMNS: &str = "document_id,label,text,source_url,embedding";
/// Rows per upsert request
const UPSERT_BATCH: usize = 50;

pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl RestStore {
    pub fn new(client: Client, config: &StoreConfig, upstream: &UpstreamConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            retry: RetryPolicy::from_config(upstream),
            breaker: CircuitBreaker::from_config("datastore", upstream),
        }
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req
                .header("apikey", key)
                .header("Authorization", format!("Bearer {key}")),
            None => req,
        }
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let url = format!("{}/{table}", self.base_url);
        let url = url.as_str();
        guarded(&self.retry, &self.breaker, || async move {
            let resp = self
                .authorize(self.client.get(url))
                .query(params)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| CallError::from_reqwest(e, "datastore select"))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(CallError::from_status(status, &body, "datastore select"));
            }

            resp.json::<Vec<T>>().await.map_err(|e| {
                CallError::fatal(anyhow::Error::new(e).context(format!("Failed to decode {table} rows")))
            })
        })
        .await
    }

    async fn upsert<T: serde::Serialize + Sync>(
        &self,
        table: &str,
        on_conflict: &str,
        rows: &[T],
    ) -> Result<()> {
        let url = format!("{}/{table}", self.base_url);
        let url = url.as_str();
        guarded(&self.retry, &self.breaker, || async move {
            let resp = self
                .authorize(self.client.post(url))
                .query(&[("on_conflict", on_conflict)])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .timeout(self.timeout)
                .json(rows)
                .send()
                .await
                .map_err(|e| CallError::from_reqwest(e, "datastore upsert"))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(CallError::from_status(status, &body, "datastore upsert"));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LegalStore for RestStore {
    async fn upsert_document(&self, document: &Document) -> Result<()> {
        self.upsert("documents", "id", std::slice::from_ref(document))
            .await
    }

    async fn upsert_chunks(&self, chunks: &[NewChunk]) -> Result<usize> {
        let mut written = 0;
        for batch in chunks.chunks(UPSERT_BATCH) {
            self.upsert("chunks", "document_id,label", batch).await?;
            written += batch.len();
        }
        Ok(written)
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        self.select(
            "documents",
            &[
                ("select", "id,title,source_url".to_string()),
                ("order", "id.asc".to_string()),
            ],
        )
        .await
    }

    async fn find_chunks_by_label_suffix(
        &self,
        label_suffix: &str,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredChunk>> {
        let pattern = format!("ilike.*{}", escape_like(label_suffix));
        self.select("chunks", &filtered("label", pattern, document_id, limit))
            .await
    }

    async fn find_chunks_by_text(
        &self,
        phrase: &str,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredChunk>> {
        let pattern = format!("ilike.*{}*", escape_like(phrase));
        self.select("chunks", &filtered("text", pattern, document_id, limit))
            .await
    }

    async fn candidate_chunks(
        &self,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredChunk>> {
        let mut params = vec![
            ("select", CHUNK_COLUMNS.to_string()),
            ("order", "document_id.asc,label.asc".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(id) = document_id {
            params.push(("document_id", format!("eq.{id}")));
        }
        self.select("chunks", &params).await
    }
}

/// Query parameters for a chunk select with one `ilike` filter.
fn filtered(
    column: &'static str,
    pattern: String,
    document_id: Option<&str>,
    limit: usize,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", CHUNK_COLUMNS.to_string()),
        (column, pattern),
        ("limit", limit.to_string()),
    ];
    if let Some(id) = document_id {
        params.push(("document_id", format!("eq.{id}")));
    }
    params
}

/// PostgREST `ilike` patterns use `*` as wildcard; strip characters that
/// would change the pattern or the filter syntax.
fn escape_like(fragment: &str) -> String {
    fragment
        .chars()
        .filter(|c| !matches!(c, '*' | '%' | ',' | '(' | ')'))
        .collect()
}
