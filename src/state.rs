use std::sync::Arc;

use crate::config::Config;
use crate::ingest::Ingestor;
use crate::llm::{Completer, Embedder, LlmClient};
use crate::rate_limit::RateLimiter;
use crate::search::Retriever;
use crate::sru::{LawRegistry, SruClient};
use crate::store::{LegalStore, MemoryStore, RestStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub completer: Arc<dyn Completer>,
    pub registry: Arc<dyn LawRegistry>,
    pub retriever: Arc<Retriever>,
    pub ingestor: Arc<Ingestor>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Production wiring: PostgREST (or in-memory) store, hosted LLM
    /// provider and the government SRU service.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(concat!("beleidsbank/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let store: Arc<dyn LegalStore> = match config.store.backend.as_str() {
            "memory" => {
                tracing::warn!("Using in-memory store; ingested laws are lost on restart");
                Arc::new(MemoryStore::new())
            }
            "rest" => Arc::new(RestStore::new(http.clone(), &config.store, &config.upstream)),
            other => anyhow::bail!("Unknown STORE_BACKEND: {other}"),
        };

        let llm = Arc::new(LlmClient::new(
            http.clone(),
            config.llm.clone(),
            &config.upstream,
        ));
        let registry = Arc::new(SruClient::new(
            http,
            config.registry.clone(),
            &config.upstream,
        ));

        Ok(Self::with_backends(config, store, llm.clone(), llm, registry))
    }

    /// Wire the service around explicit backends.
    pub fn with_backends(
        config: Config,
        store: Arc<dyn LegalStore>,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        registry: Arc<dyn LawRegistry>,
    ) -> Self {
        let retriever = Retriever::new(
            store.clone(),
            embedder.clone(),
            config.context_chunks,
            config.candidate_limit,
        );
        let ingestor = Ingestor::new(
            store,
            embedder,
            registry.clone(),
            config.registry.public_url.clone(),
        );
        let rate_limiter = RateLimiter::from_config(&config.rate_limit);

        Self {
            config: Arc::new(config),
            completer,
            registry,
            retriever: Arc::new(retriever),
            ingestor: Arc::new(ingestor),
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}
