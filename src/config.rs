use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Origins allowed to call the API from a browser. Empty = no browser origins.
    pub allowed_origins: Vec<String>,
    /// Shared secret for the ingestion endpoint (`x-admin-token` header)
    pub ingest_token: Option<String>,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Datastore (PostgREST) configuration
    pub store: StoreConfig,
    /// Government search service configuration
    pub registry: RegistryConfig,
    /// Per-IP request throttling
    pub rate_limit: RateLimitConfig,
    /// Retry and circuit-breaker settings for outbound calls
    pub upstream: UpstreamConfig,
    /// Number of chunks handed to the completion model
    pub context_chunks: usize,
    /// Maximum candidate chunks fetched for semantic ranking
    pub candidate_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" or "ollama"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for chat completions
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "rest" for a PostgREST endpoint, "memory" for a process-local store
    pub backend: String,
    /// Base URL of the REST API, e.g. "https://xyz.supabase.co/rest/v1"
    pub base_url: String,
    /// Service key sent as `apikey` and bearer token
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// SRU endpoint of the government search service
    pub sru_url: String,
    /// SRU connections queried in parallel (e.g. "BWB", "CVDR")
    pub connections: Vec<String>,
    /// Template for downloading a law's text; `{id}` is replaced by the BWB id
    pub law_text_url: String,
    /// Template for the citation links shown to users; `{id}` as above
    pub public_url: String,
    pub timeout_secs: u64,
    pub max_records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window per client IP
    pub limit: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Total attempts per outbound call (1 = no retry)
    pub max_attempts: u32,
    /// First backoff delay; doubles per retry
    pub base_delay_ms: u64,
    /// Consecutive failures before a service's breaker opens
    pub breaker_threshold: u32,
    /// How long an open breaker rejects calls
    pub breaker_cooldown_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            allowed_origins: Vec::new(),
            ingest_token: None,
            llm: LlmConfig::default(),
            store: StoreConfig::default(),
            registry: RegistryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            upstream: UpstreamConfig::default(),
            context_chunks: 6,
            candidate_limit: 1000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key: None,
            embedding_dim: 1536,
            timeout_secs: 25,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "rest".to_string(),
            base_url: "http://localhost:54321/rest/v1".to_string(),
            api_key: None,
            timeout_secs: 15,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sru_url: "https://zoekservice.overheid.nl/sru/Search".to_string(),
            connections: vec!["BWB".to_string(), "CVDR".to_string()],
            law_text_url: "https://wetten.overheid.nl/{id}".to_string(),
            public_url: "https://wetten.overheid.nl/{id}".to_string(),
            timeout_secs: 12,
            max_records: 10,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            window_secs: 60,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            breaker_threshold: 5,
            breaker_cooldown_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BELEIDSBANK_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(origins) = std::env::var("BELEIDSBANK_ALLOWED_ORIGINS") {
            config.allowed_origins = split_list(&origins);
        }
        if let Ok(token) = std::env::var("BELEIDSBANK_INGEST_TOKEN") {
            if !token.trim().is_empty() {
                config.ingest_token = Some(token);
            }
        }
        parse_into("BELEIDSBANK_CONTEXT_CHUNKS", &mut config.context_chunks);
        parse_into("BELEIDSBANK_CANDIDATE_LIMIT", &mut config.candidate_limit);

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        parse_into("LLM_EMBEDDING_DIM", &mut config.llm.embedding_dim);
        parse_into("LLM_TIMEOUT_SECS", &mut config.llm.timeout_secs);

        // Datastore
        if let Ok(backend) = std::env::var("STORE_BACKEND") {
            config.store.backend = backend;
        }
        if let Ok(url) = std::env::var("STORE_URL") {
            config.store.base_url = url;
        }
        if let Ok(key) = std::env::var("STORE_API_KEY") {
            config.store.api_key = Some(key);
        }
        parse_into("STORE_TIMEOUT_SECS", &mut config.store.timeout_secs);

        // Registry
        if let Ok(url) = std::env::var("SRU_URL") {
            config.registry.sru_url = url;
        }
        if let Ok(connections) = std::env::var("SRU_CONNECTIONS") {
            config.registry.connections = split_list(&connections);
        }
        if let Ok(template) = std::env::var("LAW_TEXT_URL") {
            config.registry.law_text_url = template;
        }
        if let Ok(template) = std::env::var("LAW_PUBLIC_URL") {
            config.registry.public_url = template;
        }
        parse_into("SRU_TIMEOUT_SECS", &mut config.registry.timeout_secs);
        parse_into("SRU_MAX_RECORDS", &mut config.registry.max_records);

        // Rate limiting
        parse_into("RATE_LIMIT_PER_WINDOW", &mut config.rate_limit.limit);
        parse_into("RATE_LIMIT_WINDOW_SECS", &mut config.rate_limit.window_secs);

        // Upstream guard
        parse_into("UPSTREAM_MAX_ATTEMPTS", &mut config.upstream.max_attempts);
        parse_into("UPSTREAM_BASE_DELAY_MS", &mut config.upstream.base_delay_ms);
        parse_into("UPSTREAM_BREAKER_THRESHOLD", &mut config.upstream.breaker_threshold);
        parse_into(
            "UPSTREAM_BREAKER_COOLDOWN_SECS",
            &mut config.upstream.breaker_cooldown_secs,
        );

        config.upstream.max_attempts = config.upstream.max_attempts.max(1);
        config
    }
}

/// Overwrite `target` when `var` is set and parses; keep the default otherwise.
fn parse_into<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(val) = std::env::var(var) {
        match val.trim().parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!("Ignoring unparsable {var}={val:?}"),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
