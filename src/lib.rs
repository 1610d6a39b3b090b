//! # beleidsbank
//!
//! A retrieval-augmented chat service over Dutch legislation. Laws are
//! fetched from the government registry, split into articles, embedded and
//! stored; questions are answered by a hosted language model from the
//! retrieved articles, with citations.
//!
//! ## Architecture
//!
//! ```text
//!   POST /api/ingest                       POST /api/chat, GET /api/search
//!         │                                          │
//!         ▼                                          ▼
//!   ┌────────────┐   ┌──────────┐          ┌───────────────────┐
//!   │ SRU lookup │──►│ segment  │          │ normalize + detect │
//!   └────────────┘   └────┬─────┘          └─────────┬─────────┘
//!                         │ articles                 │
//!                         ▼                          ▼
//!                   ┌──────────┐   rows    ┌───────────────────┐
//!                   │  embed   │──────────►│ exact │ semantic  │
//!                   └──────────┘  store    └─────────┬─────────┘
//!                                                    │ evidence
//!                                                    ▼
//!                                          ┌───────────────────┐
//!                                          │ synthesis (LLM)   │
//!                                          └───────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration
//! - [`models`] - Rows, request and response types
//! - [`query`] - Query normalization, article citations, document detection
//! - [`search`] - Exact lookup, cosine ranking with boosts, the retrieval pipeline
//! - [`segment`] - Splitting law text into articles
//! - [`sru`] - Government registry search and law text download
//! - [`ingest`] - The ingestion pipeline
//! - [`synthesis`] - Prompt construction and answer generation
//! - [`llm`] - Embedding and completion providers (OpenAI-compatible or Ollama)
//! - [`store`] - Datastore boundary (PostgREST or in-memory)
//! - [`upstream`] - Retry with backoff and circuit breaking for outbound calls
//! - [`rate_limit`] - Per-IP fixed-window throttling
//! - [`api`] - Axum handlers, middleware and error mapping
//! - [`state`] - Shared application state

pub mod api;
pub mod config;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod query;
pub mod rate_limit;
pub mod search;
pub mod segment;
pub mod sru;
pub mod state;
pub mod store;
pub mod synthesis;
pub mod upstream;
