//! HTTP surface: routes, error mapping, origin and rate-limit middleware.

pub mod chat;
pub mod ingest;
pub mod laws;
pub mod search;

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::rate_limit::RateLimitResult;
use crate::state::AppState;
use crate::upstream::failed_service;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("origin not allowed")]
    Forbidden,
    #[error("too many requests")]
    RateLimited { retry_after_secs: u64 },
    #[error("{service} failed")]
    Upstream {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    /// Internal failure; the upstream service is taken from the error when
    /// it went through the outbound guard.
    pub fn upstream(err: anyhow::Error) -> Self {
        let service = failed_service(&err).unwrap_or("internal");
        ApiError::Upstream {
            service,
            source: err,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            ApiError::Upstream { service, source } => {
                tracing::error!("Request failed in {service}: {source:#}");
                ErrorBody {
                    error: self.to_string(),
                    detail: Some(format!("{source:#}")),
                    service: Some(*service),
                }
            }
            _ => ErrorBody {
                error: self.to_string(),
                detail: None,
                service: None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Client address as seen behind a proxy, falling back to the socket peer.
/// Only the right-most `x-forwarded-for` hop is used: it is the one our own
/// proxy appended, the rest is client-supplied.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    ["x-forwarded-for", "x-real-ip", "fly-client-ip"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| raw.rsplit(',').next())
        .map(str::trim)
        .find(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reject browser requests from origins outside the allow-list.
async fn enforce_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or_default().trim_end_matches('/');
        if !state.config.allowed_origins.iter().any(|o| o == origin) {
            tracing::warn!("Rejected request from origin {origin:?}");
            return Err(ApiError::Forbidden);
        }
    }
    Ok(next.run(request).await)
}

async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);

    match state.rate_limiter.check(&ip) {
        RateLimitResult::Allowed => Ok(next.run(request).await),
        RateLimitResult::Limited { retry_after } => {
            tracing::info!("Rate limited {ip} for {retry_after:?}");
            Err(ApiError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            })
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
        ])
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

pub fn router(state: AppState) -> Router {
    let throttled = Router::new()
        .route("/api/chat", post(chat::chat))
        .route("/api/search", get(search::search))
        .route("/api/laws", get(laws::search_laws))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(throttled)
        .route("/api/ingest", post(ingest::ingest))
        .route("/health", get(health))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(middleware::from_fn_with_state(state.clone(), enforce_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
