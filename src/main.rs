use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use beleidsbank::api;
use beleidsbank::config::Config;
use beleidsbank::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!("Datastore: {} ({})", config.store.backend, config.store.base_url);
    tracing::info!("Allowed origins: {:?}", config.allowed_origins);
    if config.ingest_token.is_none() {
        tracing::warn!("BELEIDSBANK_INGEST_TOKEN not set; /api/ingest is disabled");
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config)?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {bind_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
