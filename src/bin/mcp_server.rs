use anyhow::Result;
use tokio::net::TcpListener;

use study_quiz::config::McpConfig;
use study_quiz::mcp::{self, McpState};
use study_quiz::request_counter::RequestCounter;
use study_quiz::server::shutdown_signal;
use study_quiz::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = McpConfig::from_env()?;
    let counter = RequestCounter::new();
    let state = McpState::from_config(&config, counter.clone()).await?;

    if state.generator.is_configured() {
        tracing::info!("Mixtral question generation configured");
    } else {
        tracing::warn!("MIXTRAL_API_KEY/MIXTRAL_API_URL not set, generation will report unavailable");
    }
    if !state.vector_store.health_check().await {
        tracing::warn!("Vector store is not reachable yet, documents will not be indexed until it is");
    }

    let app = mcp::router(state, &config.cors_origin);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Document service listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    counter.print_summary();
    Ok(())
}
