use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;

use study_quiz::config::ServerConfig;
use study_quiz::reminders::{self, LogNotifier};
use study_quiz::server::{self, AppState};
use study_quiz::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let state = AppState::from_config(&config).await?;
    tracing::info!("Database ready at {}", config.database_url);

    if config.reminders_enabled {
        reminders::spawn_scheduler(
            state.pool.clone(),
            Arc::new(LogNotifier),
            config.quiz_page_url.clone(),
        );
        tracing::info!("Quiz reminder scheduler started");
    }

    let app = server::router(state, &config.cors_origin);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server is running on http://{}", listener.local_addr()?);
    tracing::info!("Document service expected at {}", config.mcp_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(server::shutdown_signal())
        .await?;

    tracing::info!("Server closed");
    Ok(())
}
