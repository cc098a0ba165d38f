//! radscope web server
//!
//! Run with: cargo run -p radscope-web

use std::time::Duration;

use radscope_config::Config;
use radscope_web::router::build_router;
use radscope_web::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("radscope=debug,info")),
        )
        .init();

    info!("Starting radscope web server...");

    let config = Config::load()?;

    let state = AppState::from_config(&config).await?;

    let sessions = state.sessions.clone();
    let interval = Duration::from_secs(config.sessions.cleanup_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup_expired().await;
            if removed > 0 {
                info!(removed, "Expired patient sessions removed");
            }
        }
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Could not listen for shutdown signal");
            }
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
