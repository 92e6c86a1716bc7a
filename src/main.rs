//! sse-resume binary: CLI parsing, logging, wiring, serve loop.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use sse_resume::config::{Cli, Config};
use sse_resume::server::api::{build_router, AppState};
use sse_resume::session::{SessionManager, SessionStore};
use sse_resume::upstream::OpenAiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "sse_resume=debug,tower_http=debug"
    } else {
        "sse_resume=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("sse-resume v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;
    let config = Arc::new(config);

    info!(
        upstream = config.upstream.base_url,
        model = config.upstream.model,
        cors_origin = config.server.cors_origin,
        "Configuration loaded"
    );

    // Wire the core: store, upstream client, lifecycle manager.
    let store = Arc::new(SessionStore::new());
    let client = Arc::new(OpenAiClient::new(&config.upstream));
    let manager = SessionManager::new(store.clone(), client);

    // Optional retention sweep. Off by default: sessions are kept for the
    // lifetime of the process so clients can always resume.
    if config.retention.enabled {
        let max_age = config.retention.max_age();
        let interval = config.retention.sweep_interval();
        info!(
            max_age_secs = config.retention.max_age_secs,
            sweep_interval_secs = config.retention.sweep_interval_secs,
            "Retention sweep enabled"
        );
        let sweep_store = store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                sweep_store.evict_terminal(max_age).await;
            }
        });
    }

    // Build application state and the HTTP router.
    let state = Arc::new(AppState {
        manager,
        config: config.clone(),
    });
    let app = build_router(state);

    // Start the server.
    let listen_addr = cli.listen_addr(&config);
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
