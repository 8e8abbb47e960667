//! Forge control server - HTTP front end for starting and watching generations.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use forge::io::config::{DEFAULT_CONFIG_FILE, load_config};
use forge::io::engine::{Engine, OllamaEngine};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "forge-server")]
#[command(about = "HTTP control surface for project generation")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Forge config file; missing files fall back to defaults
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("forge=info,forge_server=info")
            }),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    // The engine owns a blocking HTTP client; build it off the async workers.
    let engine_config = config.engine.clone();
    let engine = tokio::task::spawn_blocking(move || OllamaEngine::new(&engine_config)).await??;
    let engine: Arc<dyn Engine> = Arc::new(engine);
    info!(engine = %engine.label(), "starting forge-server");

    let state = AppState::new(config, engine);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or `POST /api/shutdown`; either way a running
/// generation is asked to stop at its next stage boundary.
async fn shutdown_signal(state: AppState) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = state.shutdown.notified() => {}
    }
    state.cancel.cancel();
}
