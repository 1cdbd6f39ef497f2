//! WebSocket server for a streaming conversational agent.
//!
//! Run with: cargo run -p agent-socket-server -- --agent offline
//!
//! Then connect a WebSocket client to ws://localhost:3000/ws/agent.

mod config;

use agent_socket_transport::{WsState, create_router};
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    args.validate()?;
    let addr = args.socket_addr()?;
    let agent = args.build_agent()?;
    let memory = args.build_memory().await?;

    tracing::info!(
        agent = ?args.agent,
        memory = memory.name(),
        inactivity_timeout_secs = args.inactivity_timeout_secs,
        open_frame = args.open_frame,
        "Configuration loaded"
    );

    let app = create_router(WsState::new(agent, memory, args.session_config()));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server listening on ws://{addr}/ws/agent");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
