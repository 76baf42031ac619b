// P2Snake room relay
// Stores one offer and one answer per room so two peers can find each other
//
// Usage: cargo run --bin signal-relay -- [--bind <addr>] [--debug]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info};

use p2snake::config::load_config;
use p2snake::debug;
use p2snake::network::relay_server::build_router;
use p2snake::network::signaling::RoomStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut bind = None;
    let mut verbose = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => bind = Some(args.next().context("--bind requires an address")?),
            "--debug" => verbose = true,
            other => bail!("unknown argument: {}", other),
        }
    }

    debug::init(verbose).context("failed to open the debug log")?;

    let config = load_config().context("failed to load configuration")?;
    let bind = bind.unwrap_or(config.relay.bind_addr);
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;

    let rooms = Arc::new(RwLock::new(RoomStore::new()));
    let router = build_router(rooms);

    let listener = TcpListener::bind(addr).await?;
    info!("Room relay listening on {}", addr);
    info!("Health check: http://{}/signal/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
