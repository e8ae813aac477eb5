//! voyager-link - persistent client for the Voyager Application Server

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voyager_link::{config::Args, session::SessionManager, transport::WsTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("voyager_link={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  voyager-link - Application Server client");
    info!("======================================");
    info!("Endpoint: {}", args.uri);
    info!("Host: {} (instance {})", args.host, args.instance);
    info!(
        "Auto-reconnect: {} (max {} retries, backoff cap {}s)",
        args.auto_reconnect, args.max_reconnect_attempts, args.backoff_cap_secs
    );
    info!(
        "Heartbeat every {}s, status publish every {}s",
        args.heartbeat_secs, args.publish_secs
    );
    info!("======================================");

    let manager = Arc::new(SessionManager::new(args.session_config(), WsTransport::new()));
    manager.start();

    // Ctrl-C requests a graceful stop; the manager closes the active handle
    // and cancels the duties.
    let signal_manager = Arc::clone(&manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_manager.stop();
        }
    });

    match manager.wait().await {
        Ok(()) => {
            info!("session closed");
            Ok(())
        }
        Err(e) => {
            error!("session ended: {}", e);
            std::process::exit(1);
        }
    }
}
