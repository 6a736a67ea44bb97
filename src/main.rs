use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use wakegate::config::Config;
use wakegate::gateway::{GatewayServer, GatewayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wakegate=debug".parse().expect("valid log directive")),
        )
        .init();

    let config = load_config()?;
    print_startup_banner(&config);

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.server.bind, port = config.server.port, error = %e, "Invalid bind address");
            anyhow::anyhow!("Invalid bind address: {}", e)
        })?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = Arc::new(GatewayState::new(config)?);
    let server = GatewayServer::new(bind_addr, state, shutdown_rx);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Gateway server error");
        }
    });

    wait_for_shutdown_signal().await;

    // Signal shutdown and wait for the server to stop (with timeout)
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from a TOML file when a path argument is given,
/// otherwise from environment variables. Either way a failure is fatal
/// before the listener starts.
fn load_config() -> anyhow::Result<Config> {
    match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            let config = Config::load(&path).map_err(|e| {
                error!(path = %path.display(), error = %e, "Failed to load configuration");
                e
            })?;
            info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => {
            let config = Config::from_env().map_err(|e| {
                error!(error = %e, "Failed to load configuration from environment");
                e
            })?;
            info!("Configuration loaded from environment");
            Ok(config)
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }
}

fn print_startup_banner(config: &Config) {
    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting wake gateway"
    );
    info!(
        target = %config.target_base_url(),
        mac = %config.target.mac,
        "Wake target"
    );
    info!(
        wake_port = config.wake.port,
        broadcast = %config.wake.broadcast,
        refresh_delay_secs = config.gateway.refresh_delay_secs,
        probe_timeout_ms = config.gateway.probe_timeout_ms,
        "Wake and probe settings"
    );
    info!(
        connect_timeout_secs = config.gateway.connect_timeout_secs,
        read_timeout_secs = config.gateway.read_timeout_secs,
        verify_tls = config.gateway.verify_tls,
        "Forwarding settings"
    );
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        "Server configuration"
    );
}
