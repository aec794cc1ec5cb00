//! Realmgate Login Gateway
//!
//! Authenticates players over the Blowfish login protocol, hands out session
//! keys and realm lists, and accepts registrations from world servers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use realmgate_server::auth::{AccountStore, MemoryAccountStore, PgAccountStore};
use realmgate_server::config::ServerConfig;
use realmgate_server::net::{accept_clients, accept_world_servers};
use realmgate_server::state::AppState;
use realmgate_server::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before anything reads the environment
    dotenv::dotenv().ok();

    // Load configuration
    let config = ServerConfig::load().await?;

    // Initialize logging
    init_logging(&config.log_format);

    info!("╔══════════════════════════════════════════════╗");
    info!("║        Realmgate Login Gateway v{}          ║", VERSION);
    info!("╚══════════════════════════════════════════════╝");
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let accounts = create_account_store(&config).await;
    let state = Arc::new(AppState::new(config.clone(), accounts, shutdown_tx.clone()));
    info!("Application state initialized");

    let client_listener = bind(&config.bind_address, config.client_port, "Login").await;
    let world_listener = bind(&config.bind_address, config.world_port, "World link").await;
    if client_listener.is_none() && world_listener.is_none() {
        bail!("Could not bind any listener");
    }

    let mut acceptors: Vec<JoinHandle<()>> = Vec::new();
    if let Some(listener) = client_listener {
        acceptors.push(tokio::spawn(accept_clients(
            listener,
            state.clone(),
            shutdown_tx.subscribe(),
        )));
    }
    if let Some(listener) = world_listener {
        acceptors.push(tokio::spawn(accept_world_servers(
            listener,
            state.clone(),
            shutdown_tx.subscribe(),
        )));
    }

    let stats_handle = tokio::spawn(report_stats(state.clone(), shutdown_tx.subscribe()));

    info!("Gateway startup complete!");

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down gateway...");

    // Wait for acceptors to drain their connections
    for handle in acceptors {
        let _ = handle.await;
    }
    let _ = stats_handle.await;

    // Cleanup
    state.sessions.evict_all();
    info!("All sessions closed");

    match serde_json::to_string(&state.stats.snapshot()) {
        Ok(stats) => info!(stats = %stats, "Final login statistics"),
        Err(e) => warn!("Failed to serialize final statistics: {}", e),
    }

    info!("Gateway shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging(format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,realmgate_server=debug"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Bind one listener. A failure is logged and the other channel keeps running.
async fn bind(host: &str, port: u16, name: &str) -> Option<TcpListener> {
    let addr: SocketAddr = match format!("{}:{}", host, port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("{} listener address {}:{} is invalid: {}", name, host, port, e);
            return None;
        }
    };

    match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("{} server listening on: {}", name, addr);
            Some(listener)
        }
        Err(e) => {
            error!("Failed to bind {} listener on {}: {}", name, addr, e);
            None
        }
    }
}

/// Create the account store, falling back to memory when PostgreSQL is unavailable
async fn create_account_store(config: &ServerConfig) -> Arc<dyn AccountStore> {
    if !config.database.enabled {
        warn!("Database disabled, accounts are kept in memory only");
        return Arc::new(MemoryAccountStore::new());
    }

    let store = match PgAccountStore::connect(&config.database).await {
        Ok(store) => store,
        Err(e) => {
            warn!(
                "Failed to connect to database: {}. Accounts will be kept in memory only.",
                e
            );
            return Arc::new(MemoryAccountStore::new());
        }
    };

    if let Err(e) = store.ensure_schema().await {
        warn!(
            "Failed to prepare accounts table: {}. Accounts will be kept in memory only.",
            e
        );
        return Arc::new(MemoryAccountStore::new());
    }

    info!("Account store connected to PostgreSQL");
    Arc::new(store)
}

/// Periodically log counters and session counts
async fn report_stats(state: Arc<AppState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let period = Duration::from_secs(state.config.stats_interval_secs.max(1));
    let mut interval = tokio::time::interval(period);
    // First tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let stats = state.stats.snapshot();
                info!(
                    sessions = state.sessions.count(),
                    successful_logins = stats.successful_logins,
                    failed_logins = stats.failed_logins,
                    successful_account_creations = stats.successful_account_creations,
                    failed_account_creations = stats.failed_account_creations,
                    hack_attempts = stats.hack_attempts,
                    "Login statistics"
                );
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
