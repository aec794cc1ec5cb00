//! Application state module
//!
//! Contains the shared state used across all gateway connections.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::auth::AccountStore;
use crate::config::ServerConfig;
use crate::net::session::SessionRegistry;
use crate::protocol::login::{LoginPolicy, LoginProtocol};
use crate::stats::GatewayStats;
use crate::world::WorldDirectory;

/// Application state shared across all connections
pub struct AppState {
    /// Gateway configuration
    pub config: ServerConfig,
    /// Registry of live player sessions
    pub sessions: Arc<SessionRegistry>,
    /// Login counters
    pub stats: Arc<GatewayStats>,
    /// Account persistence
    pub accounts: Arc<dyn AccountStore>,
    /// Realms offered to players
    pub worlds: Arc<WorldDirectory>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create the shared state around an account store
    pub fn new(
        config: ServerConfig,
        accounts: Arc<dyn AccountStore>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        let worlds = Arc::new(WorldDirectory::from_config(
            &config.worlds,
            config.require_world_registration,
        ));
        if worlds.is_empty() {
            warn!("No world servers configured - server list will be empty");
        } else {
            info!("Loaded {} world server entries", worlds.len());
        }

        if config.auto_create {
            info!("Automatic account creation is enabled");
        }

        Self {
            sessions: Arc::new(SessionRegistry::with_limit(config.max_connections_per_ip)),
            stats: Arc::new(GatewayStats::new()),
            accounts,
            worlds,
            shutdown_tx,
            config,
        }
    }

    /// Build the per-connection protocol driver
    pub fn login_protocol(&self) -> LoginProtocol {
        LoginProtocol::new(
            self.accounts.clone(),
            self.worlds.clone(),
            self.stats.clone(),
            LoginPolicy::from(&self.config),
        )
    }
}
