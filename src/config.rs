//! Server configuration module
//!
//! Handles loading and parsing of gateway configuration from files and environment variables.

use std::collections::HashSet;
use std::env;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{PasswordScheme, ACCESS_LEVEL_PLAYER};
use crate::crypto::DEFAULT_LOGIN_KEY;
use crate::net::transport::Deadlines;

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Address both listeners bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Player login port (TCP)
    #[serde(default = "default_client_port")]
    pub client_port: u16,

    /// World server registration port (TCP)
    #[serde(default = "default_world_port")]
    pub world_port: u16,

    /// Create accounts for unknown usernames on first login
    #[serde(default = "default_true")]
    pub auto_create: bool,

    /// Lowest access level allowed to log in
    #[serde(default = "default_min_access_level")]
    pub min_access_level: i16,

    /// Blowfish key for the login channel (4 to 56 bytes)
    #[serde(default = "default_blowfish_key")]
    pub blowfish_key: String,

    /// Idle read deadline per connection in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Write deadline per packet in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// How long shutdown waits for connections to drain
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Maximum concurrent player connections per IP
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: usize,

    /// Interval between statistics log lines (0 to disable)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Log output format: "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Keep realms offline until their world server registers
    #[serde(default)]
    pub require_world_registration: bool,

    /// Password hashing for new accounts
    #[serde(default)]
    pub password: PasswordScheme,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Realms offered to players
    #[serde(default)]
    pub worlds: Vec<WorldServerConfig>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Use PostgreSQL instead of the in-memory store
    #[serde(default)]
    pub enabled: bool,

    /// Database host
    #[serde(default = "default_db_host")]
    pub host: String,

    /// Database port
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database name
    #[serde(default = "default_db_name")]
    pub database: String,

    /// Database username
    #[serde(default = "default_db_user")]
    pub username: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Maximum connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// One realm entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldServerConfig {
    /// Realm ID (1-255)
    pub id: u8,

    /// Public IPv4 address advertised to players
    pub host: Ipv4Addr,

    /// Address advertised to players on a local network
    #[serde(default)]
    pub internal_host: Option<Ipv4Addr>,

    /// Game port of the world server
    #[serde(default = "default_world_server_port")]
    pub port: u16,

    #[serde(default = "default_world_max_players")]
    pub max_players: u16,

    /// Restricted to elevated accounts
    #[serde(default)]
    pub testing: bool,

    #[serde(default)]
    pub pvp: bool,

    #[serde(default)]
    pub age_limit: u8,

    #[serde(default = "default_server_type")]
    pub server_type: u32,

    #[serde(default)]
    pub brackets: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_client_port() -> u16 {
    2106
}

fn default_world_port() -> u16 {
    9413
}

fn default_true() -> bool {
    true
}

fn default_min_access_level() -> i16 {
    ACCESS_LEVEL_PLAYER
}

fn default_blowfish_key() -> String {
    String::from_utf8_lossy(DEFAULT_LOGIN_KEY).into_owned()
}

fn default_read_timeout() -> u64 {
    120
}

fn default_write_timeout() -> u64 {
    10
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_max_connections_per_ip() -> usize {
    10
}

fn default_stats_interval() -> u64 {
    300 // 5 minutes
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "realmgate".to_string()
}

fn default_db_user() -> String {
    "realmgate".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_world_server_port() -> u16 {
    7777
}

fn default_world_max_players() -> u16 {
    1000
}

fn default_server_type() -> u32 {
    1
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            username: default_db_user(),
            password: String::new(),
            pool_size: default_pool_size(),
        }
    }
}

impl DatabaseConfig {
    /// Get the database connection URL
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/gateway.toml"),
            bind_address: default_bind_address(),
            client_port: default_client_port(),
            world_port: default_world_port(),
            auto_create: default_true(),
            min_access_level: default_min_access_level(),
            blowfish_key: default_blowfish_key(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            max_connections_per_ip: default_max_connections_per_ip(),
            stats_interval_secs: default_stats_interval(),
            log_format: default_log_format(),
            require_world_registration: false,
            password: PasswordScheme::default(),
            database: DatabaseConfig::default(),
            worlds: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("REALMGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/gateway.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("REALMGATE_BIND_ADDRESS") {
            self.bind_address = val;
        }
        if let Ok(val) = env::var("REALMGATE_CLIENT_PORT") {
            if let Ok(port) = val.parse() {
                self.client_port = port;
            }
        }
        if let Ok(val) = env::var("REALMGATE_WORLD_PORT") {
            if let Ok(port) = val.parse() {
                self.world_port = port;
            }
        }
        if let Ok(val) = env::var("REALMGATE_AUTO_CREATE") {
            self.auto_create = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("REALMGATE_MIN_ACCESS_LEVEL") {
            if let Ok(level) = val.parse() {
                self.min_access_level = level;
            }
        }
        if let Ok(val) = env::var("REALMGATE_BLOWFISH_KEY") {
            self.blowfish_key = val;
        }
        if let Ok(val) = env::var("REALMGATE_LOG_FORMAT") {
            self.log_format = val;
        }

        // Database overrides
        if let Ok(val) = env::var("REALMGATE_DATABASE_ENABLED") {
            self.database.enabled = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("REALMGATE_DATABASE_HOST") {
            self.database.host = val;
        }
        if let Ok(val) = env::var("REALMGATE_DATABASE_PORT") {
            if let Ok(port) = val.parse() {
                self.database.port = port;
            }
        }
        if let Ok(val) = env::var("REALMGATE_DATABASE_NAME") {
            self.database.database = val;
        }
        if let Ok(val) = env::var("REALMGATE_DATABASE_USER") {
            self.database.username = val;
        }
        if let Ok(val) = env::var("REALMGATE_DATABASE_PASSWORD") {
            self.database.password = val;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Ports must be unique
        if self.client_port == self.world_port {
            anyhow::bail!("Client port and world port must be different");
        }

        let key_len = self.blowfish_key.len();
        if !(4..=56).contains(&key_len) {
            anyhow::bail!("Blowfish key must be 4 to 56 bytes, got {}", key_len);
        }

        if self.read_timeout_secs == 0 || self.write_timeout_secs == 0 {
            anyhow::bail!("Read and write timeouts must be at least 1 second");
        }

        if self.max_connections_per_ip == 0 {
            anyhow::bail!("Max connections per IP must be at least 1");
        }

        if let PasswordScheme::Bcrypt { cost } = self.password {
            if !(4..=31).contains(&cost) {
                anyhow::bail!("Bcrypt cost must be between 4 and 31");
            }
        }

        let mut seen = HashSet::new();
        for world in &self.worlds {
            if world.id == 0 {
                anyhow::bail!("World ID must be between 1 and 255");
            }
            if !seen.insert(world.id) {
                anyhow::bail!("Duplicate world ID {}", world.id);
            }
        }

        Ok(())
    }

    /// Read/write deadlines for connections
    pub fn deadlines(&self) -> Deadlines {
        Deadlines {
            read: Duration::from_secs(self.read_timeout_secs),
            write: Duration::from_secs(self.write_timeout_secs),
        }
    }

    /// Shutdown drain timeout
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
