//! Realmgate Login Gateway Library
//!
//! This library provides the core functionality for the Realmgate login
//! gateway: the Blowfish-framed player login protocol, the rolling-key world
//! server link, session tracking and account persistence.
//!
//! ## Modules
//!
//! - `auth` - Accounts, password hashing and account stores
//! - `config` - Gateway configuration management
//! - `crypto` - Login and world link ciphers
//! - `error` - Error types and result definitions
//! - `net` - Framing, transports, sessions and accept loops
//! - `protocol` - Packet layouts and the login state machine
//! - `stats` - Login counters
//! - `world` - Directory of world servers offered to players

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod net;
pub mod protocol;
pub mod state;
pub mod stats;
pub mod world;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{GatewayError, Result};
pub use state::AppState;

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
