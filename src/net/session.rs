//! Session management module
//!
//! Manages player sessions including:
//! - Session keys (random, unique among live sessions)
//! - Session state machine (connected -> authenticated -> server selected)
//! - Thread-safe session registry with per-IP limits and eviction

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, NetworkError, Result};

/// Length of a session key in bytes
pub const SESSION_KEY_LEN: usize = 16;

/// Length of the key prefix clients echo back in later requests
pub const SESSION_PREFIX_LEN: usize = 8;

/// Random per-connection session key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Generate a random key
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }

    /// The part of the key a client must echo back
    pub fn prefix(&self) -> [u8; SESSION_PREFIX_LEN] {
        let mut prefix = [0u8; SESSION_PREFIX_LEN];
        prefix.copy_from_slice(&self.0[..SESSION_PREFIX_LEN]);
        prefix
    }

    /// The part of the key handed to the world server on play
    pub fn suffix(&self) -> [u8; SESSION_KEY_LEN - SESSION_PREFIX_LEN] {
        let mut suffix = [0u8; SESSION_KEY_LEN - SESSION_PREFIX_LEN];
        suffix.copy_from_slice(&self.0[SESSION_PREFIX_LEN..]);
        suffix
    }

    /// Compare a client-supplied prefix without short-circuiting
    pub fn matches_prefix(&self, candidate: &[u8]) -> bool {
        candidate.len() == SESSION_PREFIX_LEN
            && candidate
                .iter()
                .zip(&self.0[..SESSION_PREFIX_LEN])
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.prefix()))
    }
}

/// Session state in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    /// Initial state - handshake sent, not yet logged in
    Connected,
    /// Account bound to the session
    Authenticated,
    /// Play granted for a world server
    ServerSelected,
    /// Transport closed or evicted
    Closed,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Connected => 0,
            SessionState::Authenticated => 1,
            SessionState::ServerSelected => 2,
            SessionState::Closed => 3,
        }
    }

    /// Check if the session has logged in
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticated | SessionState::ServerSelected
        )
    }

    /// Get a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Connected => "Connected",
            SessionState::Authenticated => "Authenticated",
            SessionState::ServerSelected => "ServerSelected",
            SessionState::Closed => "Closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A live player session as seen by the registry.
///
/// The connection handler drives the state; the registry only looks it up
/// and can signal the handler to close the transport.
pub struct Session {
    key: SessionKey,
    /// Remote address of the client
    pub address: SocketAddr,
    state: RwLock<SessionState>,
    username: RwLock<Option<String>>,
    /// Time the connection was accepted
    pub connected_at: DateTime<Utc>,
    close_tx: watch::Sender<bool>,
}

impl Session {
    /// Create a new session
    pub fn new(key: SessionKey, address: SocketAddr) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            key,
            address,
            state: RwLock::new(SessionState::Connected),
            username: RwLock::new(None),
            connected_at: Utc::now(),
            close_tx,
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Move the session forward. Backward transitions are refused.
    pub fn advance_state(&self, new_state: SessionState) -> bool {
        let old_state = {
            let mut state = self.state.write();
            if new_state.rank() < state.rank() {
                return false;
            }
            std::mem::replace(&mut *state, new_state)
        };

        if old_state != new_state {
            debug!(
                session = %self.key,
                old_state = %old_state,
                new_state = %new_state,
                "Session state changed"
            );
        }
        true
    }

    /// Set the username
    pub fn set_username(&self, username: &str) {
        *self.username.write() = Some(username.to_string());
    }

    /// Get the username
    pub fn username(&self) -> Option<String> {
        self.username.read().clone()
    }

    /// Ask the owning connection to close its transport
    pub fn close(&self) {
        self.close_tx.send_replace(true);
    }

    /// Whether a close has been requested
    pub fn is_closed(&self) -> bool {
        *self.close_tx.borrow()
    }

    /// Resolves once [`Session::close`] has been called
    pub async fn closed(&self) {
        let mut rx = self.close_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Read-only view for metrics and logging
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            key: self.key.to_string(),
            address: self.address,
            state: self.state(),
            username: self.username(),
            connected_at: self.connected_at,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key.to_string())
            .field("address", &self.address)
            .field("state", &self.state())
            .field("username", &self.username())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Snapshot of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub key: String,
    pub address: SocketAddr,
    pub state: SessionState,
    pub username: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// Thread-safe registry of live player sessions
pub struct SessionRegistry {
    /// Map of session key to session
    sessions: DashMap<SessionKey, Arc<Session>>,
    /// Live connection count per IP address
    ip_counts: DashMap<IpAddr, usize>,
    /// Maximum sessions per IP
    max_per_ip: usize,
}

impl SessionRegistry {
    /// Create a new registry
    pub fn new() -> Self {
        Self::with_limit(10)
    }

    /// Create a registry with a custom per-IP limit
    pub fn with_limit(max_per_ip: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ip_counts: DashMap::new(),
            max_per_ip,
        }
    }

    /// Allocate a fresh session key for a new connection and register it
    pub fn register(&self, address: SocketAddr) -> Result<Arc<Session>> {
        let ip = address.ip();
        {
            let mut count = self.ip_counts.entry(ip).or_insert(0);
            if *count >= self.max_per_ip {
                warn!(
                    ip = %ip,
                    count = *count,
                    max = self.max_per_ip,
                    "Connection limit exceeded for IP"
                );
                return Err(GatewayError::Network(NetworkError::TooManyConnections(
                    ip.to_string(),
                )));
            }
            *count += 1;
        }

        let session = loop {
            let key = SessionKey::generate();
            match self.sessions.entry(key) {
                Entry::Occupied(_) => {
                    warn!(session = %key, "Session key collision, regenerating");
                }
                Entry::Vacant(slot) => {
                    let session = Arc::new(Session::new(key, address));
                    slot.insert(session.clone());
                    break session;
                }
            }
        };

        info!(
            session = %session.key(),
            address = %address,
            "Session registered"
        );

        Ok(session)
    }

    /// Get a session by key
    pub fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|r| r.clone())
    }

    /// Remove a session and close its transport.
    ///
    /// Evicting an unknown key is a no-op; returns whether anything was removed.
    pub fn evict(&self, key: &SessionKey) -> bool {
        let Some((_, session)) = self.sessions.remove(key) else {
            return false;
        };

        session.advance_state(SessionState::Closed);
        session.close();

        if let Entry::Occupied(mut count) = self.ip_counts.entry(session.address.ip()) {
            *count.get_mut() -= 1;
            if *count.get() == 0 {
                count.remove();
            }
        }

        info!(
            session = %key,
            username = ?session.username(),
            "Session evicted"
        );
        true
    }

    /// Evict every session
    pub fn evict_all(&self) {
        let keys: Vec<SessionKey> = self.sessions.iter().map(|r| *r.key()).collect();
        for key in keys {
            self.evict(&key);
        }
    }

    /// Read-only view of all live sessions
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|s| s.info()).collect()
    }

    /// Get the count of live sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the count of sessions per state
    pub fn count_by_state(&self) -> HashMap<SessionState, usize> {
        let mut counts = HashMap::new();
        for session in self.sessions.iter() {
            *counts.entry(session.state()).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
