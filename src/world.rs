//! World server directory
//!
//! The list of realms players can pick from. Entries come from
//! configuration; the world link listener flips their online status and
//! population as world servers register and report in.

use std::net::{IpAddr, Ipv4Addr};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::config::WorldServerConfig;

/// A realm as advertised in the server list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldServerEntry {
    pub id: u8,
    /// Address given to players connecting from outside
    pub host: Ipv4Addr,
    /// Address given to players on the same network, if any
    pub internal_host: Option<Ipv4Addr>,
    pub port: u16,
    pub max_players: u16,
    pub current_players: u16,
    /// Restricted to accounts above the player access level
    pub testing: bool,
    pub pvp: bool,
    pub age_limit: u8,
    pub server_type: u32,
    pub brackets: bool,
    pub online: bool,
    /// A world server currently holds the registration link for this entry
    pub linked: bool,
}

impl WorldServerEntry {
    /// Pick the address a given requester should connect to
    pub fn address_for(&self, requester: IpAddr) -> Ipv4Addr {
        match self.internal_host {
            Some(internal) if is_local_network(requester) => internal,
            _ => self.host,
        }
    }
}

impl From<&WorldServerConfig> for WorldServerEntry {
    fn from(config: &WorldServerConfig) -> Self {
        Self {
            id: config.id,
            host: config.host,
            internal_host: config.internal_host,
            port: config.port,
            max_players: config.max_players,
            current_players: 0,
            testing: config.testing,
            pvp: config.pvp,
            age_limit: config.age_limit,
            server_type: config.server_type,
            brackets: config.brackets,
            online: false,
            linked: false,
        }
    }
}

fn is_local_network(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_network(IpAddr::V4(v4)),
            None => v6.is_loopback(),
        },
    }
}

/// Why a world server registration was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegisterFailReason {
    UnknownServer = 1,
    AlreadyRegistered = 2,
}

/// Shared, concurrently-updated realm directory
#[derive(Debug)]
pub struct WorldDirectory {
    entries: RwLock<Vec<WorldServerEntry>>,
    require_registration: bool,
}

impl WorldDirectory {
    /// Build the directory from configuration.
    ///
    /// When `require_registration` is set, entries stay offline until a world
    /// server registers for them.
    pub fn from_config(worlds: &[WorldServerConfig], require_registration: bool) -> Self {
        let entries = worlds
            .iter()
            .map(|config| {
                let mut entry = WorldServerEntry::from(config);
                entry.online = !require_registration;
                entry
            })
            .collect();

        Self {
            entries: RwLock::new(entries),
            require_registration,
        }
    }

    /// Look up an entry by id
    pub fn get(&self, id: u8) -> Option<WorldServerEntry> {
        self.entries.read().iter().find(|e| e.id == id).cloned()
    }

    /// All entries in configuration order
    pub fn list(&self) -> Vec<WorldServerEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Bind a world server link to an entry
    pub fn register(&self, id: u8, max_players: u16) -> Result<(), RegisterFailReason> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(RegisterFailReason::UnknownServer)?;

        if entry.linked {
            return Err(RegisterFailReason::AlreadyRegistered);
        }

        entry.linked = true;
        entry.online = true;
        if max_players > 0 {
            entry.max_players = max_players;
        }

        info!(server_id = id, max_players = entry.max_players, "World server online");
        Ok(())
    }

    /// Release a world server link
    pub fn unregister(&self, id: u8) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.linked = false;
            entry.online = !self.require_registration;
            entry.current_players = 0;
            info!(server_id = id, "World server link closed");
        }
    }

    /// Update the reported population of an entry
    pub fn set_population(&self, id: u8, current_players: u16) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.current_players = current_players;
        }
    }
}
