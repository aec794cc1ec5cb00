//! Networking module
//!
//! This module handles all network-related functionality for the gateway:
//! - Length-prefixed frame codec and packet buffers
//! - Deadline-bounded framed transport
//! - Session registry
//! - Connection handling and accept loops

pub mod buffer;
pub mod handler;
pub mod listener;
pub mod session;
pub mod transport;

pub use listener::{accept_clients, accept_world_servers};
pub use session::{Session, SessionKey, SessionRegistry, SessionState};
