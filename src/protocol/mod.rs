//! Protocol module
//!
//! This module contains the gateway's two wire protocols:
//! - Login protocol (player authentication and realm selection)
//! - World link protocol (world server registration and status)

pub mod login;
pub mod packets;
pub mod world;
