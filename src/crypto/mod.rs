//! Cryptography module
//!
//! Each connection owns one [`CryptoContext`] holding two unrelated cipher
//! disciplines:
//! - Blowfish for the player login channel
//! - a rolling-key XOR stream cipher for the world-server link

pub mod login_cipher;
pub mod world_cipher;

// Re-export commonly used types
pub use login_cipher::{LoginCipher, DEFAULT_LOGIN_KEY};
pub use world_cipher::{generate_world_key, WorldCipher, WORLD_KEY_SIZE};

/// Per-connection key material. Never shared between connections.
#[derive(Debug, Default)]
pub struct CryptoContext {
    pub login: LoginCipher,
    pub world: WorldCipher,
}

impl CryptoContext {
    pub fn new() -> Self {
        Self::default()
    }
}
