//! Error handling module
//!
//! Defines custom error types for the Realmgate login gateway.

use std::io;

use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Cipher errors
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Account store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timeout")]
    Timeout,

    #[error("Too many connections from {0}")]
    TooManyConnections(String),

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),
}

/// Protocol-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Insufficient data: expected {expected} bytes, {actual} available")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Unterminated string")]
    UnterminatedString,

    #[error("Invalid packet size: expected at least {expected}, got {actual}")]
    InvalidPacketSize { expected: usize, actual: usize },

    #[error("Packet too large: {size} bytes (max: {max})")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Empty packet body")]
    EmptyPacket,

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),
}

/// Cipher errors. Any of these on a live connection is a protocol violation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key length: {0} bytes")]
    InvalidKeyLength(usize),

    #[error("Cipher not initialized")]
    NotInitialized,

    #[error("Ciphertext length {0} is not a multiple of the block size")]
    UnalignedCiphertext(usize),
}

/// Account store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failure reason codes carried by login-fail and play-fail packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FailureReason {
    /// Internal fault on the gateway side
    SystemError = 0x01,
    /// Password did not match
    PassWrong = 0x02,
    /// Unknown user or wrong password
    UserOrPassWrong = 0x03,
    /// Access denied
    AccessFailed = 0x04,
    /// Account is already in use
    AccountInUse = 0x07,
    /// Server is full
    ServerOverloaded = 0x0f,
    /// Server is under maintenance
    ServerMaintenance = 0x10,
    /// Temporary password has expired
    TempPassExpired = 0x11,
    /// Too many clients from the same machine
    DualBox = 0x23,
}

impl FailureReason {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x01 => Some(FailureReason::SystemError),
            0x02 => Some(FailureReason::PassWrong),
            0x03 => Some(FailureReason::UserOrPassWrong),
            0x04 => Some(FailureReason::AccessFailed),
            0x07 => Some(FailureReason::AccountInUse),
            0x0f => Some(FailureReason::ServerOverloaded),
            0x10 => Some(FailureReason::ServerMaintenance),
            0x11 => Some(FailureReason::TempPassExpired),
            0x23 => Some(FailureReason::DualBox),
            _ => None,
        }
    }
}
