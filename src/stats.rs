//! Process-wide login statistics
//!
//! Counters only ever increase. Every connection task bumps them
//! concurrently, so each one is an independent atomic.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared abuse/usage counters
#[derive(Debug, Default)]
pub struct GatewayStats {
    successful_logins: AtomicU64,
    failed_logins: AtomicU64,
    successful_account_creations: AtomicU64,
    failed_account_creations: AtomicU64,
    hack_attempts: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub successful_logins: u64,
    pub failed_logins: u64,
    pub successful_account_creations: u64,
    pub failed_account_creations: u64,
    pub hack_attempts: u64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_successful_login(&self) {
        self.successful_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_login(&self) {
        self.failed_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_successful_account_creation(&self) {
        self.successful_account_creations
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_account_creation(&self) {
        self.failed_account_creations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hack_attempt(&self) {
        self.hack_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters. Each value is individually exact; the set as a
    /// whole may straddle concurrent updates.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            successful_logins: self.successful_logins.load(Ordering::Relaxed),
            failed_logins: self.failed_logins.load(Ordering::Relaxed),
            successful_account_creations: self
                .successful_account_creations
                .load(Ordering::Relaxed),
            failed_account_creations: self.failed_account_creations.load(Ordering::Relaxed),
            hack_attempts: self.hack_attempts.load(Ordering::Relaxed),
        }
    }
}
