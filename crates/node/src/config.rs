//! Coordinator timing and concurrency settings.

use std::time::Duration;

use keysync_recon::SessionConfig;

/// Time between scheduled reconciliation cycles (5 minutes)
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Wall-clock budget of one session against one peer
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Upper bound on a single request/response exchange
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;

/// Peers reconciled at the same time
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Sessions attempted per peer and cycle before it is marked unreachable
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_BACKOFF_BASE_MILLIS: u64 = 500;

pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 30;

/// Identifiers requested from a peer's key interface per call
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 100;

pub const DEFAULT_REBUILD_TIMEOUT_SECS: u64 = 1_800;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub interval: Duration,
    pub session_timeout: Duration,
    pub call_timeout: Duration,
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub fetch_batch_size: usize,
    pub rebuild_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MILLIS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
            rebuild_timeout: Duration::from_secs(DEFAULT_REBUILD_TIMEOUT_SECS),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            session_timeout: self.session_timeout,
            call_timeout: self.call_timeout,
            ..SessionConfig::default()
        }
    }

    /// Delay before retry number `attempt`, counting from zero.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.backoff_max)
    }
}
