use tokio::time::Instant;

/// Reconciliation history of one peer, kept for diagnostics.
#[derive(Clone, Debug, Default)]
pub struct PeerSyncState {
    last_attempt: Option<Instant>,
    last_success: Option<Instant>,
    /// Resets on success
    consecutive_failures: u32,
    last_error: Option<String>,
    /// Set when the last cycle exhausted every attempt
    unreachable: bool,
    success_count: u64,
}

impl PeerSyncState {
    pub(crate) fn on_attempt(&mut self) {
        self.last_attempt = Some(Instant::now());
    }

    pub(crate) fn on_success(&mut self) {
        self.last_success = Some(Instant::now());
        self.consecutive_failures = 0;
        self.last_error = None;
        self.unreachable = false;
        self.success_count += 1;
    }

    pub(crate) fn on_failure(&mut self, error: String, unreachable: bool) {
        self.consecutive_failures += 1;
        self.last_error = Some(error);
        self.unreachable = unreachable;
    }

    #[must_use]
    pub const fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    #[must_use]
    pub const fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    #[must_use]
    pub const fn success_count(&self) -> u64 {
        self.success_count
    }
}
