use std::time::Duration;

use crate::sync::RetryPolicy;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_VOTE_WAIT: Duration = Duration::from_secs(30);

/// Timing knobs for the pollers and the submission trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// How long the submitter waits for every player's visibility vote.
    pub vote_wait: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            vote_wait: DEFAULT_VOTE_WAIT,
        }
    }
}

impl SyncConfig {
    pub fn from_millis(poll_ms: u64, attempts: usize, spacing_ms: u64, vote_wait_secs: u64) -> Self {
        Self {
            poll_interval: Duration::from_millis(poll_ms.max(1)),
            retry: RetryPolicy::new(attempts, Duration::from_millis(spacing_ms)),
            vote_wait: Duration::from_secs(vote_wait_secs),
        }
    }
}
