use std::future::Future;
use std::time::Duration;

use node_client::NodeError;
use tokio::time::sleep;
use tracing::{error, warn};

/// Bounded retry for read-only node calls. Writes are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub spacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            spacing: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: usize, spacing: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            spacing,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &'static str, mut op: F) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    warn!(
                        target: "battle::sync",
                        call = label,
                        attempt,
                        error = %err,
                        "read attempt failed"
                    );
                    if attempt >= attempts {
                        error!(target: "battle::sync", call = label, "exhausted read attempts");
                        return Err(err);
                    }
                    attempt += 1;
                    sleep(self.spacing).await;
                }
            }
        }
    }
}
