use std::sync::Arc;
use std::time::Duration;

use battle_proto::{RemovedLog, SolutionLog, VoteTally};
use node_client::NodeError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SyncConfig;

use super::{BattleNode, ReconcileReport, Reconciler, RetryPolicy, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollTarget {
    SolutionLog,
    RemovedLog,
    VoteTally,
}

impl PollTarget {
    pub const ALL: [PollTarget; 3] = [
        PollTarget::SolutionLog,
        PollTarget::RemovedLog,
        PollTarget::VoteTally,
    ];

    fn label(self) -> &'static str {
        match self {
            PollTarget::SolutionLog => "get_current_solution",
            PollTarget::RemovedLog => "get_removed_cells",
            PollTarget::VoteTally => "get_vote_solution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutput {
    SolutionLog(SolutionLog),
    RemovedLog(RemovedLog),
    VoteTally(VoteTally),
}

/// Re-reads the node's logs and vote tally on a fixed interval.
pub struct PollingReader {
    node: BattleNode,
    reconciler: Arc<Reconciler>,
    interval: Duration,
    retry: RetryPolicy,
    tally: watch::Sender<VoteTally>,
}

impl PollingReader {
    pub fn new(node: BattleNode, reconciler: Arc<Reconciler>, config: &SyncConfig) -> Self {
        let (tally, _) = watch::channel(VoteTally::default());
        Self {
            node,
            reconciler,
            interval: config.poll_interval,
            retry: config.retry,
            tally,
        }
    }

    /// Latest vote tally seen by the tally poller.
    pub fn tally(&self) -> watch::Receiver<VoteTally> {
        self.tally.subscribe()
    }

    /// One fetch of `target`, retried on transient failures.
    pub async fn poll_once(&self, target: PollTarget) -> Result<PollOutput, NodeError> {
        let node = &self.node;
        match target {
            PollTarget::SolutionLog => self
                .retry
                .run(target.label(), || node.current_solution())
                .await
                .map(PollOutput::SolutionLog),
            PollTarget::RemovedLog => self
                .retry
                .run(target.label(), || node.removed_cells())
                .await
                .map(PollOutput::RemovedLog),
            PollTarget::VoteTally => self
                .retry
                .run(target.label(), || node.vote_tally())
                .await
                .map(PollOutput::VoteTally),
        }
    }

    /// Fetches `target` and folds the result into the session.
    pub async fn tick(&self, target: PollTarget) -> Result<ReconcileReport, SyncError> {
        match self.poll_once(target).await? {
            PollOutput::SolutionLog(log) => self.reconciler.apply_solution_log(&log),
            PollOutput::RemovedLog(log) => self.reconciler.apply_removed_log(&log),
            PollOutput::VoteTally(tally) => {
                self.tally.send_if_modified(|current| {
                    if *current == tally {
                        return false;
                    }
                    debug!(
                        target: "battle::poll",
                        public = tally.want_public.len(),
                        private = tally.want_private.len(),
                        "vote tally changed"
                    );
                    *current = tally;
                    true
                });
                Ok(ReconcileReport::default())
            }
        }
    }

    /// Starts one task per target. They stop once `cancel` fires.
    pub fn spawn(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        PollTarget::ALL
            .into_iter()
            .map(|target| {
                let reader = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { reader.run(target, cancel).await })
            })
            .collect()
    }

    async fn run(&self, target: PollTarget, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(target: "battle::poll", poller = target.label(), interval_ms = self.interval.as_millis() as u64, "poller started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.tick(target) => result,
            };
            if let Err(err) = result {
                warn!(target: "battle::poll", poller = target.label(), error = %err, "poll failed");
            }
        }
        debug!(target: "battle::poll", poller = target.label(), "poller stopped");
    }
}
