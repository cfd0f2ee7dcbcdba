//! Background catch-up after a simulated outage.
//!
//! One recovery task runs per outage episode. It sleeps for a fixed delay,
//! asks the broker for the offers the node missed, and either brings the node
//! back or goes around again. There is no retry limit and no backoff growth.

use std::time::Duration;

use tokio::{task::JoinHandle, time::sleep};
use tracing::{info, warn};

use crate::{
    broker_client::{BrokerLink, resynchronize},
    node::Node,
};

pub const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing for the recovery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySettings {
    /// Wait before every attempt, including the first.
    pub delay: Duration,
    /// Deadline for a single resynchronization call.
    pub sync_timeout: Duration,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECOVERY_DELAY,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}

/// Handle to a running recovery episode.
///
/// Dropping the handle detaches the task; call [`RecoveryHandle::cancel`] to
/// stop it.
#[derive(Debug)]
pub struct RecoveryHandle {
    task: JoinHandle<()>,
}

impl RecoveryHandle {
    pub(crate) fn spawn<B: BrokerLink>(node: Node<B>) -> Self {
        Self {
            task: tokio::spawn(run(node)),
        }
    }

    /// Aborts the task and waits for it to unwind.
    pub async fn cancel(self) {
        self.task.abort();
        if let Err(error) = self.task.await {
            if !error.is_cancelled() {
                warn!(error = ?error, "recovery task ended abnormally");
            }
        }
    }
}

async fn run<B: BrokerLink>(node: Node<B>) {
    let settings = node.recovery_settings();
    let name = node.identity().to_string();
    info!(node = %name, delay_ms = settings.delay.as_millis() as u64, "recovery scheduled");

    loop {
        sleep(settings.delay).await;
        info!(node = %name, "starting resynchronization");

        // Snapshot under the lock; the network call below runs without it.
        let snapshot = node.begin_recovery_attempt().await;

        match resynchronize(node.broker(), &name, snapshot, settings.sync_timeout).await {
            Ok(missing) => {
                let added = node.complete_recovery(missing).await;
                info!(node = %name, added, "resynchronized, node fully recovered");
                return;
            }
            Err(error) => {
                warn!(
                    node = %name,
                    error = ?error,
                    retry_in_ms = settings.delay.as_millis() as u64,
                    "resynchronization failed, retrying"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        failure::{EligibilityWindow, FailurePolicy, FailureSimulator},
        offer::Offer,
        testing::ScriptedBroker,
    };

    const DELAY: Duration = Duration::from_secs(5);

    fn settings() -> RecoverySettings {
        RecoverySettings {
            delay: DELAY,
            sync_timeout: Duration::from_secs(30),
        }
    }

    /// Node that accepts writes for the first `healthy_for` and fails every write after.
    fn node_failing_after(healthy_for: Duration, broker: ScriptedBroker) -> Node<ScriptedBroker> {
        let policy =
            FailurePolicy::new(1.0, EligibilityWindow::starting_at(healthy_for)).unwrap();
        Node::new("DB2", FailureSimulator::seeded(policy, 3), settings(), broker)
    }

    async fn wait_until_recovered(node: &Node<ScriptedBroker>) {
        for _ in 0..1000 {
            if !node.status().await.outage_active {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("node never left outage");
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_merges_only_missing_offers() {
        let a = Offer::new("a", "TV", 500);
        let b = Offer::new("b", "Phone", 300);
        let broker = ScriptedBroker::healthy(vec![a.clone(), b.clone()]);
        let node = node_failing_after(Duration::from_secs(10), broker.clone());

        assert!(node.submit_offer(a.clone()).await);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!node.submit_offer(Offer::new("c", "Laptop", 900)).await);

        wait_until_recovered(&node).await;

        assert_eq!(node.read_offers().await, Some(vec![a.clone(), b]));
        let log = broker.call_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].current_offers, vec![a]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_at_a_fixed_interval_until_success() {
        const FAILURES: usize = 4;
        let broker = ScriptedBroker::failing_times(FAILURES, Vec::new());
        let node = node_failing_after(Duration::ZERO, broker.clone());

        let outage_at = tokio::time::Instant::now();
        assert!(!node.submit_offer(Offer::new("o1", "TV", 500)).await);
        wait_until_recovered(&node).await;

        let log = broker.call_log();
        assert_eq!(log.len(), FAILURES + 1);
        assert_eq!(log[0].at - outage_at, DELAY);
        for pair in log.windows(2) {
            assert_eq!(pair[1].at - pair[0].at, DELAY);
        }

        let status = node.status().await;
        assert_eq!(status.recovery_attempts, (FAILURES + 1) as u64);
        assert_eq!(status.outage_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_synchronization_counts_as_failure() {
        let broker = ScriptedBroker::hanging_once(vec![Offer::new("late", "Radio", 20)]);
        let node = node_failing_after(Duration::ZERO, broker.clone());

        assert!(!node.submit_offer(Offer::new("o1", "TV", 500)).await);
        wait_until_recovered(&node).await;

        let log = broker.call_log();
        assert_eq!(log.len(), 2);
        // Attempt, 30s deadline, then the usual delay before trying again.
        assert_eq!(log[1].at - log[0].at, Duration::from_secs(30) + DELAY);
        assert_eq!(node.status().await.stored_offers, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_during_recovery_stay_rejected() {
        let broker = ScriptedBroker::failing_times(2, Vec::new());
        let node = node_failing_after(Duration::ZERO, broker.clone());

        assert!(!node.submit_offer(Offer::new("o1", "TV", 500)).await);
        sleep(DELAY * 2 + Duration::from_secs(1)).await;
        assert!(node.status().await.outage_active);
        assert!(!node.submit_offer(Offer::new("o2", "TV", 500)).await);
        assert!(node.read_offers().await.is_none());

        wait_until_recovered(&node).await;
        assert_eq!(node.read_offers().await, Some(Vec::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn recovered_node_can_fail_again() {
        let broker = ScriptedBroker::healthy(Vec::new());
        let node = node_failing_after(Duration::ZERO, broker.clone());

        assert!(!node.submit_offer(Offer::new("o1", "TV", 500)).await);
        wait_until_recovered(&node).await;
        assert!(!node.submit_offer(Offer::new("o2", "TV", 500)).await);
        wait_until_recovered(&node).await;

        let status = node.status().await;
        assert_eq!(status.outage_count, 2);
        assert_eq!(broker.calls(), 2);
    }
}
