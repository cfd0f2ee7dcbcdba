//! The replica node: offer store, failure gate, and outage state behind one lock.
//!
//! [`Node`] is a cheap-to-clone handle. Every read and write of [`NodeState`]
//! happens while holding its single mutex, and no handler awaits anything
//! else while the lock is held. The recovery task is the only other party
//! that touches the state, and it releases the lock around its broker call.

use std::sync::Arc;

use tokio::{sync::Mutex, time::Instant};
use tracing::{info, warn};

use crate::{
    broker_client::{BrokerLink, register_node},
    failure::FailureSimulator,
    offer::Offer,
    recovery::{RecoveryHandle, RecoverySettings},
    store::{InsertOutcome, OfferStore},
};

/// Mutable state of one node. Only reachable through [`Node`].
#[derive(Debug)]
struct NodeState {
    store: OfferStore,
    outage_active: bool,
    outage_count: u64,
    /// Set by the first write attempt, never reset.
    clock_origin: Option<Instant>,
    simulator: FailureSimulator,
    recovery_attempts: u64,
    recovery: Option<RecoveryHandle>,
    /// Set by [`Node::shutdown`]; no recovery task is spawned afterwards.
    shut_down: bool,
}

struct NodeInner<B> {
    identity: String,
    recovery_settings: RecoverySettings,
    broker: B,
    state: Mutex<NodeState>,
}

/// Point-in-time view of a node for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub identity: String,
    pub outage_active: bool,
    pub outage_count: u64,
    pub stored_offers: usize,
    pub recovery_attempts: u64,
    pub clock_started: bool,
}

pub struct Node<B> {
    inner: Arc<NodeInner<B>>,
}

impl<B> Clone for Node<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BrokerLink> Node<B> {
    pub fn new(
        identity: impl Into<String>,
        simulator: FailureSimulator,
        recovery_settings: RecoverySettings,
        broker: B,
    ) -> Self {
        let state = NodeState {
            store: OfferStore::new(),
            outage_active: false,
            outage_count: 0,
            clock_origin: None,
            simulator,
            recovery_attempts: 0,
            recovery: None,
            shut_down: false,
        };
        Self {
            inner: Arc::new(NodeInner {
                identity: identity.into(),
                recovery_settings,
                broker,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn broker(&self) -> &B {
        &self.inner.broker
    }

    pub fn recovery_settings(&self) -> RecoverySettings {
        self.inner.recovery_settings
    }

    /// Announces this node to the broker. Best effort, never retried.
    pub async fn register(&self, address: &str) {
        register_node(&self.inner.broker, &self.inner.identity, address).await;
    }

    /// Accepts an offer unless the node is (or just went) down.
    ///
    /// Returns `true` for both fresh and duplicate offers.
    pub async fn submit_offer(&self, offer: Offer) -> bool {
        let name = self.identity();
        let mut state = self.inner.state.lock().await;
        let now = Instant::now();

        let origin = match state.clock_origin {
            Some(origin) => origin,
            None => {
                info!(node = %name, "failure clock started by first offer");
                *state.clock_origin.insert(now)
            }
        };

        if state.outage_active {
            info!(node = %name, offer_id = %offer.offer_id, "in outage, rejecting offer");
            return false;
        }

        if state.simulator.should_fail(now.duration_since(origin)) {
            self.enter_outage(&mut state);
            return false;
        }

        match state.store.insert(offer.clone()) {
            InsertOutcome::Accepted => {
                info!(
                    node = %name,
                    offer_id = %offer.offer_id,
                    product = %offer.product,
                    price = offer.price,
                    total = state.store.len(),
                    "stored offer"
                );
            }
            InsertOutcome::Duplicate => {
                info!(node = %name, offer_id = %offer.offer_id, "duplicate offer ignored");
            }
        }
        true
    }

    /// Returns every stored offer, or `None` while the node is in outage.
    pub async fn read_offers(&self) -> Option<Vec<Offer>> {
        let state = self.inner.state.lock().await;
        if state.outage_active {
            return None;
        }
        info!(node = %self.identity(), count = state.store.len(), "serving offers");
        Some(state.store.read_all())
    }

    pub async fn status(&self) -> NodeStatus {
        let state = self.inner.state.lock().await;
        NodeStatus {
            identity: self.inner.identity.clone(),
            outage_active: state.outage_active,
            outage_count: state.outage_count,
            stored_offers: state.store.len(),
            recovery_attempts: state.recovery_attempts,
            clock_started: state.clock_origin.is_some(),
        }
    }

    /// Stops any in-flight recovery task. The node stays in whatever state it
    /// was in, and an outage entered after this point is never recovered.
    pub async fn shutdown(&self) {
        let recovery = {
            let mut state = self.inner.state.lock().await;
            state.shut_down = true;
            state.recovery.take()
        };
        if let Some(recovery) = recovery {
            recovery.cancel().await;
        }
    }

    fn enter_outage(&self, state: &mut NodeState) {
        state.outage_active = true;
        state.outage_count += 1;
        warn!(
            node = %self.identity(),
            probability_pct = state.simulator.policy().probability() * 100.0,
            outage = state.outage_count,
            recovery_in_ms = self.inner.recovery_settings.delay.as_millis() as u64,
            "simulated outage"
        );
        if state.shut_down {
            warn!(node = %self.identity(), "node is shut down, not scheduling recovery");
            return;
        }
        state.recovery = Some(RecoveryHandle::spawn(self.clone()));
    }

    /// Counts an attempt and returns the snapshot to send to the broker.
    pub(crate) async fn begin_recovery_attempt(&self) -> Vec<Offer> {
        let mut state = self.inner.state.lock().await;
        state.recovery_attempts += 1;
        state.store.read_all()
    }

    /// Merges the broker's missing offers and leaves outage.
    ///
    /// This is the only place `outage_active` is cleared.
    pub(crate) async fn complete_recovery(&self, missing: Vec<Offer>) -> usize {
        let mut state = self.inner.state.lock().await;
        let added = state.store.merge(missing);
        state.outage_active = false;
        added
    }
}
