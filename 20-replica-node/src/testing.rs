//! In-memory broker used by the unit tests.

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use tokio::time::Instant;

use crate::{broker_client::BrokerLink, offer::Offer};

/// One recorded `synchronize` call.
#[derive(Debug, Clone)]
pub(crate) struct SyncCall {
    pub at: Instant,
    pub current_offers: Vec<Offer>,
}

#[derive(Debug, Default)]
struct Script {
    failures_before_success: usize,
    hang_on_first_call: bool,
    missing: Vec<Offer>,
    calls: Mutex<Vec<SyncCall>>,
    registrations: Mutex<Vec<(String, String)>>,
}

/// Broker that fails a fixed number of synchronizations, then succeeds.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedBroker {
    script: Arc<Script>,
}

impl ScriptedBroker {
    pub fn failing_times(failures: usize, missing: Vec<Offer>) -> Self {
        Self {
            script: Arc::new(Script {
                failures_before_success: failures,
                missing,
                ..Script::default()
            }),
        }
    }

    pub fn healthy(missing: Vec<Offer>) -> Self {
        Self::failing_times(0, missing)
    }

    pub fn failing_forever() -> Self {
        Self::failing_times(usize::MAX, Vec::new())
    }

    /// The first call never answers; later calls succeed.
    pub fn hanging_once(missing: Vec<Offer>) -> Self {
        Self {
            script: Arc::new(Script {
                hang_on_first_call: true,
                missing,
                ..Script::default()
            }),
        }
    }

    pub fn calls(&self) -> usize {
        self.script.calls.lock().unwrap().len()
    }

    pub fn call_log(&self) -> Vec<SyncCall> {
        self.script.calls.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> Vec<(String, String)> {
        self.script.registrations.lock().unwrap().clone()
    }
}

impl BrokerLink for ScriptedBroker {
    async fn register(&self, name: &str, address: &str) -> Result<bool> {
        self.script
            .registrations
            .lock()
            .unwrap()
            .push((name.to_string(), address.to_string()));
        Ok(true)
    }

    async fn synchronize(&self, _entity_id: &str, current_offers: Vec<Offer>) -> Result<Vec<Offer>> {
        let call_number = {
            let mut calls = self.script.calls.lock().unwrap();
            calls.push(SyncCall {
                at: Instant::now(),
                current_offers,
            });
            calls.len()
        };

        if self.script.hang_on_first_call && call_number == 1 {
            std::future::pending::<()>().await;
        }
        if call_number <= self.script.failures_before_success {
            bail!("scripted failure #{call_number}");
        }
        Ok(self.script.missing.clone())
    }
}
