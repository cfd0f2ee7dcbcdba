//! Startup configuration for a node.
//!
//! Everything here is validated once, before the listener is bound. Any error
//! is fatal to startup.

use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Result, bail, ensure};

use crate::{
    cli::Cli,
    failure::{EligibilityWindow, FailurePolicy, FailureSimulator},
    recovery::RecoverySettings,
};

pub const DEFAULT_FAILURE_PROBABILITY: f64 = 0.1;
pub const DEFAULT_BROKER_PORT: u16 = 50051;

/// Port and failure window of one of the reference identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceProfile {
    pub identity: &'static str,
    pub port: u16,
    pub window: EligibilityWindow,
}

impl ReferenceProfile {
    /// Looks up the profile for `identity`, rejecting anything outside DB1..DB3.
    pub fn lookup(identity: &str) -> Result<Self> {
        let secs = Duration::from_secs;
        let profile = match identity {
            "DB1" => Self {
                identity: "DB1",
                port: 50052,
                window: EligibilityWindow::half_open(secs(0), secs(30))?,
            },
            "DB2" => Self {
                identity: "DB2",
                port: 50053,
                window: EligibilityWindow::closed(secs(40), secs(70))?,
            },
            "DB3" => Self {
                identity: "DB3",
                port: 50054,
                window: EligibilityWindow::starting_at(secs(80)),
            },
            other => bail!("invalid node identity '{other}': expected DB1, DB2 or DB3"),
        };
        Ok(profile)
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub identity: String,
    pub listen: SocketAddr,
    /// Explicit address to advertise; `None` falls back to the bound port.
    pub advertise: Option<String>,
    /// Broker `host:port`.
    pub broker: String,
    pub policy: FailurePolicy,
    pub recovery: RecoverySettings,
    pub seed: Option<u64>,
}

impl NodeConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let profile = ReferenceProfile::lookup(&cli.node)?;
        let policy = FailurePolicy::new(cli.failure_probability, profile.window)?;
        ensure!(cli.recovery_delay_ms > 0, "recovery delay must be at least 1ms");
        ensure!(cli.sync_timeout_ms > 0, "sync timeout must be at least 1ms");
        let listen = cli
            .listen
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, profile.port)));

        Ok(Self {
            identity: profile.identity.to_string(),
            listen,
            advertise: cli.address.clone().filter(|address| !address.trim().is_empty()),
            broker: format!("{}:{}", cli.broker_host, cli.broker_port),
            policy,
            recovery: RecoverySettings {
                delay: Duration::from_millis(cli.recovery_delay_ms),
                sync_timeout: Duration::from_millis(cli.sync_timeout_ms),
            },
            seed: cli.seed,
        })
    }

    /// Builds this node's failure simulator with its own random source.
    pub fn simulator(&self) -> FailureSimulator {
        match self.seed {
            Some(seed) => FailureSimulator::seeded(self.policy, seed),
            None => FailureSimulator::from_entropy(self.policy),
        }
    }

    pub fn advertised_address(&self, bound: SocketAddr) -> String {
        self.advertise
            .clone()
            .unwrap_or_else(|| format!("localhost:{}", bound.port()))
    }
}
