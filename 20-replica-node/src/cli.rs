use std::net::SocketAddr;

use clap::Parser;

use crate::{
    config::{DEFAULT_BROKER_PORT, DEFAULT_FAILURE_PROBABILITY},
    recovery::{DEFAULT_RECOVERY_DELAY, DEFAULT_SYNC_TIMEOUT},
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Run a fault-injecting replica node", long_about = None)]
pub struct Cli {
    /// Node identity: DB1, DB2 or DB3.
    #[arg(long)]
    pub node: String,

    /// Socket address to listen on. Defaults to 0.0.0.0 on the node's reference port.
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Address advertised to the broker. Defaults to localhost on the bound port.
    #[arg(long, env = "NODE_ADDRESS")]
    pub address: Option<String>,

    /// Host name of the broker.
    #[arg(long, env = "BROKER_HOST", default_value = "broker")]
    pub broker_host: String,

    #[arg(long, default_value_t = DEFAULT_BROKER_PORT)]
    pub broker_port: u16,

    /// Chance, per write inside the failure window, of a simulated outage.
    #[arg(long, default_value_t = DEFAULT_FAILURE_PROBABILITY)]
    pub failure_probability: f64,

    /// Wait before each recovery attempt.
    #[arg(long, default_value_t = DEFAULT_RECOVERY_DELAY.as_millis() as u64)]
    pub recovery_delay_ms: u64,

    /// Deadline for a single resynchronization call.
    #[arg(long, default_value_t = DEFAULT_SYNC_TIMEOUT.as_millis() as u64)]
    pub sync_timeout_ms: u64,

    /// Seed for the failure dice. Random per process when omitted.
    #[arg(long)]
    pub seed: Option<u64>,
}
