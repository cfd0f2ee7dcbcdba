//! A single replica node of a fault-injecting offer store.
//!
//! The broker pushes offers to the node, the node stores them idempotently,
//! and a time-windowed failure policy can knock the node into a simulated
//! outage. While down, the node rejects every request and a background task
//! keeps asking the broker for the offers it missed until one attempt
//! succeeds.
//!
//! - [`offer`] is the value type that flows through everything else.
//! - [`store`] keeps offers in arrival order, unique by id.
//! - [`failure`] decides when a write attempt triggers an outage.
//! - [`recovery`] runs the fixed-interval catch-up loop after an outage.
//! - [`broker_client`] holds the [`broker_client::BrokerLink`] seam and its
//!   TCP implementation.
//! - [`node`] ties the pieces together behind one lock.
//! - [`server`] accepts connections and maps wire requests onto the node.
//! - [`message`] provides the JSON line protocol for both directions.
//! - [`config`] and [`cli`] turn command-line flags into a validated setup.
//!
//! State lives in memory only and is gone when the process exits.

pub mod broker_client;
pub mod cli;
pub mod config;
pub mod failure;
pub mod message;
pub mod node;
pub mod offer;
pub mod recovery;
pub mod server;
pub mod store;

#[cfg(test)]
mod testing;
