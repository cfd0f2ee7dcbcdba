//! Outbound calls from a node to the broker.
//!
//! [`BrokerLink`] is the seam between the node and its broker. The binary uses
//! [`TcpBrokerClient`]; tests plug in in-memory brokers.

use std::{future::Future, net::SocketAddr, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use tokio::{
    io::BufReader,
    net::{TcpStream, lookup_host},
    time::timeout,
};
use tracing::{info, warn};

use crate::{
    message::{BrokerRequest, BrokerResponse, EntityType, read_message, write_message},
    offer::Offer,
};

/// The two broker RPCs a node depends on.
pub trait BrokerLink: Send + Sync + 'static {
    /// Announces `name` as reachable at `address`. `Ok(false)` means the broker
    /// answered but declined the registration.
    fn register(&self, name: &str, address: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Sends the node's current offers and returns the ones it is missing.
    ///
    /// Any broker-side refusal must surface as `Err`.
    fn synchronize(
        &self,
        entity_id: &str,
        current_offers: Vec<Offer>,
    ) -> impl Future<Output = Result<Vec<Offer>>> + Send;
}

/// Best-effort startup registration. Failures are logged and never retried.
pub async fn register_node<B: BrokerLink>(link: &B, name: &str, address: &str) {
    match link.register(name, address).await {
        Ok(true) => info!(node = %name, %address, "registered with broker"),
        Ok(false) => warn!(node = %name, "broker rejected registration"),
        Err(error) => warn!(node = %name, error = ?error, "failed to register with broker"),
    }
}

/// Runs a resynchronization bounded by `deadline`.
///
/// An expired deadline is reported the same way as any other failure.
pub async fn resynchronize<B: BrokerLink>(
    link: &B,
    entity_id: &str,
    current_offers: Vec<Offer>,
    deadline: Duration,
) -> Result<Vec<Offer>> {
    match timeout(deadline, link.synchronize(entity_id, current_offers)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "synchronization timed out after {}ms",
            deadline.as_millis()
        )),
    }
}

/// JSON-lines broker client that opens one TCP connection per call.
#[derive(Debug, Clone)]
pub struct TcpBrokerClient {
    addr: SocketAddr,
}

impl TcpBrokerClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Resolves `host:port` once, failing if the name does not resolve.
    pub async fn resolve(target: &str) -> Result<Self> {
        let addr = lookup_host(target)
            .await
            .with_context(|| format!("failed to resolve broker address {target}"))?
            .next()
            .with_context(|| format!("broker address {target} resolved to nothing"))?;
        Ok(Self::new(addr))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn call(&self, request: &BrokerRequest) -> Result<BrokerResponse> {
        let stream = TcpStream::connect(self.addr)
            .await
            .with_context(|| format!("failed to connect to broker at {}", self.addr))?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_message(&mut writer, request).await?;
        match read_message::<_, BrokerResponse>(&mut reader).await? {
            Some(response) => Ok(response),
            None => bail!("broker closed the connection without responding"),
        }
    }
}

impl BrokerLink for TcpBrokerClient {
    async fn register(&self, name: &str, address: &str) -> Result<bool> {
        let request = BrokerRequest::RegisterNode {
            name: name.to_string(),
            address: address.to_string(),
        };
        match self.call(&request).await? {
            BrokerResponse::RegisterNode { success } => Ok(success),
            BrokerResponse::Error { message } => bail!("broker error: {message}"),
            other => bail!("unexpected broker response to registration: {other:?}"),
        }
    }

    async fn synchronize(&self, entity_id: &str, current_offers: Vec<Offer>) -> Result<Vec<Offer>> {
        let request = BrokerRequest::Synchronize {
            entity_id: entity_id.to_string(),
            entity_type: EntityType::Node,
            current_offers,
        };
        match self.call(&request).await? {
            BrokerResponse::Synchronize {
                success: true,
                missing_offers,
            } => Ok(missing_offers),
            BrokerResponse::Synchronize { success: false, .. } => {
                bail!("broker reported synchronization failure")
            }
            BrokerResponse::Error { message } => bail!("broker error: {message}"),
            other => bail!("unexpected broker response to synchronization: {other:?}"),
        }
    }
}
