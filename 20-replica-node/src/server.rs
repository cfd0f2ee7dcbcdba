use std::{future::Future, io, net::SocketAddr};

use anyhow::{Result, bail};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    broker_client::BrokerLink,
    message::{NodeRequest, NodeResponse, read_message, write_message},
    node::Node,
    offer::Offer,
};

/// Accepts inbound connections and serves node requests on them.
pub struct NodeServer<B> {
    listener: TcpListener,
    node: Node<B>,
}

impl<B: BrokerLink> NodeServer<B> {
    pub fn new(listener: TcpListener, node: Node<B>) -> Self {
        Self { listener, node }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `shutdown` resolves, then stops the node's recovery task.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let NodeServer { listener, node } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!(node = %node.identity(), "node shutting down");
                    node.shutdown().await;
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &node);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result<B: BrokerLink>(
    result: io::Result<(TcpStream, SocketAddr)>,
    node: &Node<B>,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, node),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler<B: BrokerLink>(stream: TcpStream, peer: SocketAddr, node: &Node<B>) {
    let node = node.clone();
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, node).await {
            warn!(peer = %peer, error = ?err, "connection closed with error");
        }
    });
}

async fn handle_connection<B: BrokerLink>(stream: TcpStream, node: Node<B>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let request = match read_message::<_, NodeRequest>(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                let reply = NodeResponse::Error {
                    message: format!("malformed request: {err}"),
                };
                if let Err(write_err) = write_message(&mut writer, &reply).await {
                    debug!(error = ?write_err, "failed to report malformed request");
                }
                bail!("malformed request: {err}");
            }
            Err(err) => return Err(err.into()),
        };

        let response = dispatch(&node, request).await;
        write_message(&mut writer, &response).await?;
    }

    Ok(())
}

/// Maps one wire request onto the node.
pub async fn dispatch<B: BrokerLink>(node: &Node<B>, request: NodeRequest) -> NodeResponse {
    match request {
        NodeRequest::SubmitOffer {
            offer_id,
            product,
            price,
        } => NodeResponse::SubmitOffer {
            accepted: node.submit_offer(Offer::new(offer_id, product, price)).await,
        },
        NodeRequest::ReadOffers => match node.read_offers().await {
            Some(offers) => NodeResponse::ReadOffers {
                offers,
                success: true,
            },
            None => NodeResponse::ReadOffers {
                offers: Vec::new(),
                success: false,
            },
        },
        NodeRequest::Status => {
            let status = node.status().await;
            NodeResponse::Status {
                node: status.identity,
                outage_active: status.outage_active,
                outage_count: status.outage_count,
                stored_offers: status.stored_offers,
                recovery_attempts: status.recovery_attempts,
                clock_started: status.clock_started,
            }
        }
    }
}
