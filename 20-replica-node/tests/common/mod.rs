#![allow(dead_code)]

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use replica_node::message::{BrokerRequest, BrokerResponse, read_message, write_message};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

type Replies = Arc<Mutex<VecDeque<BrokerResponse>>>;

/// Minimal JSON-lines broker: accepts every registration and answers
/// synchronizations from a script whose last entry repeats.
pub struct StubBroker {
    pub addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<BrokerRequest>,
    task: JoinHandle<()>,
}

impl StubBroker {
    pub async fn start(sync_replies: Vec<BrokerResponse>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, requests) = mpsc::unbounded_channel();
        let replies: Replies = Arc::new(Mutex::new(VecDeque::from(sync_replies)));

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                let replies = Arc::clone(&replies);
                tokio::spawn(async move {
                    let _ = serve(stream, tx, replies).await;
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            task,
        })
    }

    pub async fn next_request(&mut self) -> Result<BrokerRequest> {
        timeout(READ_TIMEOUT, self.requests.recv())
            .await
            .context("timed out waiting for a broker request")?
            .context("stub broker stopped")
    }
}

impl Drop for StubBroker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    tx: mpsc::UnboundedSender<BrokerRequest>,
    replies: Replies,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let Some(request) = read_message::<_, BrokerRequest>(&mut reader).await? else {
        return Ok(());
    };
    let response = match &request {
        BrokerRequest::RegisterNode { .. } => BrokerResponse::RegisterNode { success: true },
        BrokerRequest::Synchronize { .. } => next_reply(&replies),
    };
    let _ = tx.send(request);
    write_message(&mut writer, &response).await?;
    Ok(())
}

fn next_reply(replies: &Mutex<VecDeque<BrokerResponse>>) -> BrokerResponse {
    let mut replies = replies.lock().unwrap();
    if replies.len() > 1 {
        replies.pop_front().unwrap()
    } else {
        replies
            .front()
            .cloned()
            .unwrap_or(BrokerResponse::Synchronize {
                success: true,
                missing_offers: Vec::new(),
            })
    }
}
