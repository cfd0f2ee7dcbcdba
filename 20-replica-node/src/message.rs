use std::io;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::offer::Offer;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Requests the broker (or a test harness) sends to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeRequest {
    SubmitOffer {
        offer_id: String,
        product: String,
        price: i64,
    },
    ReadOffers,
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeResponse {
    SubmitOffer {
        accepted: bool,
    },
    ReadOffers {
        offers: Vec<Offer>,
        success: bool,
    },
    Status {
        node: String,
        outage_active: bool,
        outage_count: u64,
        stored_offers: usize,
        recovery_attempts: u64,
        clock_started: bool,
    },
    Error {
        message: String,
    },
}

/// Entity kinds the broker can resynchronize. Nodes only ever send `Node`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Node,
}

/// Requests a node sends to the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerRequest {
    RegisterNode {
        name: String,
        address: String,
    },
    Synchronize {
        entity_id: String,
        entity_type: EntityType,
        current_offers: Vec<Offer>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerResponse {
    RegisterNode {
        success: bool,
    },
    Synchronize {
        success: bool,
        #[serde(default)]
        missing_offers: Vec<Offer>,
    },
    Error {
        message: String,
    },
}

pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }

        let parsed = serde_json::from_str(trimmed).map_err(to_io_error)?;
        return Ok(Some(parsed));
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    // One JSON document per line, flushed so the peer sees it immediately.
    let mut encoded = serde_json::to_vec(message).map_err(to_io_error)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
