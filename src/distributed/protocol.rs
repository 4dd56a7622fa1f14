//! Distributed mode protocol
//!
//! Messages exchanged between the controller, the broker and remote workers. The
//! protocol uses MessagePack (rmp-serde) for compact binary serialization with full
//! serde feature support.
//!
//! # Protocol Version
//!
//! Current version: 1. Every request carries `protocol_version`; servers reply with
//! `Message::Error` when it does not match their own.
//!
//! # Message Flow
//!
//! ```text
//! Controller                 Broker                      Worker (xN)
//!     |                         |                            |
//!     |--- TurnRequest -------->|                            |
//!     |                         |--- PartitionRequest ------>|
//!     |                         |<-- PartitionResponse ------|
//!     |<-- TurnResponse --------|                            |
//!     |                         |                            |
//!     |--- AliveCountRequest -->|                            |
//!     |<-- AliveCountResponse --|                            |
//!     |                         |                            |
//!     |--- ShutdownRequest ---->|--- ShutdownRequest ------->|
//!     |                         |<-- ShutdownResponse -------|
//!     |<-- ShutdownResponse ----|                            |
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```
//!
//! Frames larger than `MAX_FRAME_BYTES` are rejected before the body is read.

use crate::grid::{Cell, Grid};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body (256 MiB)
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Run parameters shared by every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    pub turns: usize,
    pub threads: usize,
    pub image_width: usize,
    pub image_height: usize,
}

/// Request kinds a server dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    TurnCompute,
    PartitionCompute,
    AliveCount,
    Shutdown,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::TurnCompute => "TurnCompute",
            MessageKind::PartitionCompute => "PartitionCompute",
            MessageKind::AliveCount => "AliveCount",
            MessageKind::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Compute one whole turn (Controller → Broker)
    TurnRequest(TurnRequest),

    /// Next grid for a turn (Broker → Controller)
    TurnResponse(TurnResponse),

    /// Compute one row partition (Broker → Worker)
    ///
    /// Carries the whole grid so the worker can look up neighbours across the
    /// partition boundary.
    PartitionRequest(PartitionRequest),

    /// Rows of a computed partition (Worker → Broker)
    PartitionResponse(PartitionResponse),

    /// Count live cells of a grid (Controller → Broker)
    AliveCountRequest(AliveCountRequest),

    /// Live cell count (Broker → Controller)
    AliveCountResponse(AliveCountResponse),

    /// Stop serving (Controller → Broker, Broker → Worker)
    ShutdownRequest(ShutdownRequest),

    /// Acknowledges a shutdown; the server stops after sending it
    ShutdownResponse(ShutdownResponse),

    /// Request failed on the server
    Error(ErrorMessage),
}

impl Message {
    /// Request kind, or `None` for replies
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Message::TurnRequest(_) => Some(MessageKind::TurnCompute),
            Message::PartitionRequest(_) => Some(MessageKind::PartitionCompute),
            Message::AliveCountRequest(_) => Some(MessageKind::AliveCount),
            Message::ShutdownRequest(_) => Some(MessageKind::Shutdown),
            _ => None,
        }
    }

    /// Protocol version carried by a request
    pub fn protocol_version(&self) -> Option<u32> {
        match self {
            Message::TurnRequest(m) => Some(m.protocol_version),
            Message::PartitionRequest(m) => Some(m.protocol_version),
            Message::AliveCountRequest(m) => Some(m.protocol_version),
            Message::ShutdownRequest(m) => Some(m.protocol_version),
            _ => None,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Message::TurnRequest(_) => "TurnRequest",
            Message::TurnResponse(_) => "TurnResponse",
            Message::PartitionRequest(_) => "PartitionRequest",
            Message::PartitionResponse(_) => "PartitionResponse",
            Message::AliveCountRequest(_) => "AliveCountRequest",
            Message::AliveCountResponse(_) => "AliveCountResponse",
            Message::ShutdownRequest(_) => "ShutdownRequest",
            Message::ShutdownResponse(_) => "ShutdownResponse",
            Message::Error(_) => "Error",
        }
    }

    pub fn error(node_id: impl Into<String>, error: impl fmt::Display) -> Self {
        Message::Error(ErrorMessage {
            node_id: node_id.into(),
            error: error.to_string(),
        })
    }
}

/// Turn request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub protocol_version: u32,
    pub grid: Grid,
    pub params: Params,
}

/// Turn response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub grid: Grid,

    /// False when at least one partition kept its prior rows
    pub complete: bool,

    /// Indices of partitions that returned no usable result
    #[serde(default)]
    pub missing_partitions: Vec<usize>,
}

/// Partition compute request
///
/// Bounds are half-open: rows `y1..y2`, columns `x1..x2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRequest {
    pub protocol_version: u32,
    /// Shared with the broker's other requests for the same turn
    pub grid: Arc<Grid>,
    pub params: Params,
    pub x1: usize,
    pub x2: usize,
    pub y1: usize,
    pub y2: usize,

    /// Opaque identifier of the requesting broker
    pub client_id: String,
}

/// Partition compute response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionResponse {
    /// Cells of rows `y1..y2`, row-major
    pub rows: Vec<Cell>,
    pub complete: bool,
}

/// Alive count request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveCountRequest {
    pub protocol_version: u32,
    pub grid: Grid,
    pub params: Params,
}

/// Alive count response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveCountResponse {
    pub alive_count: usize,
}

/// Shutdown request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownRequest {
    pub protocol_version: u32,
}

impl Default for ShutdownRequest {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Shutdown response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub complete: bool,
}

/// Error message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Node identifier (hostname plus role)
    pub node_id: String,

    /// Error description
    pub error: String,
}

/// Serialize a message to bytes with its length prefix
///
/// ```text
/// [4 bytes: message length (little-endian u32)][N bytes: MessagePack message]
/// ```
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let body = rmp_serde::to_vec(msg).context("Failed to serialize message")?;
    if body.len() > MAX_FRAME_BYTES {
        bail!(
            "Message too large: {} bytes (max {} bytes)",
            body.len(),
            MAX_FRAME_BYTES
        );
    }

    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Deserialize a message from bytes
///
/// Returns (message, bytes_consumed) where bytes_consumed includes the length prefix.
pub fn deserialize_message(buf: &[u8]) -> Result<(Message, usize)> {
    if buf.len() < 4 {
        bail!("Buffer too small for message length (need 4 bytes, got {})", buf.len());
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if msg_len > MAX_FRAME_BYTES {
        bail!("Message too large: {} bytes (max {} bytes)", msg_len, MAX_FRAME_BYTES);
    }
    if buf.len() < 4 + msg_len {
        bail!("Incomplete message (need {} bytes, got {})", 4 + msg_len, buf.len());
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + msg_len]).context("Failed to deserialize message")?;
    Ok((msg, 4 + msg_len))
}

/// Read one framed message from a stream
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_FRAME_BYTES {
        bail!("Message too large: {} bytes (max {} bytes)", msg_len, MAX_FRAME_BYTES);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    rmp_serde::from_slice(&msg_buf).context("Failed to deserialize message")
}

/// Write one framed message to a stream and flush it
pub async fn write_message<W: AsyncWrite + Unpin>(stream: &mut W, msg: &Message) -> Result<()> {
    let framed = serialize_message(msg)?;
    stream
        .write_all(&framed)
        .await
        .context("Failed to write message")?;
    stream.flush().await.context("Failed to flush stream")?;
    Ok(())
}

/// Identifier for this process in `client_id` and `node_id` fields
pub fn local_node_id(role: &str) -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("{}/{}/{}", host, role, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellCoord;

    fn params() -> Params {
        Params {
            turns: 10,
            threads: 4,
            image_width: 4,
            image_height: 4,
        }
    }

    #[test]
    fn test_serialize_deserialize_partition_request() {
        let grid = Grid::with_alive(4, 4, &[CellCoord::new(2, 1)]).unwrap();
        let msg = Message::PartitionRequest(PartitionRequest {
            protocol_version: PROTOCOL_VERSION,
            grid: Arc::new(grid.clone()),
            params: params(),
            x1: 0,
            x2: 4,
            y1: 1,
            y2: 3,
            client_id: "broker-a".to_string(),
        });

        let bytes = serialize_message(&msg).unwrap();
        let (deserialized, consumed) = deserialize_message(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(deserialized, msg);
        assert_eq!(deserialized.kind(), Some(MessageKind::PartitionCompute));
        assert_eq!(deserialized.protocol_version(), Some(PROTOCOL_VERSION));
    }

    #[test]
    fn test_serialize_deserialize_error() {
        let msg = Message::error("node-1", "boom");
        let bytes = serialize_message(&msg).unwrap();
        let (deserialized, _) = deserialize_message(&bytes).unwrap();

        match deserialized {
            Message::Error(err) => {
                assert_eq!(err.node_id, "node-1");
                assert_eq!(err.error, "boom");
            }
            other => panic!("Wrong message type: {}", other.name()),
        }
    }

    #[test]
    fn test_replies_have_no_kind() {
        let reply = Message::ShutdownResponse(ShutdownResponse { complete: true });
        assert_eq!(reply.kind(), None);
        assert_eq!(reply.protocol_version(), None);
        let request = Message::ShutdownRequest(ShutdownRequest::default());
        assert_eq!(request.kind(), Some(MessageKind::Shutdown));
    }

    #[test]
    fn test_message_framing() {
        let msg = Message::AliveCountResponse(AliveCountResponse { alive_count: 3 });
        let bytes = serialize_message(&msg).unwrap();

        let msg_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(bytes.len(), 4 + msg_len);
        assert!(deserialize_message(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut bytes = ((MAX_FRAME_BYTES + 1) as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let err = deserialize_message(&bytes).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let msg = Message::ShutdownRequest(ShutdownRequest::default());
        write_message(&mut client, &msg).await.unwrap();
        let received = read_message(&mut server).await.unwrap();
        assert_eq!(received, msg);
    }
}
