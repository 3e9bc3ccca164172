//! Binary frames for the realtime cell-edit channel.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬─────────────┬──────────┐
//! │ event    │ sender      │ payload  │
//! │ 1 byte   │ 16 bytes    │ variable │
//! └──────────┴─────────────┴──────────┘
//! ```
//!
//! The relay only reads `event` and rewrites `sender`; `payload` is forwarded
//! byte-for-byte.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Channel events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    /// Server → client: connection accepted, carries the assigned connection id
    Welcome = 1,
    /// A client edited a cell; relayed to every other connection
    CellContentUpdated = 2,
    /// Heartbeat ping
    Ping = 3,
    /// Heartbeat pong
    Pong = 4,
}

/// Top-level channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub event: EventKind,
    /// Connection that produced the event (nil for server-originated frames)
    pub sender: Uuid,
    pub payload: Vec<u8>,
}

impl ChannelMessage {
    pub fn welcome(connection_id: Uuid) -> Self {
        Self {
            event: EventKind::Welcome,
            sender: connection_id,
            payload: Vec::new(),
        }
    }

    pub fn cell_content_updated(sender: Uuid, payload: Vec<u8>) -> Self {
        Self {
            event: EventKind::CellContentUpdated,
            sender,
            payload,
        }
    }

    pub fn ping(sender: Uuid) -> Self {
        Self {
            event: EventKind::Ping,
            sender,
            payload: Vec::new(),
        }
    }

    pub fn pong() -> Self {
        Self {
            event: EventKind::Pong,
            sender: Uuid::nil(),
            payload: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    /// Parse a `CellContentUpdated` payload written with [`CellEdit::encode`].
    pub fn cell_edit(&self) -> Result<CellEdit, ProtocolError> {
        if self.event != EventKind::CellContentUpdated {
            return Err(ProtocolError::InvalidMessageType);
        }
        CellEdit::decode(&self.payload)
    }
}

/// Typed payload for a cell edit: the cell coordinate and its new content.
///
/// Clients are free to send any payload; this is the shape the bundled client uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellEdit {
    pub sheet_id: Uuid,
    pub grid_id: Uuid,
    pub row_id: Uuid,
    pub column_id: Uuid,
    pub content: String,
}

impl CellEdit {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (edit, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(edit)
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Invalid message type")]
    InvalidMessageType,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Connection timeout")]
    Timeout,
    #[error("Handshake failed: {0}")]
    Handshake(String),
}
