//! Backend Wire Protocol
//!
//! Structured messages exchanged over the duplex backend connection.
//! Outbound: `init` with the session id immediately on connect, then
//! `message` with the prompt once the backend signals `ready`. Inbound:
//! `ready`, `stream_chunk`, `stream_end` and `error`; anything else is
//! carried as [`ServerMessage::Unknown`] and ignored by the exchange.
//!
//! Frames that fail to parse as the expected structured format are dropped
//! (`parse` returns `None`), never treated as errors.

use serde::{Deserialize, Serialize};

/// Message sent from the relay to the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind the connection to a provisioned session
    Init {
        /// The session id returned by the session endpoint
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Deliver the user prompt (sent at most once per exchange)
    Message {
        /// The prompt text
        content: String,
    },
}

/// Payload of a `stream_chunk` message
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ChunkPayload {
    /// Chunk discriminator; only `"content"` carries response text
    #[serde(rename = "type", default)]
    pub kind: String,
    /// The text fragment
    #[serde(default)]
    pub data: String,
}

impl ChunkPayload {
    /// The text fragment, when this is a non-empty content chunk
    ///
    /// Non-content chunk types and empty fragments yield `None`; the
    /// exchange emits nothing for them and leaves the accumulator alone.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        if self.kind == "content" && !self.data.is_empty() {
            Some(&self.data)
        } else {
            None
        }
    }
}

/// Message received from the backend
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Backend is ready to receive the prompt
    Ready,
    /// Incremental response data
    StreamChunk {
        /// The chunk payload
        #[serde(default)]
        data: ChunkPayload,
    },
    /// Terminal success: the response stream is complete
    StreamEnd,
    /// Terminal failure reported by the backend
    Error {
        /// Human-readable error text
        #[serde(default)]
        error: String,
    },
    /// Any message type this relay does not understand
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Parse a raw text frame, returning `None` for malformed input
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
