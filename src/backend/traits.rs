//! Backend Traits
//!
//! Trait seam between the orchestration core and the conversational
//! backend. The core only needs two things from a backend: provision a
//! session, and open a duplex streaming connection bound to it. Keeping
//! both behind traits lets tests drive the full relay path with scripted
//! backends and no network.

use async_trait::async_trait;

use super::protocol::ClientMessage;

/// Identifier of a provisioned backend session
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend interaction failures surfaced to the worker
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The session endpoint refused, failed, or returned a malformed body
    #[error("session creation failed: {0}")]
    SessionCreation(String),
    /// Connection-level failure before or during streaming
    #[error("backend transport error: {0}")]
    Transport(String),
}

/// A duplex streaming connection to the backend
///
/// Frames are raw text; the exchange parses them with
/// [`ServerMessage::parse`](super::protocol::ServerMessage::parse).
#[async_trait]
pub trait BackendSocket: Send {
    /// Send one structured message to the backend
    async fn send(&mut self, message: &ClientMessage) -> Result<(), BackendError>;

    /// Receive the next text frame
    ///
    /// `None` means the connection closed; `Some(Err(_))` is a
    /// transport-level failure.
    async fn recv(&mut self) -> Option<Result<String, BackendError>>;

    /// Close the connection (best effort, idempotent at the protocol level)
    async fn close(&mut self);
}

/// Conversational backend: session provisioning plus streaming connect
///
/// Implement this to point the relay at a different backend service.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Ask the backend for a fresh session id
    ///
    /// One outbound request, no retries; retry policy belongs to callers.
    async fn create_session(&self) -> Result<SessionId, BackendError>;

    /// Open a duplex streaming connection for one exchange
    async fn connect(&self, session: &SessionId) -> Result<Box<dyn BackendSocket>, BackendError>;
}
