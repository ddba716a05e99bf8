//! Conversational Backend
//!
//! Everything the relay knows about the backend service: the wire protocol
//! of the duplex streaming connection, the trait seam the orchestration
//! core depends on, and the concrete HTTP + WebSocket implementation.

pub mod agent;
pub mod protocol;
pub mod traits;

pub use agent::AgentWsBackend;
pub use protocol::{ChunkPayload, ClientMessage, ServerMessage};
pub use traits::{AgentBackend, BackendError, BackendSocket, SessionId};
