//! Relay Core - Streaming Chat Relay and Orchestration
//!
//! This crate relays chat prompts from any number of front ends to a
//! streaming conversational backend and fans the response events back out.
//! It is completely independent of any particular front end: the same core
//! can sit behind a WebSocket server, an SSE endpoint, a chat-bot adapter,
//! or run headless from a terminal.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Front Ends                            │
//! │   ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌────────────┐  │
//! │   │  WebUI  │   │ Discord │   │  GitHub  │   │  Headless  │  │
//! │   └────┬────┘   └────┬────┘   └────┬─────┘   └─────┬──────┘  │
//! │        │             │             │               │         │
//! │        └─────────────┴──────┬──────┴───────────────┘         │
//! │                             │                                │
//! │                   Submission (in)                            │
//! │                   ChatEvent (out, via Responders)            │
//! └─────────────────────────────┼────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────┼────────────────────────────────┐
//! │                       RELAY CORE                             │
//! │  ┌──────────────────────────┴─────────────────────────────┐  │
//! │  │                     Orchestrator                       │  │
//! │  │  ┌───────────┐  ┌───────────┐  ┌────────────────────┐  │  │
//! │  │  │  History  │  │  Worker   │  │ StreamingExchange  │  │  │
//! │  │  │  Buffer   │  │  (FIFO)   │  │ (one at a time)    │  │  │
//! │  │  └───────────┘  └───────────┘  └─────────┬──────────┘  │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────┼─────────────────┘
//!                                              │
//!                                   HTTP session + WebSocket
//!                                   (AgentBackend)
//! ```
//!
//! # Key Types
//!
//! - [`Orchestrator`]: accepts submissions, serializes backend exchanges
//! - [`ChatEvent`]: the event vocabulary broadcast to responders
//! - [`Responder`]: the fan-out seam front ends implement
//! - [`StreamingExchange`]: one backend exchange with exactly-once termination
//! - [`HistoryBuffer`]: bounded transcript of durable events
//! - [`AgentBackend`]: session provisioning and streaming connect
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use relay_core::{
//!     backend::AgentWsBackend,
//!     config::RelayConfig,
//!     events::{EventContext, Submission},
//!     orchestrator::Orchestrator,
//!     responder::{ChannelResponder, Responder},
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RelayConfig::load().unwrap();
//!     let backend = AgentWsBackend::from_config(&config);
//!
//!     let channel = Arc::new(ChannelResponder::new());
//!     let (_, mut events) = channel.subscribe();
//!
//!     let orchestrator = Orchestrator::new(
//!         backend,
//!         vec![channel.clone() as Arc<dyn Responder>],
//!         config.exchange_config(),
//!         config.history_capacity,
//!     );
//!
//!     orchestrator
//!         .submit(Submission::new("web", "alice", "hello"), EventContext::new())
//!         .await;
//!
//!     // Consume ChatEvents from `events` and frame them for your front end.
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`events`]: the chat event vocabulary and submission contract
//! - [`history`]: bounded thread-safe transcript buffer
//! - [`backend`]: wire protocol, backend traits, HTTP + WebSocket client
//! - [`exchange`]: one streaming exchange with the exactly-once latch
//! - [`orchestrator`]: submission intake and the single-worker queue
//! - [`responder`]: event fan-out to front ends
//! - [`config`]: layered file + environment configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod events;
pub mod exchange;
pub mod history;
pub mod orchestrator;
pub mod responder;

// Re-exports for convenience
pub use backend::{AgentBackend, AgentWsBackend, BackendError, BackendSocket, SessionId};
pub use config::RelayConfig;
pub use events::{ChatEvent, ChatEventKind, CorrelationId, EventContext, Submission};
pub use exchange::{ExchangeConfig, ExchangeSignal, ExchangeState, StreamingExchange};
pub use history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
pub use orchestrator::Orchestrator;
pub use responder::{ChannelResponder, LogResponder, Responder, SubscriberId};
