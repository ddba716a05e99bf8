//! Chat Events
//!
//! The event vocabulary shared by the orchestrator, the history buffer and
//! every responder. One prompt/response pair is a sequence of events tied
//! together by a [`CorrelationId`]: a `UserMessage`, zero or more `AiChunk`s,
//! and exactly one terminal `AiEnd` or `Error`.
//!
//! # Design Philosophy
//!
//! Events are immutable once built and serde-serializable, so transport
//! adapters can frame them for a socket or an SSE stream without any
//! translation layer. The `context` map is opaque routing state: the core
//! threads it through from submission to terminal event but never reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Correlation identifier threading a user message to its terminal event
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Generate a new unique correlation ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for CorrelationId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque routing context attached to a submission
///
/// Carries adapter-specific reply hints (e.g. a channel or comment target).
/// The core never interprets the contents, only passes them through
/// unchanged to every event of the same correlation id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventContext(Map<String, Value>);

impl EventContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a context entry, returning self for chaining
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a context entry
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Check whether the context carries any entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Kind of chat event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEventKind {
    /// A prompt submitted by a user through any front-end
    UserMessage,
    /// An incremental fragment of the AI response
    AiChunk,
    /// The completed AI response (terminal success)
    AiEnd,
    /// A failed exchange (terminal failure)
    Error,
}

impl ChatEventKind {
    /// Whether events of this kind are retained in the history buffer
    ///
    /// Chunks and errors are broadcast live but not kept: the history is a
    /// coarse transcript, not a raw stream log.
    #[must_use]
    pub fn is_durable(self) -> bool {
        matches!(self, Self::UserMessage | Self::AiEnd)
    }

    /// Whether this kind ends a prompt/response pair
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AiEnd | Self::Error)
    }
}

/// A submission arriving from a front-end adapter
///
/// The inbound contract shared by all adapters: who said what, where.
/// `id` is optional; the orchestrator assigns a fresh correlation id when
/// the adapter does not supply one (e.g. a chat-bot message id).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    /// Caller-supplied correlation id (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Originating front-end ("web", "discord", "github", ...)
    pub source: String,
    /// Display name of the author
    pub author: String,
    /// The prompt text
    pub text: String,
}

impl Submission {
    /// Create a submission without a caller-supplied id
    pub fn new(
        source: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            source: source.into(),
            author: author.into(),
            text: text.into(),
        }
    }
}

/// One event in the life of a prompt/response pair
///
/// Serializes to the `{type, payload, context}` shape front-ends consume
/// directly; `payload` always repeats the correlation id under `"id"`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Event kind (serialized as the `type` tag)
    #[serde(rename = "type")]
    pub kind: ChatEventKind,
    /// Correlation id shared by all events of one prompt/response pair
    pub id: CorrelationId,
    /// Kind-specific payload
    pub payload: Map<String, Value>,
    /// Opaque routing context, threaded through unchanged
    #[serde(default, skip_serializing_if = "EventContext::is_empty")]
    pub context: EventContext,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
}

impl ChatEvent {
    fn build(
        kind: ChatEventKind,
        id: CorrelationId,
        mut payload: Map<String, Value>,
        context: EventContext,
    ) -> Self {
        payload.insert("id".to_string(), Value::String(id.0.clone()));
        Self {
            kind,
            id,
            payload,
            context,
            timestamp: Utc::now(),
        }
    }

    /// Build a `UserMessage` event from a submission
    #[must_use]
    pub fn user_message(submission: &Submission, id: CorrelationId, context: EventContext) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "source".to_string(),
            Value::String(submission.source.clone()),
        );
        payload.insert(
            "author".to_string(),
            Value::String(submission.author.clone()),
        );
        payload.insert("text".to_string(), Value::String(submission.text.clone()));
        Self::build(ChatEventKind::UserMessage, id, payload, context)
    }

    /// Build an `AiChunk` event carrying one response fragment
    #[must_use]
    pub fn ai_chunk(id: CorrelationId, text: impl Into<String>, context: EventContext) -> Self {
        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::String(text.into()));
        Self::build(ChatEventKind::AiChunk, id, payload, context)
    }

    /// Build an `AiEnd` event carrying the full accumulated response
    #[must_use]
    pub fn ai_end(id: CorrelationId, text: impl Into<String>, context: EventContext) -> Self {
        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::String(text.into()));
        Self::build(ChatEventKind::AiEnd, id, payload, context)
    }

    /// Build an `Error` event carrying a human-readable failure message
    #[must_use]
    pub fn error(id: CorrelationId, message: impl Into<String>, context: EventContext) -> Self {
        let mut payload = Map::new();
        payload.insert("message".to_string(), Value::String(message.into()));
        Self::build(ChatEventKind::Error, id, payload, context)
    }

    /// The text payload, for kinds that carry one
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }

    /// The error message, for `Error` events
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }
}
