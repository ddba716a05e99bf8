//! Agent Backend Implementation
//!
//! Concrete [`AgentBackend`] over HTTP + WebSocket: sessions are
//! provisioned with one POST to the backend's session endpoint, and each
//! exchange runs over a fresh WebSocket connection speaking the structured
//! protocol in [`super::protocol`].

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::ClientMessage;
use super::traits::{AgentBackend, BackendError, BackendSocket, SessionId};
use crate::config::RelayConfig;

/// Default connect timeout for the session endpoint
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default overall timeout for the session request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP + WebSocket backend client
#[derive(Clone)]
pub struct AgentWsBackend {
    /// Session endpoint URL
    http_url: String,
    /// WebSocket URL for streaming exchanges
    ws_url: String,
    /// HTTP client for session provisioning
    http_client: reqwest::Client,
}

impl AgentWsBackend {
    /// Create a backend with default session-endpoint timeouts
    pub fn new(http_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self::with_timeouts(
            http_url,
            ws_url,
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    /// Create a backend with explicit connect/request timeouts
    pub fn with_timeouts(
        http_url: impl Into<String>,
        ws_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http_url: http_url.into(),
            ws_url: ws_url.into(),
            http_client: reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .timeout(request_timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Create a backend from relay configuration
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::with_timeouts(
            config.backend_http_url.clone(),
            config.backend_ws_url.clone(),
            config.session_connect_timeout,
            config.session_request_timeout,
        )
    }

    /// The session endpoint URL
    #[must_use]
    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    /// The streaming WebSocket URL
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }
}

#[async_trait]
impl AgentBackend for AgentWsBackend {
    fn name(&self) -> &str {
        "agent-ws"
    }

    async fn create_session(&self) -> Result<SessionId, BackendError> {
        let response = self
            .http_client
            .post(&self.http_url)
            .send()
            .await
            .map_err(|e| BackendError::SessionCreation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::SessionCreation(format!("{status}: {body}")));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::SessionCreation(format!("malformed body: {e}")))?;

        data.get("sessionId")
            .and_then(serde_json::Value::as_str)
            .map(|id| SessionId(id.to_string()))
            .ok_or_else(|| {
                BackendError::SessionCreation("response missing sessionId field".to_string())
            })
    }

    async fn connect(&self, session: &SessionId) -> Result<Box<dyn BackendSocket>, BackendError> {
        tracing::info!(url = %self.ws_url, session = %session, "Connecting to backend");
        let (ws, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Box::new(WsSocket { ws }))
    }
}

/// [`BackendSocket`] over a tungstenite WebSocket stream
struct WsSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl BackendSocket for WsSocket {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), BackendError> {
        let text = serde_json::to_string(message)
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, BackendError>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite; binary frames are not
                // part of the protocol.
                Ok(_) => {}
                Err(e) => return Some(Err(BackendError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "WebSocket close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation() {
        let backend = AgentWsBackend::new("http://localhost:3000/api/chat", "ws://localhost:3000/");
        assert_eq!(backend.name(), "agent-ws");
        assert_eq!(backend.http_url(), "http://localhost:3000/api/chat");
        assert_eq!(backend.ws_url(), "ws://localhost:3000/");
    }

    #[test]
    fn test_from_config() {
        let config = RelayConfig::default();
        let backend = AgentWsBackend::from_config(&config);
        assert_eq!(backend.http_url(), config.backend_http_url);
        assert_eq!(backend.ws_url(), config.backend_ws_url);
    }
}
