//! Relay Configuration
//!
//! Layered configuration: built-in defaults, then an optional TOML file,
//! then `RELAY_*` environment variables on top. The backend can be
//! addressed either with explicit HTTP and WebSocket URLs or with a single
//! origin from which both are derived.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::exchange::ExchangeConfig;
use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Could not read the configuration file
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration file is not valid TOML
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime configuration of the relay
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Session provisioning endpoint
    pub backend_http_url: String,
    /// Streaming WebSocket endpoint
    pub backend_ws_url: String,
    /// History buffer capacity
    pub history_capacity: usize,
    /// Overall deadline for one streaming exchange
    pub exchange_timeout: Duration,
    /// TCP connect timeout for the session endpoint
    pub session_connect_timeout: Duration,
    /// Overall timeout for the session request
    pub session_request_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let (backend_http_url, backend_ws_url) = derive_backend_urls("http://localhost:3000");
        Self {
            backend_http_url,
            backend_ws_url,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            exchange_timeout: Duration::from_secs(120),
            session_connect_timeout: Duration::from_secs(10),
            session_request_timeout: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the default file (if present) plus environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let file: RelayToml = toml::from_str(&raw)?;
        let mut config = Self::default();
        config.apply_file(file);
        Ok(config)
    }

    /// Build configuration from defaults plus environment variables only
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// The exchange configuration this relay config implies
    #[must_use]
    pub fn exchange_config(&self) -> ExchangeConfig {
        ExchangeConfig {
            timeout: self.exchange_timeout,
            ..ExchangeConfig::default()
        }
    }

    fn apply_file(&mut self, file: RelayToml) {
        if let Some(origin) = file.backend_origin {
            let (http, ws) = derive_backend_urls(&origin);
            self.backend_http_url = http;
            self.backend_ws_url = ws;
        }
        if let Some(url) = file.backend_http_url {
            self.backend_http_url = url;
        }
        if let Some(url) = file.backend_ws_url {
            self.backend_ws_url = url;
        }
        if let Some(capacity) = file.history_capacity {
            self.history_capacity = capacity;
        }
        if let Some(secs) = file.exchange_timeout_secs {
            self.exchange_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.session_connect_timeout_secs {
            self.session_connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.session_request_timeout_secs {
            self.session_request_timeout = Duration::from_secs(secs);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(origin) = std::env::var("RELAY_BACKEND_ORIGIN") {
            let (http, ws) = derive_backend_urls(&origin);
            self.backend_http_url = http;
            self.backend_ws_url = ws;
        }
        if let Ok(url) = std::env::var("RELAY_BACKEND_HTTP_URL") {
            self.backend_http_url = url;
        }
        if let Ok(url) = std::env::var("RELAY_BACKEND_WS_URL") {
            self.backend_ws_url = url;
        }
        if let Ok(capacity) = std::env::var("RELAY_HISTORY_CAPACITY") {
            match capacity.parse() {
                Ok(n) => self.history_capacity = n,
                Err(e) => {
                    tracing::warn!(value = %capacity, error = %e, "Ignoring invalid RELAY_HISTORY_CAPACITY");
                }
            }
        }
        if let Ok(secs) = std::env::var("RELAY_EXCHANGE_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(n) => self.exchange_timeout = Duration::from_secs(n),
                Err(e) => {
                    tracing::warn!(value = %secs, error = %e, "Ignoring invalid RELAY_EXCHANGE_TIMEOUT_SECS");
                }
            }
        }
    }
}

/// Derive the session and streaming URLs from one backend origin
///
/// The session endpoint lives at `<origin>/api/chat`; the streaming
/// endpoint is the origin root with the scheme switched to its WebSocket
/// counterpart.
#[must_use]
pub fn derive_backend_urls(origin: &str) -> (String, String) {
    let origin = origin.trim_end_matches('/');
    let http = format!("{origin}/api/chat");
    let ws = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{rest}/")
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{rest}/")
    } else {
        format!("ws://{origin}/")
    };
    (http, ws)
}

/// Default configuration file location (`<config dir>/relay/config.toml`)
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("relay").join("config.toml"))
}

/// On-disk configuration shape
#[derive(Debug, Default, Deserialize)]
struct RelayToml {
    backend_origin: Option<String>,
    backend_http_url: Option<String>,
    backend_ws_url: Option<String>,
    history_capacity: Option<usize>,
    exchange_timeout_secs: Option<u64>,
    session_connect_timeout_secs: Option<u64>,
    session_request_timeout_secs: Option<u64>,
}
