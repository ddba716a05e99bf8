//! Relay Daemon
//!
//! Headless front end for the relay core: reads prompts line by line from
//! stdin, submits them to the orchestrator, and prints every broadcast
//! event to stdout as one JSON object per line.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a backend on the default origin (http://localhost:3000)
//! relay-daemon
//!
//! # Point at a different backend
//! RELAY_BACKEND_ORIGIN=https://agent.example.com relay-daemon
//!
//! # With verbose logging
//! RUST_LOG=debug relay-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `RELAY_BACKEND_ORIGIN`: Backend origin; session and streaming URLs are derived
//! - `RELAY_BACKEND_HTTP_URL`: Explicit session endpoint URL
//! - `RELAY_BACKEND_WS_URL`: Explicit streaming WebSocket URL
//! - `RELAY_HISTORY_CAPACITY`: History buffer capacity (default: 50)
//! - `RELAY_EXCHANGE_TIMEOUT_SECS`: Per-exchange deadline (default: 120)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use relay_core::{
    backend::AgentWsBackend,
    config::RelayConfig,
    events::{EventContext, Submission},
    orchestrator::Orchestrator,
    responder::{ChannelResponder, LogResponder, Responder},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_daemon=info".parse()?)
                .add_directive("relay_core=info".parse()?),
        )
        .with_target(true)
        .init();

    info!("Starting Relay Daemon");

    let config = RelayConfig::load()?;
    info!(
        session_url = %config.backend_http_url,
        stream_url = %config.backend_ws_url,
        "Backend configured"
    );

    let backend = AgentWsBackend::from_config(&config);
    let channel = Arc::new(ChannelResponder::new());
    let responders: Vec<Arc<dyn Responder>> = vec![channel.clone(), Arc::new(LogResponder)];

    let orchestrator = Orchestrator::new(
        backend,
        responders,
        config.exchange_config(),
        config.history_capacity,
    );

    // Print every broadcast event as a JSON line.
    let (subscriber_id, mut events) = channel.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            }
        }
    });

    info!("Reading prompts from stdin");

    let author = std::env::var("USER").unwrap_or_else(|_| "operator".to_string());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                match line? {
                    Some(text) => {
                        let text = text.trim();
                        if text.is_empty() {
                            continue;
                        }
                        orchestrator
                            .submit(
                                Submission::new("stdin", author.clone(), text),
                                EventContext::new(),
                            )
                            .await;
                    }
                    None => {
                        info!("Stdin closed");
                        break;
                    }
                }
            }
        }
    }

    channel.unsubscribe(subscriber_id);
    printer.abort();

    info!("Relay daemon stopped cleanly");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
