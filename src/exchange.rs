//! Streaming Exchange
//!
//! One end-to-end backend streaming interaction driven by a single prompt.
//! The exchange owns one duplex connection, walks the handshake
//! (`init` → `ready` → `message`) and relays content chunks until a
//! terminal trigger fires. Three triggers compete for termination:
//!
//! 1. a `stream_end` message from the backend (success),
//! 2. an `error` message or transport-level failure,
//! 3. the exchange timer expiring.
//!
//! Whichever trigger flips the [`ExchangeState`] latch first owns terminal
//! emission and connection teardown; every later trigger is a no-op. That
//! test-and-set is the central invariant of the whole relay: exactly one
//! terminal signal and exactly one close per exchange, no matter how the
//! triggers race.
//!
//! Signals are delivered over an mpsc receiver consumed by the
//! orchestrator's worker, which maps them onto chat events.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::backend::{BackendSocket, ClientMessage, ServerMessage, SessionId};

/// Configuration for a streaming exchange
#[derive(Clone, Debug)]
pub struct ExchangeConfig {
    /// How long the exchange may run before the timeout trigger fires
    pub timeout: Duration,
    /// Capacity of the signal channel to the worker
    pub signal_capacity: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            signal_capacity: 64,
        }
    }
}

/// Lifecycle signal emitted by an exchange
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeSignal {
    /// One non-empty content fragment, in arrival order
    Chunk(String),
    /// Terminal success carrying the full accumulated response
    End {
        /// Concatenation of every content fragment received
        full_text: String,
    },
    /// Terminal failure (backend-reported, transport-level, or timeout)
    Failed {
        /// Human-readable failure text
        error: String,
    },
}

impl ExchangeSignal {
    /// Whether this signal ends the exchange
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End { .. } | Self::Failed { .. })
    }
}

struct StateInner {
    finished: bool,
    sent_prompt: bool,
    accumulated: String,
}

/// Shared mutable state of one exchange, guarded by a single lock
///
/// `finished` is a one-shot latch: [`ExchangeState::try_finish`] returns
/// true for exactly one caller per exchange. `sent_prompt` guards the
/// prompt against duplicate `ready` signals the same way.
pub struct ExchangeState {
    inner: Mutex<StateInner>,
}

impl Default for ExchangeState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeState {
    /// Create fresh per-exchange state
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StateInner {
                finished: false,
                sent_prompt: false,
                accumulated: String::new(),
            }),
        }
    }

    /// Claim termination: returns true only for the first caller
    ///
    /// The winner becomes the sole owner of terminal-signal emission and
    /// connection teardown.
    pub fn try_finish(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.finished {
            false
        } else {
            inner.finished = true;
            true
        }
    }

    /// Whether a terminal trigger has already fired
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    /// Claim the right to send the prompt: true only for the first caller
    pub fn try_mark_prompt_sent(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.sent_prompt {
            false
        } else {
            inner.sent_prompt = true;
            true
        }
    }

    /// Append one content fragment to the accumulated response
    pub fn push_chunk(&self, text: &str) {
        self.inner.lock().accumulated.push_str(text);
    }

    /// The accumulated response text so far
    #[must_use]
    pub fn accumulated(&self) -> String {
        self.inner.lock().accumulated.clone()
    }
}

/// One backend streaming exchange
pub struct StreamingExchange {
    state: Arc<ExchangeState>,
    config: ExchangeConfig,
}

impl StreamingExchange {
    /// Create an exchange with the given configuration
    #[must_use]
    pub fn new(config: ExchangeConfig) -> Self {
        Self {
            state: Arc::new(ExchangeState::new()),
            config,
        }
    }

    /// Handle to the exchange state (shared with the driving task)
    #[must_use]
    pub fn state(&self) -> Arc<ExchangeState> {
        Arc::clone(&self.state)
    }

    /// Drive the exchange on a background task
    ///
    /// Sends `init` immediately, then relays signals until a terminal
    /// trigger fires. The returned receiver yields chunk signals in arrival
    /// order followed by exactly one terminal signal, after which the
    /// channel closes.
    pub fn spawn(
        self,
        socket: Box<dyn BackendSocket>,
        session: SessionId,
        prompt: String,
    ) -> mpsc::Receiver<ExchangeSignal> {
        let (tx, rx) = mpsc::channel(self.config.signal_capacity);
        let timeout = self.config.timeout;
        let state = self.state;

        tokio::spawn(async move {
            run(socket, session, prompt, state, tx, timeout).await;
        });

        rx
    }
}

async fn run(
    mut socket: Box<dyn BackendSocket>,
    session: SessionId,
    prompt: String,
    state: Arc<ExchangeState>,
    tx: mpsc::Sender<ExchangeSignal>,
    timeout: Duration,
) {
    tracing::debug!(session = %session, "Exchange starting");

    let init = ClientMessage::Init {
        session_id: session.0.clone(),
    };
    if let Err(e) = socket.send(&init).await {
        finish_failed(&state, &tx, &mut *socket, format!("backend connection error: {e}")).await;
        return;
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                finish_failed(
                    &state,
                    &tx,
                    &mut *socket,
                    format!("exchange timed out after {}s", timeout.as_secs()),
                )
                .await;
                break;
            }

            frame = socket.recv() => match frame {
                Some(Ok(raw)) => {
                    let Some(message) = ServerMessage::parse(&raw) else {
                        tracing::debug!(session = %session, "Dropping malformed backend frame");
                        continue;
                    };

                    match message {
                        ServerMessage::Ready => {
                            // Duplicate ready is a no-op.
                            if state.try_mark_prompt_sent() {
                                let msg = ClientMessage::Message {
                                    content: prompt.clone(),
                                };
                                if let Err(e) = socket.send(&msg).await {
                                    finish_failed(
                                        &state,
                                        &tx,
                                        &mut *socket,
                                        format!("backend connection error: {e}"),
                                    )
                                    .await;
                                    break;
                                }
                            }
                        }

                        ServerMessage::StreamChunk { data } => {
                            if let Some(text) = data.content() {
                                state.push_chunk(text);
                                let _ = tx.send(ExchangeSignal::Chunk(text.to_string())).await;
                            }
                        }

                        ServerMessage::StreamEnd => {
                            if state.try_finish() {
                                let full_text = state.accumulated();
                                let _ = tx.send(ExchangeSignal::End { full_text }).await;
                                socket.close().await;
                            }
                            break;
                        }

                        ServerMessage::Error { error } => {
                            if state.try_finish() {
                                tracing::warn!(session = %session, error = %error, "Backend reported error");
                                let _ = tx.send(ExchangeSignal::Failed { error }).await;
                                socket.close().await;
                            }
                            break;
                        }

                        ServerMessage::Unknown => {
                            tracing::debug!(session = %session, "Ignoring unknown backend message type");
                        }
                    }
                }

                // Transport errors are best-effort triggers: if another
                // trigger already closed the exchange this is the echo of
                // an intentional teardown, not a new failure.
                Some(Err(e)) => {
                    finish_failed(&state, &tx, &mut *socket, format!("backend connection error: {e}")).await;
                    break;
                }

                None => {
                    finish_failed(
                        &state,
                        &tx,
                        &mut *socket,
                        "backend connection closed before stream end".to_string(),
                    )
                    .await;
                    break;
                }
            }
        }
    }

    tracing::debug!(session = %session, "Exchange finished");
}

/// Fire the failure trigger: emit and close only if the latch is ours
async fn finish_failed(
    state: &ExchangeState,
    tx: &mpsc::Sender<ExchangeSignal>,
    socket: &mut dyn BackendSocket,
    error: String,
) {
    if state.try_finish() {
        let _ = tx.send(ExchangeSignal::Failed { error }).await;
        socket.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted replacement for a live backend connection
    enum Step {
        Frame(&'static str),
        TransportError(&'static str),
        Closed,
    }

    struct ScriptedSocket {
        script: VecDeque<Step>,
        sent: Arc<Mutex<Vec<ClientMessage>>>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedSocket {
        fn new(script: Vec<Step>) -> (Self, Arc<Mutex<Vec<ClientMessage>>>, Arc<AtomicUsize>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let closes = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    script: script.into(),
                    sent: Arc::clone(&sent),
                    closes: Arc::clone(&closes),
                },
                sent,
                closes,
            )
        }
    }

    #[async_trait]
    impl BackendSocket for ScriptedSocket {
        async fn send(&mut self, message: &ClientMessage) -> Result<(), BackendError> {
            self.sent.lock().push(message.clone());
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, BackendError>> {
            match self.script.pop_front() {
                Some(Step::Frame(raw)) => Some(Ok(raw.to_string())),
                Some(Step::TransportError(e)) => {
                    Some(Err(BackendError::Transport(e.to_string())))
                }
                Some(Step::Closed) => None,
                // Script exhausted: hang like an idle connection so the
                // timeout trigger can win.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn collect(mut rx: mpsc::Receiver<ExchangeSignal>) -> Vec<ExchangeSignal> {
        let mut signals = Vec::new();
        while let Some(signal) = rx.recv().await {
            signals.push(signal);
        }
        signals
    }

    fn session() -> SessionId {
        SessionId("s1".to_string())
    }

    #[tokio::test]
    async fn test_chunk_accumulation() {
        let (socket, sent, closes) = ScriptedSocket::new(vec![
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Frame(r#"{"type":"stream_chunk","data":{"type":"content","data":"He"}}"#),
            Step::Frame(r#"{"type":"stream_chunk","data":{"type":"content","data":"llo"}}"#),
            Step::Frame(r#"{"type":"stream_end"}"#),
        ]);

        let exchange = StreamingExchange::new(ExchangeConfig::default());
        let rx = exchange.spawn(Box::new(socket), session(), "hi".to_string());
        let signals = collect(rx).await;

        assert_eq!(
            signals,
            vec![
                ExchangeSignal::Chunk("He".to_string()),
                ExchangeSignal::Chunk("llo".to_string()),
                ExchangeSignal::End {
                    full_text: "Hello".to_string()
                },
            ]
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], ClientMessage::Init { .. }));
        assert!(matches!(sent[1], ClientMessage::Message { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_ready_sends_prompt_once() {
        let (socket, sent, _) = ScriptedSocket::new(vec![
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Frame(r#"{"type":"stream_end"}"#),
        ]);

        let exchange = StreamingExchange::new(ExchangeConfig::default());
        let rx = exchange.spawn(Box::new(socket), session(), "hi".to_string());
        let _ = collect(rx).await;

        let prompts = sent
            .lock()
            .iter()
            .filter(|m| matches!(m, ClientMessage::Message { .. }))
            .count();
        assert_eq!(prompts, 1);
    }

    #[tokio::test]
    async fn test_empty_chunk_suppressed() {
        let (socket, _, _) = ScriptedSocket::new(vec![
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Frame(r#"{"type":"stream_chunk","data":{"type":"content","data":""}}"#),
            Step::Frame(r#"{"type":"stream_chunk","data":{"type":"content","data":"ok"}}"#),
            Step::Frame(r#"{"type":"stream_end"}"#),
        ]);

        let exchange = StreamingExchange::new(ExchangeConfig::default());
        let rx = exchange.spawn(Box::new(socket), session(), "hi".to_string());
        let signals = collect(rx).await;

        assert_eq!(
            signals,
            vec![
                ExchangeSignal::Chunk("ok".to_string()),
                ExchangeSignal::End {
                    full_text: "ok".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_backend_error_is_terminal() {
        let (socket, _, closes) = ScriptedSocket::new(vec![
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Frame(r#"{"type":"error","error":"model offline"}"#),
        ]);

        let exchange = StreamingExchange::new(ExchangeConfig::default());
        let rx = exchange.spawn(Box::new(socket), session(), "hi".to_string());
        let signals = collect(rx).await;

        assert_eq!(
            signals,
            vec![ExchangeSignal::Failed {
                error: "model offline".to_string()
            }]
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_error_preserves_partial_progress() {
        let (socket, _, closes) = ScriptedSocket::new(vec![
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Frame(r#"{"type":"stream_chunk","data":{"type":"content","data":"par"}}"#),
            Step::TransportError("connection reset"),
        ]);

        let exchange = StreamingExchange::new(ExchangeConfig::default());
        let rx = exchange.spawn(Box::new(socket), session(), "hi".to_string());
        let signals = collect(rx).await;

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0], ExchangeSignal::Chunk("par".to_string()));
        assert!(matches!(&signals[1], ExchangeSignal::Failed { error } if error.contains("connection reset")));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unexpected_close_is_failure() {
        let (socket, _, _) = ScriptedSocket::new(vec![
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Closed,
        ]);

        let exchange = StreamingExchange::new(ExchangeConfig::default());
        let rx = exchange.spawn(Box::new(socket), session(), "hi".to_string());
        let signals = collect(rx).await;

        assert_eq!(signals.len(), 1);
        assert!(matches!(&signals[0], ExchangeSignal::Failed { error } if error.contains("closed")));
    }

    #[tokio::test]
    async fn test_timeout_fires_when_backend_idles() {
        let (socket, _, closes) =
            ScriptedSocket::new(vec![Step::Frame(r#"{"type":"ready"}"#)]);

        let exchange = StreamingExchange::new(ExchangeConfig {
            timeout: Duration::from_millis(50),
            ..Default::default()
        });
        let rx = exchange.spawn(Box::new(socket), session(), "hi".to_string());
        let signals = collect(rx).await;

        assert_eq!(signals.len(), 1);
        assert!(matches!(&signals[0], ExchangeSignal::Failed { error } if error.contains("timed out")));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames_ignored() {
        let (socket, _, _) = ScriptedSocket::new(vec![
            Step::Frame("not json"),
            Step::Frame(r#"{"type":"heartbeat"}"#),
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Frame(r#"{"type":"stream_end"}"#),
        ]);

        let exchange = StreamingExchange::new(ExchangeConfig::default());
        let rx = exchange.spawn(Box::new(socket), session(), "hi".to_string());
        let signals = collect(rx).await;

        assert_eq!(
            signals,
            vec![ExchangeSignal::End {
                full_text: String::new()
            }]
        );
    }

    #[tokio::test]
    async fn test_latch_admits_exactly_one_winner() {
        let state = Arc::new(ExchangeState::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let state = Arc::clone(&state);
            handles.push(tokio::spawn(async move { state.try_finish() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(state.is_finished());
    }

    #[tokio::test]
    async fn test_latch_exactly_once_across_threads() {
        let state = Arc::new(ExchangeState::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let state = Arc::clone(&state);
            let winners = Arc::clone(&winners);
            handles.push(std::thread::spawn(move || {
                if state.try_finish() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_racing_timeout_yields_single_terminal() {
        // A zero timeout races the timer against a complete happy-path
        // script; whichever trigger wins, exactly one terminal signal and
        // one close must come out.
        let (socket, _, closes) = ScriptedSocket::new(vec![
            Step::Frame(r#"{"type":"ready"}"#),
            Step::Frame(r#"{"type":"stream_chunk","data":{"type":"content","data":"x"}}"#),
            Step::Frame(r#"{"type":"stream_end"}"#),
        ]);

        let exchange = StreamingExchange::new(ExchangeConfig {
            timeout: Duration::ZERO,
            ..Default::default()
        });
        let rx = exchange.spawn(Box::new(socket), session(), "hi".to_string());
        let signals = collect(rx).await;

        let terminals = signals.iter().filter(|s| s.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prompt_guard_single_claim() {
        let state = ExchangeState::new();
        assert!(state.try_mark_prompt_sent());
        assert!(!state.try_mark_prompt_sent());
    }

    #[test]
    fn test_accumulator() {
        let state = ExchangeState::new();
        state.push_chunk("He");
        state.push_chunk("llo");
        assert_eq!(state.accumulated(), "Hello");
    }
}
