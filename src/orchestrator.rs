//! Chat Orchestrator
//!
//! The coordination core of the relay. Submissions from any front end
//! funnel through [`Orchestrator::submit`], which broadcasts the user
//! message immediately and enqueues a streaming job. A single worker task
//! drains the queue, so backend exchanges run strictly one at a time in
//! arrival order while submission itself never waits on backend I/O.
//!
//! # Design Philosophy
//!
//! The worker owns all backend interaction; submit only touches memory and
//! channels. Failures at any stage of an exchange (session provisioning,
//! connect, streaming) surface as an error event on the same correlation
//! id, so front ends always see a terminal event for every prompt they
//! submitted.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::AgentBackend;
use crate::events::{ChatEvent, ChatEventKind, CorrelationId, EventContext, Submission};
use crate::exchange::{ExchangeConfig, ExchangeSignal, StreamingExchange};
use crate::history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
use crate::responder::Responder;

/// One queued prompt awaiting its backend exchange
struct StreamingJob {
    id: CorrelationId,
    prompt: String,
    context: EventContext,
}

/// The relay's coordination core
///
/// Cheap to clone the pieces of: history and responders are shared behind
/// `Arc`, and the job queue is a channel sender.
pub struct Orchestrator<B: AgentBackend> {
    backend: Arc<B>,
    history: Arc<HistoryBuffer>,
    responders: Arc<Vec<Arc<dyn Responder>>>,
    jobs: mpsc::UnboundedSender<StreamingJob>,
}

impl<B: AgentBackend + 'static> Orchestrator<B> {
    /// Create an orchestrator and spawn its worker task
    ///
    /// The responder set is fixed for the orchestrator's lifetime; dynamic
    /// audiences belong inside a responder (see
    /// [`ChannelResponder`](crate::responder::ChannelResponder)).
    pub fn new(
        backend: B,
        responders: Vec<Arc<dyn Responder>>,
        exchange_config: ExchangeConfig,
        history_capacity: usize,
    ) -> Self {
        let backend = Arc::new(backend);
        let history = Arc::new(HistoryBuffer::new(history_capacity));
        let responders = Arc::new(responders);
        let (jobs, job_rx) = mpsc::unbounded_channel();

        tokio::spawn(worker(
            Arc::clone(&backend),
            Arc::clone(&history),
            Arc::clone(&responders),
            exchange_config,
            job_rx,
        ));

        Self {
            backend,
            history,
            responders,
            jobs,
        }
    }

    /// Create an orchestrator with default exchange and history settings
    pub fn with_defaults(backend: B, responders: Vec<Arc<dyn Responder>>) -> Self {
        Self::new(
            backend,
            responders,
            ExchangeConfig::default(),
            DEFAULT_HISTORY_CAPACITY,
        )
    }

    /// Accept a submission: record it, announce it, queue its exchange
    ///
    /// Returns the correlation id that every event of this prompt/response
    /// pair will carry. The user message is broadcast before the job is
    /// queued, so front ends always see the prompt before any response
    /// events for it.
    pub async fn submit(&self, submission: Submission, context: EventContext) -> CorrelationId {
        let id = submission
            .id
            .clone()
            .map(CorrelationId::from)
            .unwrap_or_default();

        tracing::info!(
            id = %id,
            source = %submission.source,
            author = %submission.author,
            "Submission accepted"
        );

        let event = ChatEvent::user_message(&submission, id.clone(), context.clone());
        self.history.append(event.clone());
        broadcast(&self.responders, &event).await;

        let job = StreamingJob {
            id: id.clone(),
            prompt: submission.text,
            context,
        };
        if self.jobs.send(job).is_err() {
            // Worker gone; only happens during shutdown.
            tracing::error!(id = %id, "Job queue closed, submission dropped");
        }

        id
    }

    /// The shared history buffer
    #[must_use]
    pub fn history(&self) -> Arc<HistoryBuffer> {
        Arc::clone(&self.history)
    }

    /// The backend this orchestrator talks to
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Route one event to every responder's matching hook
async fn broadcast(responders: &[Arc<dyn Responder>], event: &ChatEvent) {
    for responder in responders {
        match event.kind {
            ChatEventKind::UserMessage => responder.broadcast_user_message(event).await,
            ChatEventKind::AiChunk => responder.broadcast_ai_chunk(event).await,
            ChatEventKind::AiEnd => responder.broadcast_ai_end(event).await,
            ChatEventKind::Error => responder.broadcast_error(event).await,
        }
    }
}

/// Drain the job queue, one exchange at a time
async fn worker<B: AgentBackend>(
    backend: Arc<B>,
    history: Arc<HistoryBuffer>,
    responders: Arc<Vec<Arc<dyn Responder>>>,
    exchange_config: ExchangeConfig,
    mut jobs: mpsc::UnboundedReceiver<StreamingJob>,
) {
    tracing::debug!(backend = backend.name(), "Worker started");
    while let Some(job) = jobs.recv().await {
        process_job(&*backend, &history, &responders, &exchange_config, job).await;
    }
    tracing::debug!("Worker stopped");
}

async fn process_job<B: AgentBackend>(
    backend: &B,
    history: &HistoryBuffer,
    responders: &[Arc<dyn Responder>],
    exchange_config: &ExchangeConfig,
    job: StreamingJob,
) {
    let session = match backend.create_session().await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(id = %job.id, error = %e, "Session creation failed");
            let event = ChatEvent::error(job.id, e.to_string(), job.context);
            broadcast(responders, &event).await;
            return;
        }
    };

    let socket = match backend.connect(&session).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!(id = %job.id, session = %session, error = %e, "Backend connect failed");
            let event = ChatEvent::error(job.id, e.to_string(), job.context);
            broadcast(responders, &event).await;
            return;
        }
    };

    let exchange = StreamingExchange::new(exchange_config.clone());
    let mut signals = exchange.spawn(socket, session, job.prompt);

    while let Some(signal) = signals.recv().await {
        let event = match signal {
            ExchangeSignal::Chunk(text) => {
                ChatEvent::ai_chunk(job.id.clone(), text, job.context.clone())
            }
            ExchangeSignal::End { full_text } => {
                let event = ChatEvent::ai_end(job.id.clone(), full_text, job.context.clone());
                history.append(event.clone());
                event
            }
            ExchangeSignal::Failed { error } => {
                ChatEvent::error(job.id.clone(), error, job.context.clone())
            }
        };
        broadcast(responders, &event).await;
    }
}
