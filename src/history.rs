//! History Buffer
//!
//! Bounded, insertion-ordered transcript of chat events, shared between the
//! orchestrator's worker and any adapter that wants to replay recent
//! conversation to a late joiner (the web front-end sends it on connect).
//!
//! Only durable kinds (`UserMessage`, `AiEnd`) are retained; chunks and
//! errors are broadcast live but never stored. When the buffer is full the
//! oldest entry is evicted first.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::events::ChatEvent;

/// Default number of events retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Bounded, thread-safe log of durable chat events
///
/// Appends from the worker task and snapshots from adapter threads are
/// serialized by an internal mutex; a snapshot is an owned copy, safe to
/// iterate without holding any lock.
pub struct HistoryBuffer {
    inner: Mutex<VecDeque<ChatEvent>>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// Create a buffer retaining at most `capacity` events
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// The fixed capacity of this buffer
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, evicting from the head once past capacity
    ///
    /// Non-durable kinds (`AiChunk`, `Error`) are dropped here rather than
    /// trusted to every caller, so the durable-only invariant is local to
    /// the buffer.
    pub fn append(&self, event: ChatEvent) {
        if !event.kind.is_durable() {
            tracing::trace!(kind = ?event.kind, id = %event.id, "Skipping non-durable event");
            return;
        }

        let mut inner = self.inner.lock();
        inner.push_back(event);
        while inner.len() > self.capacity {
            inner.pop_front();
        }
    }

    /// An owned, ordered copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatEvent> {
        self.inner.lock().iter().cloned().collect()
    }

    /// Number of retained events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
