use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use meterline_core::UsageEvent;

/// Result of pushing into one delivery queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue was full; the oldest pending event was discarded.
    DroppedOldest,
    /// Subscriber already gone. Silently ignored by publishers.
    Closed,
}

#[derive(Default)]
struct QueueState {
    buf: VecDeque<Arc<UsageEvent>>,
    closed: bool,
    dropped: u64,
}

/// Bounded single-consumer delivery queue.
///
/// Producers never wait: on overflow the oldest pending event is evicted. The
/// consumer suspends on a `Notify` between events.
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    // Critical sections never panic; recover the guard instead of propagating poison.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, ev: Arc<UsageEvent>) -> PushOutcome {
        let outcome = {
            let mut st = self.lock();
            if st.closed {
                return PushOutcome::Closed;
            }
            let outcome = if st.buf.len() >= self.capacity {
                st.buf.pop_front();
                st.dropped += 1;
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Queued
            };
            st.buf.push_back(ev);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Next event, or `None` once the queue is closed. Pending events are
    /// discarded on close.
    pub async fn recv(&self) -> Option<Arc<UsageEvent>> {
        loop {
            {
                let mut st = self.lock();
                if st.closed {
                    return None;
                }
                if let Some(ev) = st.buf.pop_front() {
                    return Some(ev);
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<Arc<UsageEvent>> {
        let mut st = self.lock();
        if st.closed {
            return None;
        }
        st.buf.pop_front()
    }

    pub fn close(&self) {
        {
            let mut st = self.lock();
            st.closed = true;
            st.buf.clear();
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events evicted by overflow over this queue's lifetime.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
