use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use meterline_core::UsageEvent;

use super::queue::{DeliveryQueue, PushOutcome};

/// Read side of one subscription. Obtained from [`SubscriberRegistry::subscribe`].
pub struct Subscription {
    user_id: String,
    id: u64,
    queue: Arc<DeliveryQueue>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Suspends until the next event; `None` after unsubscribe/shutdown.
    pub async fn recv(&self) -> Option<Arc<UsageEvent>> {
        self.queue.recv().await
    }

    pub fn try_recv(&self) -> Option<Arc<UsageEvent>> {
        self.queue.try_recv()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

/// Per-user fan-out of usage events.
///
/// `user_id -> {subscription_id -> queue}`. The outer map is sharded, so
/// subscribe/unsubscribe/publish for unrelated users touch different locks.
/// Publishing snapshots the user's queues and pushes outside the shard lock;
/// pushes never wait on a consumer.
pub struct SubscriberRegistry {
    users: DashMap<String, HashMap<u64, Arc<DeliveryQueue>>>,
    seq: AtomicU64,
    capacity: usize,
    shut_down: AtomicBool,

    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            users: DashMap::new(),
            seq: AtomicU64::new(1),
            capacity: capacity.max(1),
            shut_down: AtomicBool::new(false),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, user_id: &str) -> Subscription {
        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(DeliveryQueue::new(self.capacity));

        if self.shut_down.load(Ordering::Acquire) {
            queue.close();
        } else {
            self.users
                .entry(user_id.to_string())
                .or_default()
                .insert(id, Arc::clone(&queue));
            // raced with close_all
            if self.shut_down.load(Ordering::Acquire) {
                self.unsubscribe(user_id, id);
            } else {
                tracing::debug!(user=%user_id, sub=id, "subscribed");
            }
        }

        Subscription {
            user_id: user_id.to_string(),
            id,
            queue,
        }
    }

    /// Idempotent. Once this returns, nothing more is delivered to `id`.
    pub fn unsubscribe(&self, user_id: &str, id: u64) {
        let removed = self
            .users
            .get_mut(user_id)
            .and_then(|mut set| set.remove(&id));
        self.users.remove_if(user_id, |_, set| set.is_empty());

        if let Some(q) = removed {
            q.close();
            tracing::debug!(user=%user_id, sub=id, "unsubscribed");
        }
    }

    /// Push `event` to every live subscription of `user_id`. Returns how many
    /// queues accepted it; zero subscribers means the event is dropped.
    pub fn publish(&self, user_id: &str, event: &UsageEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let queues: Vec<Arc<DeliveryQueue>> = match self.users.get(user_id) {
            Some(set) => set.values().cloned().collect(),
            None => return 0,
        };

        let event = Arc::new(event.clone());
        let mut accepted = 0;
        for q in queues {
            match q.push(Arc::clone(&event)) {
                PushOutcome::Queued => accepted += 1,
                PushOutcome::DroppedOldest => {
                    accepted += 1;
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(user=%user_id, "delivery queue full, dropped oldest event");
                }
                PushOutcome::Closed => {}
            }
        }
        self.delivered.fetch_add(accepted as u64, Ordering::Relaxed);
        accepted
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.users.get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn total_subscribers(&self) -> usize {
        self.users.iter().map(|e| e.value().len()).sum()
    }

    /// Close every queue and refuse new registrations. Channel loops observe
    /// the close and unsubscribe on their way out.
    pub fn close_all(&self) {
        self.shut_down.store(true, Ordering::Release);
        let users: Vec<String> = self.users.iter().map(|e| e.key().clone()).collect();
        for u in users {
            if let Some((_, set)) = self.users.remove(&u) {
                for q in set.values() {
                    q.close();
                }
            }
        }
        tracing::info!("subscriber registry closed");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Scoped registration: unsubscribes exactly once when dropped.
pub struct SubscriptionGuard {
    registry: Arc<SubscriberRegistry>,
    sub: Subscription,
}

impl SubscriptionGuard {
    pub fn new(registry: Arc<SubscriberRegistry>, sub: Subscription) -> Self {
        Self { registry, sub }
    }
}

impl std::ops::Deref for SubscriptionGuard {
    type Target = Subscription;

    fn deref(&self) -> &Subscription {
        &self.sub
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.sub.user_id, self.sub.id);
    }
}
