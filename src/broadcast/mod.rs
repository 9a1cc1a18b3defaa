// ABOUTME: Live fan-out of aggregated intelligence to per-conversation subscribers
// ABOUTME: Bounded drop-oldest queues so a slow subscriber never blocks the aggregator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Broadcaster
//!
//! Subscribers register per `(tenant, conversation)` and receive an initial
//! `connected` envelope, a snapshot of the current aggregated view when one
//! exists, and an `intelligence_update` on every merge thereafter. Each
//! subscriber owns a bounded queue; on overflow the oldest queued envelope
//! is dropped and a counter incremented, so publishing never blocks. A
//! subscriber whose handle has gone away is reaped on the next publish.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use crate::models::{AggregatedIntelligence, ConversationKey};
use uuid::Uuid;

/// Envelopes delivered to streaming subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEnvelope {
    /// Sent once on registration
    Connected {
        /// Conversation the subscription is bound to
        conversation_id: String,
    },
    /// Sent on every merged change (and as the registration snapshot)
    IntelligenceUpdate {
        /// Conversation the update belongs to
        conversation_id: String,
        /// The merged view
        data: Box<AggregatedIntelligence>,
    },
    /// Liveness response to a subscriber ping
    Pong,
    /// Terminal envelope; no further envelopes follow
    Closed,
}

struct QueueState {
    items: VecDeque<StreamEnvelope>,
    closed: bool,
}

/// Bounded drop-oldest envelope queue shared by one subscriber and the
/// broadcaster
struct SubscriberQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    arrivals: Notify,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            arrivals: Notify::new(),
        }
    }

    /// Enqueue without blocking; returns whether an old envelope was dropped
    fn push(&self, envelope: StreamEnvelope) -> bool {
        let mut dropped = false;
        {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.closed {
                return false;
            }
            if state.items.len() >= self.capacity {
                state.items.pop_front();
                dropped = true;
            }
            state.items.push_back(envelope);
        }
        self.arrivals.notify_one();
        dropped
    }

    fn close(&self) {
        {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.closed = true;
            state.items.push_back(StreamEnvelope::Closed);
        }
        self.arrivals.notify_one();
    }

    async fn recv(&self) -> Option<StreamEnvelope> {
        loop {
            let arrival = self.arrivals.notified();
            {
                let mut state = self
                    .state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(envelope) = state.items.pop_front() {
                    return Some(envelope);
                }
                if state.closed {
                    return None;
                }
            }
            arrival.await;
        }
    }

    fn try_recv(&self) -> Option<StreamEnvelope> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .items
            .pop_front()
    }
}

/// Subscriber handle returned by [`Broadcaster::subscribe`]
pub struct Subscription {
    id: Uuid,
    key: ConversationKey,
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Unique subscriber id, used for unsubscribe and ping
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Subscription key
    #[must_use]
    pub const fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Receive the next envelope; `None` after the terminal close
    pub async fn recv(&self) -> Option<StreamEnvelope> {
        self.queue.recv().await
    }

    /// Non-blocking receive
    #[must_use]
    pub fn try_recv(&self) -> Option<StreamEnvelope> {
        self.queue.try_recv()
    }
}

struct SubscriberSlot {
    id: Uuid,
    queue: Arc<SubscriberQueue>,
}

struct BroadcasterInner {
    queue_depth: usize,
    subscribers: RwLock<HashMap<ConversationKey, Vec<SubscriberSlot>>>,
    snapshots: RwLock<HashMap<ConversationKey, AggregatedIntelligence>>,
    dropped_events: AtomicU64,
}

/// Per-conversation fan-out of merged intelligence
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Broadcaster {
    /// Create a broadcaster with the given per-subscriber queue depth
    #[must_use]
    pub fn new(queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                queue_depth,
                subscribers: RwLock::new(HashMap::new()),
                snapshots: RwLock::new(HashMap::new()),
                dropped_events: AtomicU64::new(0),
            }),
        }
    }

    /// Register a subscriber for a conversation
    ///
    /// Delivers `connected` immediately, followed by a snapshot of the
    /// current aggregated view when the pipeline has already produced one.
    pub async fn subscribe(&self, key: ConversationKey) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(self.inner.queue_depth));
        let id = Uuid::new_v4();

        queue.push(StreamEnvelope::Connected {
            conversation_id: key.conversation_id.clone(),
        });
        if let Some(snapshot) = self.inner.snapshots.read().await.get(&key) {
            queue.push(StreamEnvelope::IntelligenceUpdate {
                conversation_id: key.conversation_id.clone(),
                data: Box::new(snapshot.clone()),
            });
        }

        self.inner
            .subscribers
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .push(SubscriberSlot {
                id,
                queue: Arc::clone(&queue),
            });

        info!(key = %key, subscriber = %id, "Subscriber connected");
        Subscription { id, key, queue }
    }

    /// Push a merged view to every subscriber of the conversation
    ///
    /// Never blocks: slow subscribers lose their oldest queued envelope.
    /// Subscribers whose handles are gone are unsubscribed here.
    pub async fn publish(&self, key: &ConversationKey, intelligence: AggregatedIntelligence) {
        self.inner
            .snapshots
            .write()
            .await
            .insert(key.clone(), intelligence.clone());

        let mut subscribers = self.inner.subscribers.write().await;
        let Some(slots) = subscribers.get_mut(key) else {
            debug!(key = %key, "No subscribers for update");
            return;
        };

        slots.retain(|slot| {
            // Only the broadcaster holds the queue once the handle is gone.
            if Arc::strong_count(&slot.queue) == 1 {
                warn!(key = %key, subscriber = %slot.id, "Reaping dead subscriber");
                return false;
            }
            let dropped = slot.queue.push(StreamEnvelope::IntelligenceUpdate {
                conversation_id: key.conversation_id.clone(),
                data: Box::new(intelligence.clone()),
            });
            if dropped {
                self.inner.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
            true
        });
        if slots.is_empty() {
            subscribers.remove(key);
        }
    }

    /// Remove a subscriber; idempotent
    pub async fn unsubscribe(&self, key: &ConversationKey, id: Uuid) {
        let mut subscribers = self.inner.subscribers.write().await;
        if let Some(slots) = subscribers.get_mut(key) {
            if let Some(position) = slots.iter().position(|slot| slot.id == id) {
                let slot = slots.remove(position);
                slot.queue.close();
                info!(key = %key, subscriber = %id, "Subscriber disconnected");
            }
            if slots.is_empty() {
                subscribers.remove(key);
            }
        }
    }

    /// Answer a subscriber ping; returns whether the subscriber exists
    pub async fn ping(&self, key: &ConversationKey, id: Uuid) -> bool {
        let subscribers = self.inner.subscribers.read().await;
        let Some(slot) = subscribers
            .get(key)
            .and_then(|slots| slots.iter().find(|slot| slot.id == id))
        else {
            return false;
        };
        slot.queue.push(StreamEnvelope::Pong);
        true
    }

    /// Close every subscriber with a terminal envelope and clear state
    pub async fn close_all(&self) {
        let mut subscribers = self.inner.subscribers.write().await;
        for slots in subscribers.values() {
            for slot in slots {
                slot.queue.close();
            }
        }
        subscribers.clear();
        self.inner.snapshots.write().await.clear();
        info!("Broadcaster closed");
    }

    /// Current cached view for a conversation, if the pipeline has produced
    /// any partial result for it
    ///
    /// This is the read path for the intelligence lookup collaborator; a
    /// `None` maps to its not-found response.
    pub async fn snapshot(&self, key: &ConversationKey) -> Option<AggregatedIntelligence> {
        self.inner.snapshots.read().await.get(key).cloned()
    }

    /// Total envelopes dropped to queue overflow since start
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped_events.load(Ordering::Relaxed)
    }

    /// Live subscriber count for a conversation
    pub async fn subscriber_count(&self, key: &ConversationKey) -> usize {
        self.inner
            .subscribers
            .read()
            .await
            .get(key)
            .map_or(0, Vec::len)
    }
}
