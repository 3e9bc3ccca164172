//! Fan-out of relay frames to every connection except the sender.
//!
//! The hub is an explicit registry: one bounded queue per connection, added
//! on connect and removed on disconnect. Delivery is `try_send` per
//! recipient, so a slow or vanished connection loses the frame without
//! holding up anyone else. Nothing is retried or persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::protocol::{ChannelMessage, ProtocolError};

/// Encoded frame shared by every recipient.
pub type Frame = Arc<Vec<u8>>;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Broadcast calls
    pub messages_sent: u64,
    /// Frames enqueued for a recipient
    pub deliveries: u64,
    /// Frames lost to a full or closed recipient queue
    pub messages_dropped: u64,
    pub active_subscribers: usize,
}

/// Atomic counters, updated without taking the registry write lock.
#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    deliveries: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Registry of live connections for cell-edit fan-out.
pub struct BroadcastHub {
    subscribers: RwLock<HashMap<Uuid, mpsc::Sender<Frame>>>,
    /// Frames buffered per subscriber before drops begin
    capacity: usize,
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            atomic_stats: AtomicBroadcastStats::default(),
        }
    }

    /// Register a connection. Re-subscribing an id replaces its queue.
    pub async fn subscribe(&self, connection_id: Uuid) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let previous = self.subscribers.write().await.insert(connection_id, tx);
        if previous.is_some() {
            log::debug!("Connection {connection_id} re-subscribed; old queue closed");
        }
        rx
    }

    pub async fn unsubscribe(&self, connection_id: &Uuid) -> bool {
        self.subscribers.write().await.remove(connection_id).is_some()
    }

    /// Deliver `frame` to every subscriber except `sender`.
    ///
    /// Returns the number of recipients the frame was enqueued for.
    pub async fn broadcast_from(&self, sender: Uuid, frame: Frame) -> usize {
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);

        let subscribers = self.subscribers.read().await;
        let mut delivered = 0;
        let mut dropped = 0;
        for (id, tx) in subscribers.iter() {
            if *id == sender {
                continue;
            }
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    log::warn!("Subscriber {id} is lagging; frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    dropped += 1;
                    log::debug!("Subscriber {id} already closed; frame dropped");
                }
            }
        }
        drop(subscribers);

        self.atomic_stats.deliveries.fetch_add(delivered, Ordering::Relaxed);
        self.atomic_stats.messages_dropped.fetch_add(dropped, Ordering::Relaxed);
        delivered as usize
    }

    /// Encode and deliver a message from `msg.sender`.
    pub async fn broadcast(&self, msg: &ChannelMessage) -> Result<usize, ProtocolError> {
        let encoded = Arc::new(msg.encode()?);
        Ok(self.broadcast_from(msg.sender, encoded).await)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_subscribed(&self, connection_id: &Uuid) -> bool {
        self.subscribers.read().await.contains_key(connection_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            deliveries: self.atomic_stats.deliveries.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_subscribers: self.subscriber_count().await,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
