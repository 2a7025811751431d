//! Fan-out of completed results to every connected listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use flume::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{ErrorKind, SubscriberUnreachable, UnreachableReason};

pub type SubscriberId = u64;

/// Message pushed to every subscriber once per completed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEvent {
    pub text: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: f64,
    pub avg_latency_ms: f64,
    pub processed_count: u64,
    pub dropped_count: u64,
    pub frame_sequence: u64,
    pub model: String,
    /// When the request was started
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriberId,
    tx: Sender<Arc<str>>,
}

/// Receiving end handed to a listener.
///
/// Dropping it disconnects; the hub prunes it on the next publish.
pub struct Subscription {
    id: SubscriberId,
    rx: Receiver<Arc<str>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next serialized event, or `None` once removed from the hub
    pub async fn recv(&self) -> Option<Arc<str>> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }

    /// Next event, decoded
    pub async fn recv_event(&self) -> Option<ResultEvent> {
        let raw = self.recv().await?;
        match serde_json::from_str(&raw) {
            Ok(event) => Some(event),
            Err(e) => {
                error!("Subscriber {} got undecodable event: {}", self.id, e);
                None
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Outcome of one publish
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub removed: Vec<SubscriberUnreachable>,
}

/// Subscriber set with copy-on-write membership.
///
/// `publish` iterates a snapshot, so concurrent connects and disconnects never
/// expose a half-mutated set. Each send is a non-blocking `try_send` into a
/// bounded per-subscriber buffer; a full or closed buffer removes that
/// subscriber and delivery to the others continues.
pub struct BroadcastHub {
    subscribers: ArcSwap<Vec<Subscriber>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = flume::bounded(self.buffer);
        let sub = Subscriber { id, tx };

        self.subscribers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(sub.clone());
            next
        });
        info!("Subscriber {} connected ({} total)", id, self.len());

        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.remove(&[id]) > 0;
        if removed {
            info!("Subscriber {} disconnected", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.subscribers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn publish(&self, event: &ResultEvent) -> PublishReport {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize result event: {}", e);
                return PublishReport::default();
            }
        };

        let snapshot = self.subscribers.load();
        let mut report = PublishReport::default();

        for sub in snapshot.iter() {
            match sub.tx.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => report.removed.push(SubscriberUnreachable {
                    id: sub.id,
                    reason: UnreachableReason::Stalled,
                }),
                Err(TrySendError::Disconnected(_)) => report.removed.push(SubscriberUnreachable {
                    id: sub.id,
                    reason: UnreachableReason::Disconnected,
                }),
            }
        }

        if !report.removed.is_empty() {
            let ids: Vec<SubscriberId> = report.removed.iter().map(|u| u.id).collect();
            self.remove(&ids);
            for unreachable in &report.removed {
                info!("Dropping {}", unreachable);
            }
        }
        debug!(
            "Published frame {} to {} subscriber(s)",
            event.frame_sequence, report.delivered
        );

        report
    }

    fn remove(&self, ids: &[SubscriberId]) -> usize {
        let before = self.subscribers.rcu(|current| {
            current
                .iter()
                .filter(|s| !ids.contains(&s.id))
                .cloned()
                .collect::<Vec<_>>()
        });
        before.iter().filter(|s| ids.contains(&s.id)).count()
    }
}
