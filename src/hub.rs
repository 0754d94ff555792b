//! Live fan-out of samples to push-channel subscribers.
//!
//! Every subscriber owns a bounded queue. Broadcasting never waits: a
//! subscriber whose queue is full is disconnected on the spot so that a slow
//! consumer cannot hold up the sampler or the other subscribers.

use serde::Serialize;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::{debug, info};

use crate::roles::{Role, Sample};
use crate::trend::{Classification, TrendState};

/// Kind of push message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Snapshot,
    Delta,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Snapshot => "snapshot",
            MessageKind::Delta => "delta",
        }
    }
}

/// One message on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub role: Role,
    pub pid: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub monotonic_secs: f64,
    pub memory_bytes: u64,
    pub cpu_percent: Option<f64>,
    pub trend: Classification,
    pub confidence: f64,
    pub slope_bytes_per_sec: Option<f64>,
}

impl PushMessage {
    pub fn new(kind: MessageKind, sample: &Sample, trend: &TrendState) -> Self {
        Self {
            kind,
            role: sample.role,
            pid: sample.pid,
            timestamp: sample.timestamp,
            monotonic_secs: sample.monotonic_secs,
            memory_bytes: sample.memory_bytes,
            cpu_percent: sample.cpu_percent,
            trend: trend.classification,
            confidence: trend.confidence,
            slope_bytes_per_sec: trend.slope_bytes_per_sec,
        }
    }
}

/// Which roles a subscriber wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleFilter {
    All,
    Only(Role),
}

impl RoleFilter {
    pub fn includes(&self, role: Role) -> bool {
        match self {
            RoleFilter::All => true,
            RoleFilter::Only(r) => *r == role,
        }
    }
}

struct SubscriberSlot {
    filter: RoleFilter,
    tx: mpsc::Sender<PushMessage>,
}

type Slots = Mutex<BTreeMap<u64, SubscriberSlot>>;

fn lock(slots: &Slots) -> MutexGuard<'_, BTreeMap<u64, SubscriberSlot>> {
    match slots.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<PushMessage>,
    slots: Weak<Slots>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next message; `None` once the hub disconnected us.
    pub async fn recv(&mut self) -> Option<PushMessage> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for tests and draining.
    pub fn try_recv(&mut self) -> Option<PushMessage> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = PushMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            if lock(&slots).remove(&self.id).is_some() {
                info!(subscriber = self.id, "Subscriber disconnected");
            }
        }
    }
}

/// Subscriber registry and broadcaster.
pub struct PublishHub {
    slots: Arc<Slots>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl Default for PublishHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishHub {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Registers a subscriber and queues `snapshot` as its first messages.
    ///
    /// Registration and the snapshot enqueue happen under the registry lock,
    /// so no delta can overtake the snapshot.
    pub fn subscribe(
        &self,
        filter: RoleFilter,
        queue_capacity: usize,
        snapshot: Vec<PushMessage>,
    ) -> Subscription {
        self.subscribe_with(filter, queue_capacity, move || snapshot)
    }

    /// Like [`subscribe`](Self::subscribe), but builds the snapshot while the
    /// registry lock is held. A sample recorded concurrently then shows up in
    /// the snapshot, as a delta, or both; never in neither.
    pub fn subscribe_with<F>(&self, filter: RoleFilter, queue_capacity: usize, snapshot: F) -> Subscription
    where
        F: FnOnce() -> Vec<PushMessage>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));

        let mut slots = lock(&self.slots);
        for msg in snapshot().into_iter().filter(|m| filter.includes(m.role)) {
            if tx.try_send(msg).is_err() {
                debug!(subscriber = id, "Snapshot larger than queue, truncating");
                break;
            }
        }
        slots.insert(id, SubscriberSlot { filter, tx });
        info!(subscriber = id, ?filter, "Subscriber connected");

        Subscription {
            id,
            rx,
            slots: Arc::downgrade(&self.slots),
        }
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        if lock(&self.slots).remove(&id).is_some() {
            info!(subscriber = id, "Subscriber removed");
        }
    }

    /// Pushes a delta to every subscriber whose filter includes the role.
    /// Returns the number of subscribers dropped for overflow.
    pub fn broadcast(&self, role: Role, sample: &Sample, trend: &TrendState) -> usize {
        let msg = PushMessage::new(MessageKind::Delta, sample, trend);
        let mut slots = lock(&self.slots);
        let mut overflowed = 0;

        slots.retain(|id, slot| {
            if !slot.filter.includes(role) {
                return true;
            }
            match slot.tx.try_send(msg.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    info!(subscriber = *id, "Subscriber queue full, disconnecting");
                    overflowed += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = *id, "Subscriber already gone");
                    false
                }
            }
        });

        self.dropped.fetch_add(overflowed as u64, Ordering::Relaxed);
        overflowed
    }

    /// Disconnects everyone.
    pub fn close_all(&self) {
        let mut slots = lock(&self.slots);
        let n = slots.len();
        slots.clear();
        if n > 0 {
            info!(subscribers = n, "Closed all subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Subscribers dropped for overflow since start.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
