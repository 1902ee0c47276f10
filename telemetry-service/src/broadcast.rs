use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use telemetry_client::domain::Reading;
use tokio::sync::mpsc;

pub type SubscriberId = u64;

/// Live fan-out registry. Holds one bounded channel per subscriber and
/// pushes every persisted reading to all of them, in ingestion order.
///
/// There is no backlog or replay: a subscriber only sees readings
/// published while it is registered. A subscriber whose channel is
/// closed or full at publish time is dropped on that publish (lazy
/// cleanup), so a slow sink never stalls the loop for the others.
pub struct BroadcastRegistry {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Arc<Reading>>>>,
}

impl BroadcastRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(0),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Arc<Reading>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .expect("subscriber set poisoned")
            .insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .lock()
            .expect("subscriber set poisoned")
            .remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("subscriber set poisoned")
            .len()
    }

    /// Push one reading to every current subscriber. Failures are
    /// isolated per subscriber and never surface to the ingesting
    /// caller.
    pub fn publish(&self, reading: &Reading) {
        let reading = Arc::new(reading.clone());
        let mut dead: Vec<SubscriberId> = Vec::new();

        let mut subscribers = self.subscribers.lock().expect("subscriber set poisoned");
        for (id, tx) in subscribers.iter() {
            if let Err(e) = tx.try_send(Arc::clone(&reading)) {
                tracing::warn!(subscriber = *id, error = %e, "dropping live subscriber");
                dead.push(*id);
            }
        }
        for id in dead {
            subscribers.remove(&id);
            metrics::counter!("broadcast_subscribers_dropped_total").increment(1);
        }

        metrics::counter!("broadcast_readings_published_total").increment(1);
    }
}
