use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

/// Enforces "at most one reconcile in flight per object key" (§5) inside
/// one controller process. Cross-controller and cross-replica exclusion
/// is handled elsewhere (independent loops, leader election); this queue
/// only has to keep one controller's own worker pool from double-working
/// a key.
pub struct WorkQueue<K> {
    in_flight: Arc<Mutex<HashSet<K>>>,
    tx: mpsc::UnboundedSender<(K, Duration)>,
    rx: Mutex<mpsc::UnboundedReceiver<(K, Duration)>>,
}

impl<K: Eq + Hash + Clone + Send + 'static> WorkQueue<K> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Requeue a key after `delay`. Used for transient-error backoff (5s)
    /// and not-yet-ready resync (10s) per the reconcile contract.
    pub fn requeue_after(&self, key: K, delay: Duration) {
        let _ = self.tx.send((key, delay));
    }

    /// Waits for the next key whose delay has elapsed and that is not
    /// already being worked, marking it in-flight. Callers must call
    /// `release` when the reconcile completes.
    pub async fn next(&self) -> K {
        loop {
            let (key, delay) = {
                let mut rx = self.rx.lock().await;
                rx.recv().await.expect("work queue sender never drops while queue is alive")
            };
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.contains(&key) {
                // Already being worked; drop this duplicate wakeup.
                continue;
            }
            in_flight.insert(key.clone());
            return key;
        }
    }

    pub async fn release(&self, key: &K) {
        self.in_flight.lock().await.remove(key);
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> Default for WorkQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
