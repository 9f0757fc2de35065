//! Keyed, cancelable timers.
//!
//! Cancelling a timer aborts its `tokio::spawn`+`sleep` task, but abort is not instantaneous: a
//! `Timeout` message the task already sent before the abort lands can still be sitting in the
//! engine's mailbox. A generation counter per key makes that race harmless -- a timeout is only
//! delivered if its generation still matches what's on record, which is also the property a
//! re-armed key needs when the old timer hasn't fired yet.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

#[derive(Debug)]
pub(crate) struct Timeout {
    pub key: Arc<str>,
    generation: u64,
}

#[derive(Debug, Default)]
pub(crate) struct TimerTable {
    entries: HashMap<Arc<str>, (JoinHandle<()>, u64)>,
    next_generation: u64,
}

impl TimerTable {
    pub fn arm(&mut self, key: Arc<str>, millis: u64, to_engine: mpsc::Sender<Timeout>) {
        if let Some((handle, _)) = self.entries.remove(&key) {
            handle.abort();
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let spawned_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            let _ = to_engine.send(Timeout { key: spawned_key, generation }).await;
        });

        self.entries.insert(key, (handle, generation));
    }

    pub fn cancel(&mut self, key: &str) {
        if let Some((handle, _)) = self.entries.remove(key) {
            handle.abort();
        }
    }

    /// Returns `true` and retires the entry iff `timeout` wasn't cancelled or superseded.
    pub fn accept(&mut self, timeout: &Timeout) -> bool {
        match self.entries.get(&timeout.key) {
            Some((_, generation)) if *generation == timeout.generation => {
                self.entries.remove(&timeout.key);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        for (_, (handle, _)) in self.entries.drain() {
            handle.abort();
        }
    }
}

impl Drop for TimerTable {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_after_its_delay() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut table = TimerTable::default();
        table.arm(Arc::from("k"), 10, tx);

        let timeout = rx.recv().await.expect("timer should fire");
        assert_eq!(&*timeout.key, "k");
        assert!(table.accept(&timeout));
    }

    #[tokio::test]
    async fn cancel_suppresses_a_pending_fire() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut table = TimerTable::default();
        table.arm(Arc::from("k"), 10, tx);
        table.cancel("k");

        let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(result.is_err(), "cancelled timer must not be delivered");
    }

    #[tokio::test]
    async fn re_arming_before_fire_supersedes_the_stale_generation() {
        let (tx, _rx) = mpsc::channel(4);
        let mut table = TimerTable::default();
        table.arm(Arc::from("k"), 10_000, tx.clone());
        // Re-arm before the first timer can fire; even if a stale `Timeout` carrying the old
        // generation slipped through before the abort landed, `accept` must reject it, and only
        // the current generation may be delivered.
        table.arm(Arc::from("k"), 10_000, tx);

        let stale = Timeout { key: Arc::from("k"), generation: 0 };
        assert!(!table.accept(&stale), "a superseded generation must be rejected");

        let current = Timeout { key: Arc::from("k"), generation: 1 };
        assert!(table.accept(&current), "current generation must be accepted");
    }
}
