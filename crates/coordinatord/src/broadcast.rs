//! Change broadcaster (spec module F): the global change-epoch clock plus
//! the per-node update-channel registry that long-poll sessions block on.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 1;

pub struct ChangeBroadcaster {
    epoch: AtomicI64,
    channels: DashMap<i64, mpsc::Sender<()>>,
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        Self {
            epoch: AtomicI64::new(Utc::now().timestamp_millis()),
            channels: DashMap::new(),
        }
    }

    pub fn current_epoch(&self) -> i64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Advance the epoch to at least the current wall-clock time, never
    /// backwards, so concurrent mutations still produce a monotonic clock.
    pub fn advance_epoch(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.epoch
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.max(now) + 1)
            })
            .unwrap_or(now)
    }

    /// Create (or recreate, on stream reconnect) a node's update channel.
    pub fn register(&self, node_id: i64) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.channels.insert(node_id, tx);
        rx
    }

    pub fn unregister(&self, node_id: i64) {
        self.channels.remove(&node_id);
    }

    /// Non-blocking signal: a slow or absent consumer never stalls the
    /// sender. The consumer re-reads the epoch on its next tick regardless,
    /// so a dropped signal only delays, never loses, an update.
    pub fn notify(&self, node_id: i64) {
        if let Some(sender) = self.channels.get(&node_id) {
            let _ = sender.try_send(());
        }
    }

    pub fn notify_many<I: IntoIterator<Item = i64>>(&self, node_ids: I) {
        for id in node_ids {
            self.notify(id);
        }
    }

    pub fn is_registered(&self, node_id: i64) -> bool {
        self.channels.contains_key(&node_id)
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_advances_monotonically() {
        let b = ChangeBroadcaster::new();
        let first = b.advance_epoch();
        let second = b.advance_epoch();
        assert!(second > first);
    }

    #[tokio::test]
    async fn notify_wakes_registered_channel() {
        let b = ChangeBroadcaster::new();
        let mut rx = b.register(1);
        b.notify(1);
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn notify_on_unregistered_node_is_a_no_op() {
        let b = ChangeBroadcaster::new();
        b.notify(999);
    }

    #[tokio::test]
    async fn full_channel_drops_signal_without_blocking() {
        let b = ChangeBroadcaster::new();
        let _rx = b.register(1);
        b.notify(1);
        b.notify(1);
        b.notify(1);
    }

    #[test]
    fn unregister_removes_the_channel() {
        let b = ChangeBroadcaster::new();
        b.register(1);
        assert!(b.is_registered(1));
        b.unregister(1);
        assert!(!b.is_registered(1));
    }
}
