//! Status broadcast to subscribers.

use fieldsync_protocol::StatusSnapshot;
use tokio::sync::watch;

/// Publishes [`StatusSnapshot`]s over a watch channel.
///
/// Subscribers only wake when the snapshot actually changed. Dropping a
/// receiver unsubscribes it.
#[derive(Debug)]
pub struct StatusBus {
    tx: watch::Sender<StatusSnapshot>,
}

impl StatusBus {
    /// Creates a bus holding `initial`.
    pub fn new(initial: StatusSnapshot) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Publishes a snapshot. Returns true if it differed from the last one.
    pub fn publish(&self, snapshot: StatusSnapshot) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        })
    }

    /// The last published snapshot.
    pub fn current(&self) -> StatusSnapshot {
        *self.tx.borrow()
    }

    /// Subscribes to future snapshots.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
