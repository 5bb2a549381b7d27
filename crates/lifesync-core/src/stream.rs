//! Per-connection snapshot delivery.

use lifesync_protocol::Snapshot;
use std::sync::Arc;
use tokio::sync::watch;

/// Receiving end of a room's snapshot broadcast, handed out by
/// [`RoomHub::join`](crate::RoomHub::join).
///
/// The first call to [`next`](Self::next) yields the room's snapshot at the
/// moment of joining. Later calls wait for the room to publish a newer one.
/// Only the latest snapshot is retained, so a slow reader skips intermediate
/// states but never sees them out of order.
#[derive(Debug)]
pub struct SnapshotStream {
    receiver: watch::Receiver<Arc<Snapshot>>,
    primed: bool,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Snapshot>>) -> Self {
        Self {
            receiver,
            primed: false,
        }
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `None` once the room has been torn down.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        if !self.primed {
            self.primed = true;
            return Some(self.receiver.borrow_and_update().clone());
        }

        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Take a pending snapshot without waiting.
    pub fn try_next(&mut self) -> Option<Arc<Snapshot>> {
        if !self.primed {
            self.primed = true;
            return Some(self.receiver.borrow_and_update().clone());
        }

        match self.receiver.has_changed() {
            Ok(true) => Some(self.receiver.borrow_and_update().clone()),
            _ => None,
        }
    }
}
