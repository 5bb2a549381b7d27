//! Room abstraction for Lifesync.
//!
//! A room owns a [`PlayerRegistry`], the set of connections joined to it and
//! a single-slot broadcast of its latest snapshot. All mutations go through
//! the room's mutex, which is only ever held for in-memory work.

use crate::connection::ConnectionId;
use crate::registry::{PlayerId, PlayerRegistry};
use crate::stream::SnapshotStream;
use lifesync_protocol::Snapshot;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

/// Maximum room code and player id length.
pub const MAX_ID_LENGTH: usize = 128;

/// A room code.
pub type RoomCode = String;

/// Validate a room code or player id.
///
/// # Errors
///
/// Returns an error message if the identifier is invalid.
pub fn validate_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("Identifier cannot be empty");
    }
    if id.len() > MAX_ID_LENGTH {
        return Err("Identifier too long");
    }
    if id.chars().any(char::is_control) {
        return Err("Identifier contains control characters");
    }
    Ok(())
}

/// Why a join was refused by a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinRejected {
    /// The room was torn down; the caller should retry on a fresh room.
    Closed,
    /// The connection is already registered.
    AlreadyJoined,
}

/// The room was torn down before the mutation could be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RoomClosed;

/// Result of removing a connection from a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Departure {
    /// Connections still joined.
    pub remaining: usize,
    /// Idle epoch at the time of departure.
    pub epoch: u64,
}

#[derive(Debug)]
struct RoomState {
    registry: PlayerRegistry,
    /// Joined connections and the player each one speaks for.
    connections: HashMap<ConnectionId, PlayerId>,
    /// Bumped on activity so stale teardown timers can tell they lost.
    epoch: u64,
    closed: bool,
    /// Pending idle teardown, if one is scheduled.
    teardown_timer: Option<AbortHandle>,
}

/// A room of players sharing one life counter table.
#[derive(Debug)]
pub struct Room {
    code: RoomCode,
    state: Mutex<RoomState>,
    sender: watch::Sender<Arc<Snapshot>>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(code: impl Into<RoomCode>, default_life: i64) -> Self {
        let (sender, _) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            code: code.into(),
            state: Mutex::new(RoomState {
                registry: PlayerRegistry::new(default_life),
                connections: HashMap::new(),
                epoch: 0,
                closed: false,
                teardown_timer: None,
            }),
            sender,
        }
    }

    /// Get the room code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Number of joined connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Number of players ever seen in this room.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.sender.borrow().clone()
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a fresh snapshot while the state lock is held.
    fn publish(&self, state: &RoomState) -> Arc<Snapshot> {
        let snapshot = Arc::new(state.registry.snapshot());
        self.sender.send_replace(Arc::clone(&snapshot));
        trace!(
            room = %self.code,
            receivers = self.sender.receiver_count(),
            "Published snapshot"
        );
        snapshot
    }

    pub(crate) fn join(
        &self,
        player_id: &str,
        connection_id: ConnectionId,
    ) -> Result<SnapshotStream, JoinRejected> {
        let mut state = self.lock();

        if state.closed {
            return Err(JoinRejected::Closed);
        }
        if state.connections.contains_key(&connection_id) {
            return Err(JoinRejected::AlreadyJoined);
        }

        let (_, created) = state.registry.get_or_insert(player_id);
        state.connections.insert(connection_id, player_id.to_string());
        state.epoch += 1;
        if let Some(timer) = state.teardown_timer.take() {
            timer.abort();
        }

        // Existing members only need a snapshot when the table changed.
        if created {
            self.publish(&state);
        }

        debug!(
            room = %self.code,
            player = %player_id,
            connections = state.connections.len(),
            "Connection joined room"
        );

        Ok(SnapshotStream::new(self.sender.subscribe()))
    }

    pub(crate) fn leave(&self, player_id: &str, connection_id: &ConnectionId) -> Option<Departure> {
        let mut state = self.lock();

        let owner = state.connections.remove(connection_id)?;
        if owner != player_id {
            warn!(
                room = %self.code,
                connection = %connection_id,
                registered = %owner,
                given = %player_id,
                "Leave called with mismatched player id"
            );
        }

        debug!(
            room = %self.code,
            player = %owner,
            connection = %connection_id,
            connections = state.connections.len(),
            "Connection left room"
        );

        Some(Departure {
            remaining: state.connections.len(),
            epoch: state.epoch,
        })
    }

    /// Apply a mutation to the registry and broadcast the result.
    ///
    /// Returns the published snapshot and, when nobody is connected, the
    /// idle epoch to schedule teardown against.
    pub(crate) fn mutate<F>(&self, f: F) -> Result<(Arc<Snapshot>, Option<u64>), RoomClosed>
    where
        F: FnOnce(&mut PlayerRegistry),
    {
        let mut state = self.lock();

        if state.closed {
            return Err(RoomClosed);
        }

        f(&mut state.registry);
        let snapshot = self.publish(&state);

        let idle = if state.connections.is_empty() {
            state.epoch += 1;
            Some(state.epoch)
        } else {
            None
        };

        Ok((snapshot, idle))
    }

    /// Attach the timer for a teardown scheduled at `epoch`.
    ///
    /// Any previously attached timer is cancelled. A timer that is already
    /// stale, because the room saw activity since `epoch`, is cancelled
    /// instead of attached.
    pub(crate) fn arm_teardown(&self, epoch: u64, timer: AbortHandle) {
        let mut state = self.lock();

        if state.closed || !state.connections.is_empty() || state.epoch != epoch {
            timer.abort();
            return;
        }
        if let Some(previous) = state.teardown_timer.replace(timer) {
            previous.abort();
        }
    }

    /// Mark the room closed if it is still idle at `epoch`.
    ///
    /// Returns `true` if the room was closed by this call.
    pub(crate) fn try_close(&self, epoch: u64) -> bool {
        let mut state = self.lock();

        if state.closed || !state.connections.is_empty() || state.epoch != epoch {
            return false;
        }

        state.closed = true;
        state.teardown_timer = None;
        true
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validation() {
        assert!(validate_id("abcd").is_ok());
        assert!(validate_id("room with spaces").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("bad\nid").is_err());

        let long_id = "a".repeat(MAX_ID_LENGTH + 1);
        assert!(validate_id(&long_id).is_err());
    }

    #[test]
    fn test_room_join_leave() {
        let room = Room::new("abcd", 0);
        let conn = ConnectionId::new("conn-1");

        let _stream = room.join("p1", conn.clone()).unwrap();
        assert_eq!(room.connection_count(), 1);
        assert_eq!(room.player_count(), 1);

        assert_eq!(
            room.join("p1", conn.clone()).unwrap_err(),
            JoinRejected::AlreadyJoined
        );

        let departure = room.leave("p1", &conn).unwrap();
        assert_eq!(departure.remaining, 0);
        assert_eq!(room.connection_count(), 0);

        // Players outlive their connections.
        assert_eq!(room.player_count(), 1);
        assert!(room.leave("p1", &conn).is_none());
    }

    #[test]
    fn test_room_try_close() {
        let room = Room::new("abcd", 0);
        let conn = ConnectionId::new("conn-1");

        let _stream = room.join("p1", conn.clone()).unwrap();
        let departure = room.leave("p1", &conn).unwrap();

        // A join after the departure invalidates the pending teardown.
        let _stream = room.join("p1", ConnectionId::new("conn-2")).unwrap();
        assert!(!room.try_close(departure.epoch));

        let departure = room.leave("p1", &ConnectionId::new("conn-2")).unwrap();
        assert!(room.try_close(departure.epoch));
        assert!(room.is_closed());

        assert_eq!(
            room.join("p1", ConnectionId::new("conn-3")).unwrap_err(),
            JoinRejected::Closed
        );
        assert_eq!(room.mutate(|_| {}).unwrap_err(), RoomClosed);
    }

    #[tokio::test]
    async fn test_room_keeps_one_teardown_timer() {
        let room = Room::new("abcd", 0);
        let conn = ConnectionId::new("conn-1");
        let _stream = room.join("p1", conn.clone()).unwrap();
        let departure = room.leave("p1", &conn).unwrap();

        let first = tokio::spawn(std::future::pending::<()>());
        room.arm_teardown(departure.epoch, first.abort_handle());
        let second = tokio::spawn(std::future::pending::<()>());
        room.arm_teardown(departure.epoch, second.abort_handle());

        // Re-arming cancels the previous timer.
        assert!(first.await.unwrap_err().is_cancelled());

        // Joining cancels the armed timer.
        let _stream = room.join("p1", ConnectionId::new("conn-2")).unwrap();
        assert!(second.await.unwrap_err().is_cancelled());

        // A timer for an outdated epoch is never attached.
        let stale = tokio::spawn(std::future::pending::<()>());
        room.arm_teardown(departure.epoch, stale.abort_handle());
        assert!(stale.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_room_mutate_publishes() {
        let room = Room::new("abcd", 0);
        let mut stream = room.join("p1", ConnectionId::new("conn-1")).unwrap();
        assert_eq!(stream.try_next().unwrap().players[0].life, 0);
        assert!(stream.try_next().is_none());

        let (snapshot, idle) = room
            .mutate(|registry| {
                registry.apply_life_change("p1", 3);
            })
            .unwrap();
        assert_eq!(snapshot.players[0].life, 3);
        assert!(idle.is_none());

        assert_eq!(stream.try_next().unwrap().players[0].life, 3);
    }
}
