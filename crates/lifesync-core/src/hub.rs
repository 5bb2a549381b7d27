//! The room hub: sole owner and mutator of room state.
//!
//! Rooms are created on first reference and torn down once they have been
//! without connections for the configured idle timeout. Each room
//! serializes its own mutations, so work in one room never waits on another.

use crate::connection::ConnectionId;
use crate::registry::PlayerRegistry;
use crate::room::{validate_id, JoinRejected, Room, RoomCode};
use crate::stream::SnapshotStream;
use dashmap::DashMap;
use lifesync_protocol::Snapshot;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// Invalid room code.
    #[error("Invalid room code: {0}")]
    InvalidRoomCode(&'static str),

    /// Invalid player id.
    #[error("Invalid player id: {0}")]
    InvalidPlayerId(&'static str),

    /// The connection is already registered in the room.
    #[error("Connection already joined: {0}")]
    AlreadyJoined(ConnectionId),

    /// Maximum number of rooms reached.
    #[error("Maximum rooms reached")]
    MaxRoomsReached,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Life total assigned to newly seen players.
    pub default_life: i64,
    /// How long a room without connections is kept before teardown.
    pub room_idle_timeout: Duration,
    /// Soft cap on live rooms, checked when a join would create a room.
    pub max_rooms: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            default_life: 0,
            room_idle_timeout: Duration::from_secs(10 * 60),
            max_rooms: 10_000,
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Number of live rooms.
    pub room_count: usize,
    /// Number of joined connections across all rooms.
    pub connection_count: usize,
    /// Number of players across all rooms.
    pub player_count: usize,
}

/// Callback invoked with the number of live rooms after a room is removed.
pub type EvictionHook = Arc<dyn Fn(usize) + Send + Sync>;

/// The central room hub.
///
/// Cheap to clone; clones share the same rooms.
#[derive(Clone)]
pub struct RoomHub {
    rooms: Arc<DashMap<RoomCode, Arc<Room>>>,
    config: HubConfig,
    on_evict: Option<EvictionHook>,
}

impl RoomHub {
    /// Create a new hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating room hub with config: {:?}", config);
        Self {
            rooms: Arc::new(DashMap::new()),
            config,
            on_evict: None,
        }
    }

    /// Call `hook` with the remaining room count whenever a room is
    /// removed, including removals by a delayed teardown.
    #[must_use]
    pub fn on_room_evicted(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_evict = Some(Arc::new(hook));
        self
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|e| Arc::clone(e.value())).collect();
        HubStats {
            room_count: rooms.len(),
            connection_count: rooms.iter().map(|r| r.connection_count()).sum(),
            player_count: rooms.iter().map(|r| r.player_count()).sum(),
        }
    }

    /// Register a connection with a room.
    ///
    /// Creates the room and the player on demand. The returned stream
    /// yields the room's current snapshot first, then every later one.
    ///
    /// # Errors
    ///
    /// Returns an error if the ids are invalid, the connection is already
    /// joined, or a new room would exceed the room limit.
    pub fn join(
        &self,
        room_code: &str,
        player_id: &str,
        connection_id: ConnectionId,
    ) -> Result<SnapshotStream, HubError> {
        validate_id(room_code).map_err(HubError::InvalidRoomCode)?;
        validate_id(player_id).map_err(HubError::InvalidPlayerId)?;

        loop {
            if !self.rooms.contains_key(room_code) && self.rooms.len() >= self.config.max_rooms {
                warn!(room = %room_code, "Room limit reached");
                return Err(HubError::MaxRoomsReached);
            }

            let room = self.get_or_create(room_code);
            match room.join(player_id, connection_id.clone()) {
                Ok(stream) => return Ok(stream),
                Err(JoinRejected::AlreadyJoined) => {
                    warn!(
                        room = %room_code,
                        connection = %connection_id,
                        "Connection already joined"
                    );
                    return Err(HubError::AlreadyJoined(connection_id));
                }
                Err(JoinRejected::Closed) => {
                    trace!(room = %room_code, "Joined a room mid-teardown, retrying");
                    self.evict(&room);
                }
            }
        }
    }

    /// Deregister a connection from a room.
    ///
    /// When the last connection leaves, the room is scheduled for teardown.
    /// Returns `true` if the connection was registered.
    pub fn leave(&self, room_code: &str, player_id: &str, connection_id: &ConnectionId) -> bool {
        let Some(room) = self.room(room_code) else {
            return false;
        };

        match room.leave(player_id, connection_id) {
            Some(departure) => {
                if departure.remaining == 0 {
                    self.schedule_teardown(room, departure.epoch);
                }
                true
            }
            None => false,
        }
    }

    /// Add `delta` to a player's life total and broadcast the result.
    ///
    /// The total saturates at the bounds of `i64`.
    pub fn apply_life_change(&self, room_code: &str, player_id: &str, delta: i64) -> Arc<Snapshot> {
        self.mutate(room_code, |registry| {
            let life = registry.apply_life_change(player_id, delta);
            debug!(room = %room_code, player = %player_id, delta, life, "Life changed");
        })
    }

    /// Set a player's display name and broadcast the result.
    pub fn apply_name_change(
        &self,
        room_code: &str,
        player_id: &str,
        name: impl Into<String>,
    ) -> Arc<Snapshot> {
        let name = name.into();
        self.mutate(room_code, |registry| {
            debug!(room = %room_code, player = %player_id, name = %name, "Name changed");
            registry.apply_name_change(player_id, name.clone());
        })
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, room_code: &str) -> bool {
        self.rooms.contains_key(room_code)
    }

    /// Get the number of connections joined to a room.
    #[must_use]
    pub fn connection_count(&self, room_code: &str) -> usize {
        self.room(room_code)
            .map(|r| r.connection_count())
            .unwrap_or(0)
    }

    /// Get the latest snapshot of a room.
    #[must_use]
    pub fn snapshot(&self, room_code: &str) -> Option<Arc<Snapshot>> {
        self.room(room_code).map(|r| r.snapshot())
    }

    fn room(&self, room_code: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_code).map(|e| Arc::clone(e.value()))
    }

    fn get_or_create(&self, room_code: &str) -> Arc<Room> {
        if let Some(room) = self.room(room_code) {
            return room;
        }

        let entry = self
            .rooms
            .entry(room_code.to_string())
            .or_insert_with(|| {
                debug!(room = %room_code, "Creating new room");
                Arc::new(Room::new(room_code, self.config.default_life))
            });
        Arc::clone(entry.value())
    }

    fn mutate<F>(&self, room_code: &str, mut f: F) -> Arc<Snapshot>
    where
        F: FnMut(&mut PlayerRegistry),
    {
        loop {
            let room = self.get_or_create(room_code);
            match room.mutate(&mut f) {
                Ok((snapshot, idle_epoch)) => {
                    if let Some(epoch) = idle_epoch {
                        self.schedule_teardown(room, epoch);
                    }
                    return snapshot;
                }
                Err(_) => {
                    trace!(room = %room_code, "Mutated a room mid-teardown, retrying");
                    self.evict(&room);
                }
            }
        }
    }

    /// Remove `room` from the map if it is still the registered instance.
    fn evict(&self, room: &Arc<Room>) {
        evict(&self.rooms, self.on_evict.as_ref(), room);
    }

    fn schedule_teardown(&self, room: Arc<Room>, epoch: u64) {
        let timeout = self.config.room_idle_timeout;

        if timeout.is_zero() {
            teardown(&self.rooms, self.on_evict.as_ref(), &room, epoch);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let rooms = Arc::clone(&self.rooms);
                let on_evict = self.on_evict.clone();
                let timer_room = Arc::clone(&room);
                trace!(room = %room.code(), ?timeout, "Scheduled room teardown");
                let timer = handle.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    teardown(&rooms, on_evict.as_ref(), &timer_room, epoch);
                });
                room.arm_teardown(epoch, timer.abort_handle());
            }
            Err(_) => {
                warn!(room = %room.code(), "No runtime for delayed teardown, tearing down now");
                teardown(&self.rooms, self.on_evict.as_ref(), &room, epoch);
            }
        }
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

fn evict(rooms: &DashMap<RoomCode, Arc<Room>>, on_evict: Option<&EvictionHook>, room: &Arc<Room>) {
    let removed = rooms
        .remove_if(room.code(), |_, current| Arc::ptr_eq(current, room))
        .is_some();
    if removed {
        if let Some(hook) = on_evict {
            hook(rooms.len());
        }
    }
}

fn teardown(
    rooms: &DashMap<RoomCode, Arc<Room>>,
    on_evict: Option<&EvictionHook>,
    room: &Arc<Room>,
    epoch: u64,
) {
    if room.try_close(epoch) {
        evict(rooms, on_evict, room);
        info!(room = %room.code(), "Tore down idle room");
    }
}
