//! Outbound room snapshots.

use serde::{Deserialize, Serialize};

/// One player's state as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Opaque player identifier supplied by the client.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current life total.
    pub life: i64,
}

impl PlayerView {
    /// Create a new player view.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, life: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            life,
        }
    }
}

/// The full state of a room, pushed to every connection in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Players in the order they were first seen in the room.
    pub players: Vec<PlayerView>,
}

impl Snapshot {
    /// Create a snapshot from a list of players.
    #[must_use]
    pub fn new(players: Vec<PlayerView>) -> Self {
        Self { players }
    }

    /// Find a player by id.
    #[must_use]
    pub fn player(&self, id: &str) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Number of players in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Check if the snapshot has no players.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
