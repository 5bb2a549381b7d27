//! Per-room player registry.
//!
//! The registry maps opaque player ids to their mutable state. Entries are
//! created lazily on first reference and never removed; a player keeps
//! their name and life total across reconnects for as long as the room
//! lives.

use lifesync_protocol::{PlayerView, Snapshot};
use std::collections::HashMap;
use tracing::trace;

/// A player identifier.
pub type PlayerId = String;

/// Mutable state for a single player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Opaque identifier supplied by the client.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Current life total.
    pub life: i64,
}

impl Player {
    /// Create a new player with an empty name.
    #[must_use]
    pub fn new(id: impl Into<PlayerId>, life: i64) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            life,
        }
    }

    fn view(&self) -> PlayerView {
        PlayerView::new(self.id.clone(), self.name.clone(), self.life)
    }
}

/// Registry of the players in one room.
#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    /// Players in first-seen order.
    players: Vec<Player>,
    /// Position of each player in `players`.
    index: HashMap<PlayerId, usize>,
    /// Life total assigned to new players.
    default_life: i64,
}

impl PlayerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(default_life: i64) -> Self {
        Self {
            players: Vec::new(),
            index: HashMap::new(),
            default_life,
        }
    }

    /// Number of players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Check if the registry has no players.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Get a player by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Player> {
        self.index.get(id).map(|&i| &self.players[i])
    }

    /// Get a player, creating it with the default life total if absent.
    ///
    /// Returns the player and whether it was created by this call.
    pub fn get_or_insert(&mut self, id: &str) -> (&mut Player, bool) {
        let (position, created) = match self.index.get(id).copied() {
            Some(i) => (i, false),
            None => {
                let i = self.players.len();
                self.players.push(Player::new(id, self.default_life));
                self.index.insert(id.to_string(), i);
                trace!(player = %id, life = self.default_life, "Seeded player");
                (i, true)
            }
        };
        (&mut self.players[position], created)
    }

    /// Add `delta` to a player's life total.
    ///
    /// The sum saturates at the bounds of `i64`. Returns the new total.
    pub fn apply_life_change(&mut self, id: &str, delta: i64) -> i64 {
        let (player, _) = self.get_or_insert(id);
        player.life = player.life.saturating_add(delta);
        player.life
    }

    /// Set a player's display name verbatim.
    pub fn apply_name_change(&mut self, id: &str, name: impl Into<String>) {
        let (player, _) = self.get_or_insert(id);
        player.name = name.into();
    }

    /// Project the registry into a client snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.players.iter().map(Player::view).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_seed() {
        let mut registry = PlayerRegistry::new(20);
        assert!(registry.is_empty());

        let (player, created) = registry.get_or_insert("p1");
        assert!(created);
        assert_eq!(player.life, 20);
        assert_eq!(player.name, "");

        let (_, created) = registry.get_or_insert("p1");
        assert!(!created);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_life_change_is_additive() {
        let mut registry = PlayerRegistry::new(0);

        assert_eq!(registry.apply_life_change("p1", 3), 3);
        assert_eq!(registry.apply_life_change("p1", 2), 5);
        assert_eq!(registry.apply_life_change("p1", -7), -2);

        // Unknown players are created and then adjusted.
        assert_eq!(registry.apply_life_change("p2", -1), -1);
    }

    #[test]
    fn test_life_change_saturates() {
        let mut registry = PlayerRegistry::new(0);

        registry.apply_life_change("p1", i64::MAX);
        assert_eq!(registry.apply_life_change("p1", 1), i64::MAX);

        registry.apply_life_change("p2", i64::MIN);
        assert_eq!(registry.apply_life_change("p2", -1), i64::MIN);
    }

    #[test]
    fn test_name_change() {
        let mut registry = PlayerRegistry::new(0);
        registry.apply_name_change("p1", "Alice");
        registry.apply_name_change("p1", "  Alice B  ");

        assert_eq!(registry.get("p1").unwrap().name, "  Alice B  ");
        assert!(registry.get("p2").is_none());
    }

    #[test]
    fn test_snapshot_order() {
        let mut registry = PlayerRegistry::new(0);
        registry.get_or_insert("zed");
        registry.get_or_insert("amy");
        registry.apply_life_change("zed", 4);

        let snapshot = registry.snapshot();
        let ids: Vec<_> = snapshot.players.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["zed", "amy"]);
        assert_eq!(snapshot.players[0].life, 4);
    }
}
