//! # lifesync-core
//!
//! Room state and snapshot broadcast for the Lifesync life counter server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **PlayerRegistry** - Per-room map from player id to name and life total
//! - **Room** - A registry plus its joined connections and snapshot broadcast
//! - **RoomHub** - Creates, mutates and tears down rooms
//! - **SnapshotStream** - Latest-value snapshot delivery to one connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│   RoomHub   │────▶│    Room     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                                       │
//!        │            ┌─────────────┐            ▼
//!        └────────────│  Snapshot   │◀──── PlayerRegistry
//!                     │   Stream    │
//!                     └─────────────┘
//! ```

pub mod connection;
pub mod hub;
pub mod registry;
pub mod room;
pub mod stream;

pub use connection::ConnectionId;
pub use hub::{EvictionHook, HubConfig, HubError, HubStats, RoomHub};
pub use registry::{Player, PlayerId, PlayerRegistry};
pub use room::{Room, RoomCode};
pub use stream::SnapshotStream;
