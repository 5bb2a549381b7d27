//! Inbound commands for the Lifesync protocol.
//!
//! Clients send fire-and-forget commands encoded as JSON text. There is no
//! request id and no acknowledgement: the server answers every accepted
//! command by broadcasting a fresh [`Snapshot`](crate::Snapshot) to the room.

use serde::{Deserialize, Serialize};

/// Command kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Change,
    SetName,
}

impl CommandKind {
    /// The wire tag for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Change => "change",
            CommandKind::SetName => "set-name",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command sent by a client.
///
/// Encoded as an adjacently tagged object, for example
/// `{"type":"change","data":-1}` or `{"type":"set-name","data":"Alice"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Command {
    /// Adjust the sender's life total by a signed delta.
    #[serde(rename = "change")]
    Change(i64),

    /// Set the sender's display name.
    #[serde(rename = "set-name")]
    SetName(String),
}

impl Command {
    /// Get the command kind.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Change(_) => CommandKind::Change,
            Command::SetName(_) => CommandKind::SetName,
        }
    }

    /// Create a new Change command.
    #[must_use]
    pub fn change(delta: i64) -> Self {
        Command::Change(delta)
    }

    /// Create a new SetName command.
    #[must_use]
    pub fn set_name(name: impl Into<String>) -> Self {
        Command::SetName(name.into())
    }
}
