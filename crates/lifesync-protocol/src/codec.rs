//! Codec for decoding commands and encoding snapshots.
//!
//! Both directions use JSON text. Every decode failure is reported as a
//! [`ProtocolError`] and is meant to be dropped by the caller without
//! closing the connection.

use thiserror::Error;

use crate::command::Command;
use crate::snapshot::Snapshot;

/// Maximum size of a raw inbound command (4 KiB).
pub const MAX_COMMAND_SIZE: usize = 4 * 1024;

/// Maximum display name length, in characters.
pub const MAX_NAME_LENGTH: usize = 64;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound message exceeds the size limit.
    #[error("Command size {0} exceeds maximum {MAX_COMMAND_SIZE}")]
    CommandTooLarge(usize),

    /// Inbound message does not match the command schema.
    #[error("Malformed command: {0}")]
    MalformedCommand(#[source] serde_json::Error),

    /// Display name exceeds the length limit.
    #[error("Name length {0} exceeds maximum {MAX_NAME_LENGTH}")]
    NameTooLong(usize),

    /// Snapshot encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Short label used for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ProtocolError::CommandTooLarge(_) => "command_too_large",
            ProtocolError::MalformedCommand(_) => "malformed_command",
            ProtocolError::NameTooLong(_) => "name_too_long",
            ProtocolError::Encode(_) => "encode",
        }
    }
}

/// Decode a command from raw message bytes.
///
/// Names have control characters stripped before the length check.
///
/// # Errors
///
/// Returns an error if the data is too large, does not match the command
/// schema, or carries an over-long name.
pub fn decode_command(data: &[u8]) -> Result<Command, ProtocolError> {
    if data.len() > MAX_COMMAND_SIZE {
        return Err(ProtocolError::CommandTooLarge(data.len()));
    }

    let command: Command =
        serde_json::from_slice(data).map_err(ProtocolError::MalformedCommand)?;

    match command {
        Command::SetName(name) => {
            let name = sanitize_name(&name);
            let length = name.chars().count();
            if length > MAX_NAME_LENGTH {
                return Err(ProtocolError::NameTooLong(length));
            }
            Ok(Command::SetName(name))
        }
        other => Ok(other),
    }
}

/// Encode a snapshot to JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<String, ProtocolError> {
    serde_json::to_string(snapshot).map_err(ProtocolError::Encode)
}

/// Decode a snapshot from JSON bytes.
///
/// # Errors
///
/// Returns an error if the data is not a valid snapshot.
pub fn decode_snapshot(data: &[u8]) -> Result<Snapshot, ProtocolError> {
    serde_json::from_slice(data).map_err(ProtocolError::MalformedCommand)
}

fn sanitize_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_control()).collect()
}
