//! # lifesync-protocol
//!
//! Wire protocol definitions for the Lifesync life counter server.
//!
//! Clients send JSON [`Command`]s and receive JSON [`Snapshot`]s. The
//! protocol is fire-and-forget: there are no request ids and no
//! acknowledgements, only broadcasts of the full room state.
//!
//! ## Commands
//!
//! - `{"type":"change","data":<integer>}` - adjust life by a signed delta
//! - `{"type":"set-name","data":<string>}` - set the display name
//!
//! ## Example
//!
//! ```rust
//! use lifesync_protocol::{codec, Command};
//!
//! let cmd = codec::decode_command(br#"{"type":"change","data":-1}"#).unwrap();
//! assert_eq!(cmd, Command::Change(-1));
//! ```

pub mod codec;
pub mod command;
pub mod snapshot;

pub use codec::{decode_command, encode_snapshot, ProtocolError};
pub use command::{Command, CommandKind};
pub use snapshot::{PlayerView, Snapshot};
