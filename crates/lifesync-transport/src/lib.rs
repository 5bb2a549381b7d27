//! # lifesync-transport
//!
//! Transport abstraction layer for Lifesync.
//!
//! A [`Connection`] is one live, bidirectional message channel to one
//! client. The server drives every connection through this trait, so the
//! connection logic is independent of the underlying transport:
//!
//! - **WebSocket** - an upgraded axum WebSocket, used in production
//! - **Memory** - an in-process channel pair, used in tests
//!
//! ```rust,ignore
//! use lifesync_transport::Connection;
//!
//! async fn echo(mut conn: impl Connection) {
//!     while let Ok(Some(data)) = conn.recv().await {
//!         let text = String::from_utf8_lossy(&data).into_owned();
//!         if conn.send_text(text).await.is_err() {
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnection, MemoryPeer};
pub use traits::{Connection, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_MESSAGE_SIZE};
