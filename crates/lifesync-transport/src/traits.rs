//! Transport abstraction traits for Lifesync.
//!
//! These traits define the interface every transport implementation must
//! provide, keeping the connection logic transport-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Inbound message exceeds the configured limit.
    #[error("Message size {size} exceeds maximum {max}")]
    MessageTooLarge {
        /// Size of the offending message.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
}

impl TransportError {
    /// Whether the connection can keep being used after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::MessageTooLarge { .. })
    }
}

/// An active connection to a single client.
///
/// `recv` must be cancel-safe: callers race it against outbound work in
/// `tokio::select!`.
#[async_trait]
pub trait Connection: Send {
    /// Receive the next application message.
    ///
    /// Text and binary messages both yield their payload bytes. Control
    /// messages are handled internally. Returns `None` if the connection
    /// closed cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Send a text message.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
