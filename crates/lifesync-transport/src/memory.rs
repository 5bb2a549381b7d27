//! In-process transport.
//!
//! A [`MemoryConnection`] and its [`MemoryPeer`] are the two ends of an
//! in-memory channel. The server side drives the connection exactly like a
//! WebSocket; the peer plays the client.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::traits::{Connection, TransportError};

/// Create a connected pair.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));

    let connection = MemoryConnection {
        inbound: inbound_rx,
        outbound: outbound_tx,
        is_open: true,
        fail_writes: Arc::clone(&fail_writes),
    };
    let peer = MemoryPeer {
        inbound: Some(inbound_tx),
        outbound: outbound_rx,
        fail_writes,
    };

    (connection, peer)
}

/// Server end of an in-memory channel.
#[derive(Debug)]
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Bytes>,
    outbound: mpsc::UnboundedSender<String>,
    is_open: bool,
    fail_writes: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if !self.is_open {
            return Ok(None);
        }

        match self.inbound.recv().await {
            Some(data) => Ok(Some(data)),
            None => {
                self.is_open = false;
                Ok(None)
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("peer stopped reading".into()));
        }

        self.outbound
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.is_open = false;
        self.inbound.close();
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

/// Client end of an in-memory channel.
#[derive(Debug)]
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Bytes>>,
    outbound: mpsc::UnboundedReceiver<String>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Send a message to the server end.
    ///
    /// Returns `false` if either end has been closed.
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        self.inbound
            .as_ref()
            .map(|tx| tx.send(data.into()).is_ok())
            .unwrap_or(false)
    }

    /// Wait for the next message from the server end.
    ///
    /// Returns `None` once the server end is dropped.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Take a pending message without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Close the client side; the server end sees a clean close.
    pub fn close(&mut self) {
        self.inbound = None;
    }

    /// Make every later write on the server end fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}
