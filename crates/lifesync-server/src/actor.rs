//! Connection actor: bridges one client channel to the room hub.
//!
//! The actor decodes inbound commands, applies them through the
//! [`RoomHub`], and writes every snapshot the room publishes back to the
//! client. It moves through `Connecting -> Joined -> Closed` exactly once.

use crate::metrics;
use bytes::Bytes;
use lifesync_core::{ConnectionId, HubError, RoomHub, SnapshotStream};
use lifesync_protocol::{codec, Command, CommandKind, Snapshot};
use lifesync_transport::{Connection, TransportError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Lifecycle state of a connection actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    /// Created, not yet registered with the hub.
    Connecting,
    /// Registered and exchanging messages.
    Joined,
    /// Deregistered; terminal.
    Closed,
}

/// Hub registration that deregisters when dropped.
///
/// Dropping covers every exit path, including cancellation of the task
/// running the actor.
struct Registration {
    hub: RoomHub,
    room: String,
    player: String,
    connection_id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.leave(&self.room, &self.player, &self.connection_id);
    }
}

enum Event {
    Snapshot(Option<Arc<Snapshot>>),
    Inbound(Result<Option<Bytes>, TransportError>),
}

/// One live connection bound to a single (room, player) pair.
pub struct ConnectionActor<C: Connection> {
    connection: C,
    hub: RoomHub,
    room: String,
    player: String,
    connection_id: ConnectionId,
    state: ActorState,
    stream: Option<SnapshotStream>,
    registration: Option<Registration>,
}

impl<C: Connection> ConnectionActor<C> {
    /// Create an actor with a freshly generated connection id.
    pub fn new(
        connection: C,
        hub: RoomHub,
        room: impl Into<String>,
        player: impl Into<String>,
    ) -> Self {
        Self::with_id(connection, hub, room, player, ConnectionId::generate())
    }

    /// Create an actor with a specific connection id.
    pub fn with_id(
        connection: C,
        hub: RoomHub,
        room: impl Into<String>,
        player: impl Into<String>,
        connection_id: ConnectionId,
    ) -> Self {
        Self {
            connection,
            hub,
            room: room.into(),
            player: player.into(),
            connection_id,
            state: ActorState::Connecting,
            stream: None,
            registration: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ActorState {
        self.state
    }

    /// The connection id registered with the hub.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Register with the hub.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub refuses the registration. The actor is
    /// then unusable and should be closed.
    pub fn join(&mut self) -> Result<(), HubError> {
        if self.state != ActorState::Connecting {
            return Ok(());
        }

        let stream = self
            .hub
            .join(&self.room, &self.player, self.connection_id.clone())?;

        self.stream = Some(stream);
        self.registration = Some(Registration {
            hub: self.hub.clone(),
            room: self.room.clone(),
            player: self.player.clone(),
            connection_id: self.connection_id.clone(),
        });
        self.state = ActorState::Joined;
        metrics::set_active_rooms(self.hub.room_count());

        debug!(
            connection = %self.connection_id,
            room = %self.room,
            player = %self.player,
            remote = ?self.connection.remote_addr(),
            "Joined"
        );
        Ok(())
    }

    /// Handle one raw inbound message.
    ///
    /// Malformed input is dropped without a reply. Returns the kind of the
    /// command that was applied, if any.
    pub fn on_message(&mut self, raw: &[u8]) -> Option<CommandKind> {
        if self.state != ActorState::Joined {
            trace!(connection = %self.connection_id, "Ignoring message outside Joined state");
            return None;
        }

        let command = match codec::decode_command(raw) {
            Ok(command) => command,
            Err(e) => {
                debug!(connection = %self.connection_id, error = %e, "Dropping malformed command");
                metrics::record_rejected(e.label());
                return None;
            }
        };

        let kind = command.kind();
        let start = Instant::now();
        match command {
            Command::Change(delta) => {
                self.hub.apply_life_change(&self.room, &self.player, delta);
            }
            Command::SetName(name) => {
                self.hub.apply_name_change(&self.room, &self.player, name);
            }
        }
        metrics::record_command(kind.as_str(), start.elapsed().as_secs_f64());

        Some(kind)
    }

    /// Encode a snapshot and write it to the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the caller must then close.
    pub async fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), TransportError> {
        let text = match codec::encode_snapshot(snapshot) {
            Ok(text) => text,
            Err(e) => {
                warn!(connection = %self.connection_id, error = %e, "Failed to encode snapshot");
                metrics::record_error("encode");
                return Ok(());
            }
        };

        let len = text.len();
        self.connection.send_text(text).await?;
        metrics::record_snapshot(len);
        Ok(())
    }

    /// Deregister from the hub and close the transport.
    pub async fn close(&mut self) {
        if self.state == ActorState::Closed {
            return;
        }
        self.state = ActorState::Closed;
        self.stream = None;
        drop(self.registration.take());

        if let Err(e) = self.connection.close().await {
            trace!(connection = %self.connection_id, error = %e, "Close failed");
        }
        debug!(connection = %self.connection_id, room = %self.room, "Closed");
    }

    /// Run the actor until the client disconnects or a write fails.
    pub async fn run(mut self) {
        if let Err(e) = self.join() {
            warn!(
                connection = %self.connection_id,
                room = %self.room,
                player = %self.player,
                error = %e,
                "Join refused, closing connection"
            );
            metrics::record_error("join");
            self.close().await;
            return;
        }

        // The join snapshot goes out before any inbound message is read.
        let initial = self.stream.as_mut().and_then(SnapshotStream::try_next);
        if let Some(snapshot) = initial {
            if let Err(e) = self.on_snapshot(&snapshot).await {
                debug!(connection = %self.connection_id, error = %e, "Join snapshot write failed");
                metrics::record_error("write");
                self.close().await;
                return;
            }
        }

        loop {
            let Some(stream) = self.stream.as_mut() else {
                break;
            };

            // Fair polling, so inbound commands are still read while
            // snapshots keep arriving.
            let event = tokio::select! {
                snapshot = stream.next() => Event::Snapshot(snapshot),
                inbound = self.connection.recv() => Event::Inbound(inbound),
            };

            match event {
                Event::Snapshot(Some(snapshot)) => {
                    if let Err(e) = self.on_snapshot(&snapshot).await {
                        debug!(connection = %self.connection_id, error = %e, "Snapshot write failed");
                        metrics::record_error("write");
                        break;
                    }
                }
                Event::Snapshot(None) => break,
                Event::Inbound(Ok(Some(data))) => {
                    self.on_message(&data);
                }
                Event::Inbound(Ok(None)) => {
                    debug!(connection = %self.connection_id, "Client disconnected");
                    break;
                }
                Event::Inbound(Err(e)) if e.is_recoverable() => {
                    debug!(connection = %self.connection_id, error = %e, "Dropping inbound message");
                    metrics::record_rejected("message_too_large");
                }
                Event::Inbound(Err(e)) => {
                    debug!(connection = %self.connection_id, error = %e, "Receive failed");
                    metrics::record_error("read");
                    break;
                }
            }
        }

        self.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifesync_core::HubConfig;
    use lifesync_transport::memory::{self, MemoryPeer};
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    fn spawn_actor(hub: &RoomHub, room: &str, player: &str) -> (MemoryPeer, JoinHandle<()>) {
        let (connection, peer) = memory::pair();
        let actor = ConnectionActor::new(connection, hub.clone(), room, player);
        (peer, tokio::spawn(actor.run()))
    }

    async fn next_snapshot(peer: &mut MemoryPeer) -> Snapshot {
        let text = timeout(Duration::from_secs(5), peer.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("connection closed");
        codec::decode_snapshot(text.as_bytes()).unwrap()
    }

    async fn wait_for_connections(hub: &RoomHub, room: &str, expected: usize) {
        timeout(Duration::from_secs(5), async {
            while hub.connection_count(room) != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection count never settled");
    }

    #[tokio::test]
    async fn test_state_machine() {
        let hub = RoomHub::new();
        let (connection, _peer) = memory::pair();
        let mut actor = ConnectionActor::new(connection, hub.clone(), "abcd", "p1");

        assert_eq!(actor.state(), ActorState::Connecting);
        // Messages before joining are ignored.
        assert!(actor.on_message(br#"{"type":"change","data":1}"#).is_none());
        assert!(!hub.room_exists("abcd"));

        actor.join().unwrap();
        assert_eq!(actor.state(), ActorState::Joined);
        assert_eq!(
            actor.on_message(br#"{"type":"change","data":1}"#),
            Some(CommandKind::Change)
        );
        assert_eq!(
            actor.on_message(br#"{"type":"set-name","data":"Alice"}"#),
            Some(CommandKind::SetName)
        );
        assert!(actor.on_message(br#"{"type":"bogus"}"#).is_none());

        actor.close().await;
        assert_eq!(actor.state(), ActorState::Closed);
        assert_eq!(hub.connection_count("abcd"), 0);

        // No transition back from Closed.
        actor.join().unwrap();
        assert_eq!(actor.state(), ActorState::Closed);
        assert!(actor.on_message(br#"{"type":"change","data":1}"#).is_none());

        let snapshot = hub.snapshot("abcd").unwrap();
        assert_eq!(snapshot.player("p1").unwrap().life, 1);
        assert_eq!(snapshot.player("p1").unwrap().name, "Alice");
    }

    #[tokio::test]
    async fn test_join_snapshot_and_broadcast() {
        let hub = RoomHub::new();
        let (mut p1, _h1) = spawn_actor(&hub, "abcd", "p1");

        let snapshot = next_snapshot(&mut p1).await;
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].life, 0);

        p1.send(r#"{"type":"change","data":3}"#);
        assert_eq!(next_snapshot(&mut p1).await.players[0].life, 3);

        let (mut p2, _h2) = spawn_actor(&hub, "abcd", "p2");
        let expected = r#"{"players":[{"id":"p1","name":"","life":3},{"id":"p2","name":"","life":0}]}"#;
        assert_eq!(
            codec::encode_snapshot(&next_snapshot(&mut p2).await).unwrap(),
            expected
        );
        assert_eq!(
            codec::encode_snapshot(&next_snapshot(&mut p1).await).unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_malformed_input_is_inert() {
        let hub = RoomHub::new();
        let (mut peer, _handle) = spawn_actor(&hub, "abcd", "p1");
        next_snapshot(&mut peer).await;

        peer.send(r#"{"type":"bogus"}"#);
        peer.send(r#"{"type":"change","data":"not-a-number"}"#);
        peer.send("garbage");
        peer.send(r#"{"type":"change","data":2}"#);

        // The first thing we see is the valid change.
        assert_eq!(next_snapshot(&mut peer).await.players[0].life, 2);
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_peer_close_leaves_room() {
        let hub = RoomHub::new();
        let (mut peer, handle) = spawn_actor(&hub, "abcd", "p1");
        next_snapshot(&mut peer).await;
        assert_eq!(hub.connection_count("abcd"), 1);

        peer.close();
        handle.await.unwrap();
        assert_eq!(hub.connection_count("abcd"), 0);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_room() {
        let hub = RoomHub::new();
        let (mut peer, handle) = spawn_actor(&hub, "abcd", "p1");
        let (mut other, _other_handle) = spawn_actor(&hub, "abcd", "p2");
        next_snapshot(&mut peer).await;
        next_snapshot(&mut other).await;
        next_snapshot(&mut peer).await;

        peer.fail_writes();
        other.send(r#"{"type":"change","data":-1}"#);

        handle.await.unwrap();
        assert_eq!(hub.connection_count("abcd"), 1);

        // The failing connection does not affect the others.
        assert_eq!(
            next_snapshot(&mut other).await.player("p2").unwrap().life,
            -1
        );
    }

    #[tokio::test]
    async fn test_double_join_force_closes() {
        let hub = RoomHub::new();
        let id = ConnectionId::generate();
        let _stream = hub.join("abcd", "p1", id.clone()).unwrap();

        let (connection, mut peer) = memory::pair();
        let actor = ConnectionActor::with_id(connection, hub.clone(), "abcd", "p1", id);
        actor.run().await;

        assert!(peer.recv().await.is_none());
        // The first registration is untouched.
        assert_eq!(hub.connection_count("abcd"), 1);
    }

    #[tokio::test]
    async fn test_cancellation_leaves_room() {
        let hub = RoomHub::new();
        let (mut peer, handle) = spawn_actor(&hub, "abcd", "p1");
        next_snapshot(&mut peer).await;

        handle.abort();
        let _ = handle.await;
        wait_for_connections(&hub, "abcd", 0).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_commands_apply_in_a_busy_room() {
        let hub = RoomHub::new();
        let (mut peer, _handle) = spawn_actor(&hub, "abcd", "p1");
        next_snapshot(&mut peer).await;

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flood = {
            let hub = hub.clone();
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    hub.apply_life_change("abcd", "p2", 1);
                    tokio::task::yield_now().await;
                }
            })
        };

        peer.send(r#"{"type":"change","data":7}"#);
        let applied = timeout(Duration::from_secs(5), async {
            loop {
                let life = hub.snapshot("abcd").and_then(|s| s.player("p1").map(|p| p.life));
                if life == Some(7) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        flood.await.unwrap();
        assert!(applied.is_ok(), "command starved behind snapshot writes");
    }

    #[tokio::test]
    async fn test_reconnect_preserves_state() {
        let hub = RoomHub::with_config(HubConfig {
            room_idle_timeout: Duration::from_secs(60),
            ..HubConfig::default()
        });

        let (mut peer, handle) = spawn_actor(&hub, "abcd", "p1");
        next_snapshot(&mut peer).await;
        peer.send(r#"{"type":"change","data":3}"#);
        next_snapshot(&mut peer).await;
        peer.send(r#"{"type":"change","data":2}"#);
        assert_eq!(next_snapshot(&mut peer).await.players[0].life, 5);

        peer.close();
        handle.await.unwrap();

        let (mut peer, _handle) = spawn_actor(&hub, "abcd", "p1");
        assert_eq!(next_snapshot(&mut peer).await.players[0].life, 5);
    }
}
