use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::{DashMap, DashSet};
use futures::{SinkExt, StreamExt};
use relay_core::events::ZONE_ROOM_PREFIX;
use relay_core::{ConnectionId, Identity, ServerEvent, VendorId};
use tokio::sync::mpsc;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// A connected WebSocket peer.
///
/// The identity is fixed at upgrade time. A connection that presented no
/// credential, or one that failed to verify, stays open with `identity`
/// set to `None`; the frame router refuses its mutations silently.
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Option<Identity>,
    pub tx: mpsc::Sender<String>,
    pub connected: AtomicBool,
    pub last_pong: AtomicU64,
}

impl Connection {
    fn new(identity: Option<Identity>, tx: mpsc::Sender<String>) -> Self {
        Self {
            id: ConnectionId::new(),
            identity,
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }

    /// The vendor this connection verified as, if any.
    pub fn vendor_id(&self) -> Option<VendorId> {
        self.identity.as_ref().and_then(Identity::vendor_id)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected peers and the rooms they are in.
///
/// Rooms are indexed both ways: room name to members for broadcasting, and
/// connection to joined rooms so a closing connection can be cleared without
/// scanning every room.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    rooms: DashMap<String, DashSet<ConnectionId>>,
    memberships: DashMap<ConnectionId, DashSet<String>>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new connection and return it along with the receiving end
    /// of its send queue.
    pub fn register(&self, identity: Option<Identity>) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let conn = Arc::new(Connection::new(identity, tx));
        self.connections.insert(conn.id.clone(), Arc::clone(&conn));
        (conn, rx)
    }

    /// Remove a connection and clear all of its room memberships.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        self.leave_all(connection_id);
        if let Some((_, conn)) = self.connections.remove(connection_id) {
            conn.connected.store(false, Ordering::Relaxed);
        }
    }

    /// The identity a connection verified as during its upgrade.
    pub fn identity_of(&self, connection_id: &ConnectionId) -> Option<Identity> {
        self.connections
            .get(connection_id)
            .and_then(|conn| conn.identity.clone())
    }

    /// Join a room. A no-op for unknown connections.
    pub fn join_room(&self, connection_id: &ConnectionId, room: &str) {
        if !self.connections.contains_key(connection_id) {
            return;
        }
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.clone());
        self.memberships
            .entry(connection_id.clone())
            .or_default()
            .insert(room.to_string());
    }

    pub fn leave_room(&self, connection_id: &ConnectionId, room: &str) {
        if let Some(members) = self.rooms.get(room) {
            members.remove(connection_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
        if let Some(joined) = self.memberships.get(connection_id) {
            joined.remove(room);
        }
    }

    /// Leave every room the connection joined.
    pub fn leave_all(&self, connection_id: &ConnectionId) {
        let joined: Vec<String> = match self.memberships.remove(connection_id) {
            Some((_, rooms)) => rooms.into_iter().collect(),
            None => return,
        };
        for room in joined {
            if let Some(members) = self.rooms.get(&room) {
                members.remove(connection_id);
            }
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
    }

    /// Leave zone rooms only, keeping vendor and any other rooms. A vendor
    /// re-registering after a move must not stay in its old zone.
    pub fn leave_zone_rooms(&self, connection_id: &ConnectionId) {
        let zones: Vec<String> = self
            .rooms_of(connection_id)
            .into_iter()
            .filter(|room| room.starts_with(ZONE_ROOM_PREFIX))
            .collect();
        for zone in zones {
            self.leave_room(connection_id, &zone);
        }
    }

    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<String> {
        self.memberships
            .get(connection_id)
            .map(|joined| joined.iter().map(|room| room.key().clone()).collect())
            .unwrap_or_default()
    }

    pub fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().map(|id| id.key().clone()).collect())
            .unwrap_or_default()
    }

    /// Send a raw message to one connection. Drops the message if its queue
    /// is full.
    pub fn send_to(&self, connection_id: &ConnectionId, message: String) -> bool {
        let Some(conn) = self.connections.get(connection_id) else {
            return false;
        };
        match conn.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Serialize an event and send it to one connection.
    pub fn send_event(&self, connection_id: &ConnectionId, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send_to(connection_id, json),
            Err(_) => false,
        }
    }

    /// Send a message to every live member of a room. Best effort: slow
    /// consumers miss messages rather than stalling the rest of the room.
    pub fn broadcast_to_room(&self, room: &str, message: &str) {
        self.broadcast_to_room_except(room, None, message);
    }

    pub fn broadcast_to_room_except(
        &self,
        room: &str,
        except: Option<&ConnectionId>,
        message: &str,
    ) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        for member in members.iter() {
            let id = member.key();
            if Some(id) == except {
                continue;
            }
            if let Some(conn) = self.connections.get(id) {
                if conn.is_connected() {
                    let _ = conn.tx.try_send(message.to_string());
                }
            }
        }
    }

    /// Number of registered connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Remove connections that haven't answered a ping within the timeout.
    pub fn cleanup_dead_connections(&self) -> usize {
        let dead: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect();

        let removed = dead.len();
        for id in dead {
            self.unregister(&id);
            tracing::info!(connection_id = %id, "cleaned up dead connection");
        }
        removed
    }
}

/// Handle a WebSocket connection: split into reader/writer, manage lifecycle
/// with heartbeat.
pub async fn handle_ws_connection(
    socket: WebSocket,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ConnectionRegistry>,
    on_frame: mpsc::Sender<(ConnectionId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued messages to the socket + periodic ping
    let writer_id = connection_id.clone();
    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection_id = %writer_id, "sent ping");
                }
            }
        }

        // Mark as disconnected
        if let Some(conn) = writer_registry.connections.get(&writer_id) {
            conn.connected.store(false, Ordering::Relaxed);
        }
    });

    // Reader task: forward text frames to the router, track pongs
    let reader_id = connection_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let _ = on_frame.send((reader_id.clone(), text.to_string())).await;
                }
                WsMessage::Pong(_) => {
                    if let Some(conn) = reader_registry.connections.get(&reader_id) {
                        conn.record_pong();
                    }
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum handles pong automatically
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    registry.unregister(&connection_id);
}

/// Start a background task that periodically cleans up dead connections.
pub fn start_cleanup_task(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_connections();
            if removed > 0 {
                tracing::info!(removed, "dead connection cleanup");
            }
        }
    })
}
