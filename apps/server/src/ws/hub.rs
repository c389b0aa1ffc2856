//! Connection registry: player id to the set of live sockets.
//!
//! A player may hold several open connections; pushes are
//! fire-and-forget actor sends so a stalled client never blocks the
//! mutation path. The registry is the only shared state between the
//! session pipeline and the socket actors.

use std::collections::BTreeMap;

use actix::prelude::*;
use parking_lot::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::protocol::ServerMsg;
use crate::domain::PlayerId;

/// Serialized server message on its way to one socket.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct Outbound(pub String);

#[derive(Default)]
pub struct WsHub {
    connections: RwLock<BTreeMap<PlayerId, BTreeMap<Uuid, Recipient<Outbound>>>>,
}

impl WsHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, player: PlayerId, recipient: Recipient<Outbound>) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.connections
            .write()
            .entry(player)
            .or_default()
            .insert(conn_id, recipient);
        conn_id
    }

    pub fn unregister(&self, player: PlayerId, conn_id: Uuid) {
        let mut connections = self.connections.write();
        if let Some(entry) = connections.get_mut(&player) {
            entry.remove(&conn_id);
            if entry.is_empty() {
                connections.remove(&player);
            }
        }
    }

    /// Players with at least one live connection.
    pub fn connected_players(&self) -> Vec<PlayerId> {
        self.connections.read().keys().copied().collect()
    }

    pub fn send_to(&self, player: PlayerId, msg: &ServerMsg) {
        let Some(payload) = encode(msg) else { return };
        let connections = self.connections.read();
        if let Some(entry) = connections.get(&player) {
            for recipient in entry.values() {
                let _ = recipient.do_send(Outbound(payload.clone()));
            }
        }
    }

    pub fn broadcast(&self, msg: &ServerMsg) {
        let Some(payload) = encode(msg) else { return };
        let connections = self.connections.read();
        for entry in connections.values() {
            for recipient in entry.values() {
                let _ = recipient.do_send(Outbound(payload.clone()));
            }
        }
    }
}

fn encode(msg: &ServerMsg) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message");
            None
        }
    }
}
