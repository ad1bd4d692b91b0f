use std::collections::HashMap;
use std::sync::Arc;

use inkpin_shared::ChannelEvent;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::storage::Storage;

pub type PeerSender = mpsc::UnboundedSender<ChannelEvent>;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub rooms: Arc<RwLock<HashMap<String, Arc<Room>>>>,
    pub public_url: String,
}

/// Live state of one picture: its connected peers and the lock serializing record updates.
#[derive(Default)]
pub struct Room {
    pub peers: RwLock<HashMap<Uuid, PeerSender>>,
    pub writer: Mutex<()>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, public_url: impl Into<String>) -> Self {
        Self {
            storage,
            rooms: Arc::new(RwLock::new(HashMap::new())),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn file_url(&self, name: &str) -> String {
        format!("{}/files/{name}", self.public_url)
    }

    pub async fn room(&self, picture_id: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(picture_id).cloned() {
            return room;
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(picture_id.to_string())
            .or_insert_with(|| Arc::new(Room::default()))
            .clone()
    }

    /// Finds or creates the room and registers `peer` in it without letting a release slip in.
    pub async fn join(&self, picture_id: &str, peer: PeerSender) -> (Arc<Room>, Uuid) {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(picture_id.to_string())
            .or_insert_with(|| Arc::new(Room::default()))
            .clone();
        let connection_id = room.join(peer).await;
        (room, connection_id)
    }

    /// Drops the room once its last peer left and nobody else still holds it.
    pub async fn release_room(&self, picture_id: &str, room: &Arc<Room>) {
        let mut rooms = self.rooms.write().await;
        let Some(current) = rooms.get(picture_id) else {
            return;
        };
        // One reference in the map, one held by the caller.
        if !Arc::ptr_eq(current, room) || Arc::strong_count(room) > 2 {
            return;
        }
        if room.peers.read().await.is_empty() {
            rooms.remove(picture_id);
        }
    }
}

impl Room {
    pub async fn join(&self, peer: PeerSender) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.peers.write().await.insert(connection_id, peer);
        connection_id
    }

    pub async fn leave(&self, connection_id: Uuid) -> usize {
        let mut peers = self.peers.write().await;
        peers.remove(&connection_id);
        peers.len()
    }

    pub async fn broadcast(&self, event: &ChannelEvent) -> usize {
        let peers = self.peers.read().await;
        peers
            .values()
            .filter(|peer| peer.send(event.clone()).is_ok())
            .count()
    }
}
