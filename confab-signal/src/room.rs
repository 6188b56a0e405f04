//! Rooms and their per-room entity arenas
//!
//! Every entity (peer, transport, producer, consumer) lives in a map keyed
//! by its id and references related entities by id only; cascading close
//! walks id to id through these maps, so cleanup ordering is deterministic
//! and never chases owning pointers. Closed transport/producer/consumer
//! records stay behind as tombstones — ids are never reused, and a late
//! operation on a closed entity must be distinguishable from one on an
//! entity that never existed.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::peer::{Peer, PeerSummary, PeerSyncView};
use crate::types::{
    ConsumerId, MediaKind, PeerId, ProducerId, RoomId, TransportDirection, TransportId, UserId,
};
use crate::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Created,
    Connected,
    Closed,
}

#[derive(Debug, Clone)]
pub struct TransportRecord {
    pub id: TransportId,
    pub peer_id: PeerId,
    pub direction: TransportDirection,
    pub state: TransportState,
}

#[derive(Debug, Clone)]
pub struct ProducerRecord {
    pub id: ProducerId,
    pub peer_id: PeerId,
    pub transport_id: TransportId,
    pub kind: MediaKind,
    pub media_tag: String,
    pub paused: bool,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Created paused; no media flows until the client asks for a resume
    Paused,
    Resumed,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub id: ConsumerId,
    /// The subscribing peer
    pub peer_id: PeerId,
    pub producer_peer_id: PeerId,
    pub producer_id: ProducerId,
    pub transport_id: TransportId,
    pub media_tag: String,
    pub kind: MediaKind,
    pub state: ConsumerState,
}

/// Engine-side closes still owed after a registry cascade.
///
/// Registry mutation happens under the room lock; the engine calls happen
/// after the lock drops. Every engine close is idempotent, so overlap
/// between the lists (a producer whose transport is also here) is harmless.
#[derive(Debug, Default)]
pub struct Cascade {
    pub transports: Vec<TransportId>,
    pub producers: Vec<ProducerId>,
    pub consumers: Vec<ConsumerId>,
}

impl Cascade {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty() && self.producers.is_empty() && self.consumers.is_empty()
    }

    pub fn merge(&mut self, other: Cascade) {
        self.transports.extend(other.transports);
        self.producers.extend(other.producers);
        self.consumers.extend(other.consumers);
    }
}

/// All mutable state of one room, guarded by the room's lock
#[derive(Default)]
pub struct RoomState {
    pub peers: HashMap<PeerId, Peer>,
    pub transports: HashMap<TransportId, TransportRecord>,
    pub producers: HashMap<ProducerId, ProducerRecord>,
    pub consumers: HashMap<ConsumerId, ConsumerRecord>,
}

impl RoomState {
    /// Close a transport and everything riding on it.
    pub fn detach_transport(&mut self, transport_id: &TransportId) -> Cascade {
        let mut cascade = Cascade::default();
        let (owner, direction) = match self.transports.get_mut(transport_id) {
            Some(record) if record.state != TransportState::Closed => {
                record.state = TransportState::Closed;
                (record.peer_id.clone(), record.direction)
            }
            _ => return cascade,
        };
        cascade.transports.push(transport_id.clone());

        // Release the owner's direction slot unless it was already replaced.
        if let Some(peer) = self.peers.get_mut(&owner) {
            if peer.transports.get(&direction) == Some(transport_id) {
                peer.transports.remove(&direction);
            }
        }

        let producer_ids: Vec<ProducerId> = self
            .producers
            .iter()
            .filter(|(_, p)| !p.closed && p.transport_id == *transport_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in producer_ids {
            cascade.merge(self.detach_producer(&id));
        }

        let consumer_ids: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|(_, c)| c.state != ConsumerState::Closed && c.transport_id == *transport_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in consumer_ids {
            if self.detach_consumer(&id) {
                cascade.consumers.push(id);
            }
        }

        cascade
    }

    /// Close a producer, its media-map entry, and every consumer of it.
    pub fn detach_producer(&mut self, producer_id: &ProducerId) -> Cascade {
        let mut cascade = Cascade::default();
        let (owner, tag) = match self.producers.get_mut(producer_id) {
            Some(record) if !record.closed => {
                record.closed = true;
                (record.peer_id.clone(), record.media_tag.clone())
            }
            _ => return cascade,
        };
        cascade.producers.push(producer_id.clone());

        if let Some(peer) = self.peers.get_mut(&owner) {
            if peer.producers.get(&tag) == Some(producer_id) {
                peer.producers.remove(&tag);
                peer.media.remove(&tag);
            }
        }

        let consumer_ids: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|(_, c)| c.state != ConsumerState::Closed && c.producer_id == *producer_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in consumer_ids {
            if self.detach_consumer(&id) {
                cascade.consumers.push(id);
            }
        }

        cascade
    }

    /// Close a consumer and drop its layer-state entry.
    /// Returns false if it was already closed or never existed.
    pub fn detach_consumer(&mut self, consumer_id: &ConsumerId) -> bool {
        let owner = match self.consumers.get_mut(consumer_id) {
            Some(record) if record.state != ConsumerState::Closed => {
                record.state = ConsumerState::Closed;
                record.peer_id.clone()
            }
            _ => return false,
        };
        if let Some(peer) = self.peers.get_mut(&owner) {
            peer.consumer_layers.remove(consumer_id);
        }
        true
    }

    /// Remove a peer, cascading through all transports it owns.
    pub fn remove_peer(&mut self, peer_id: &PeerId) -> Cascade {
        let mut cascade = Cascade::default();
        if !self.peers.contains_key(peer_id) {
            return cascade;
        }

        let owned: Vec<TransportId> = self
            .transports
            .iter()
            .filter(|(_, t)| t.state != TransportState::Closed && t.peer_id == *peer_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in owned {
            cascade.merge(self.detach_transport(&id));
        }

        self.peers.remove(peer_id);
        cascade
    }

    /// The live producer a peer publishes under `media_tag`, if any
    #[must_use]
    pub fn find_producer(&self, peer_id: &PeerId, media_tag: &str) -> Option<&ProducerRecord> {
        let producer_id = self.peers.get(peer_id)?.producers.get(media_tag)?;
        self.producers.get(producer_id).filter(|p| !p.closed)
    }

    /// Whether a live consumer already exists for this subscription triple
    #[must_use]
    pub fn has_live_consumer(
        &self,
        subscriber: &PeerId,
        source: &PeerId,
        media_tag: &str,
    ) -> bool {
        self.consumers.values().any(|c| {
            c.state != ConsumerState::Closed
                && c.peer_id == *subscriber
                && c.producer_peer_id == *source
                && c.media_tag == media_tag
        })
    }

    /// The transport record, provided it belongs to `peer_id` and is not closed
    #[must_use]
    pub fn live_transport(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
    ) -> Option<&TransportRecord> {
        self.transports
            .get(transport_id)
            .filter(|t| t.state != TransportState::Closed && t.peer_id == *peer_id)
    }
}

/// Wire-facing entry of the producing-peers listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerSummary {
    pub peer_id: PeerId,
    pub id: ProducerId,
    pub paused: bool,
    pub closed: bool,
}

/// Wire-facing entry of the room listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub peer_count: usize,
}

/// A conference namespace. Created on request, retained for process lifetime.
pub struct Room {
    id: RoomId,
    host: UserId,
    pub(crate) state: RwLock<RoomState>,
}

impl Room {
    fn new(id: RoomId, host: UserId) -> Self {
        Self {
            id,
            host,
            state: RwLock::new(RoomState::default()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    #[must_use]
    pub fn host_user(&self) -> &UserId {
        &self.host
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.state.read().peers.len()
    }

    /// Create this user's peer record. A re-join replaces the previous
    /// record; the returned cascade holds the old peer's engine ids.
    pub fn join_peer(&self, user: &User, now_ms: i64) -> (PeerId, Cascade) {
        let peer_id = PeerId::compose(&self.id, user.id());
        let mut state = self.state.write();
        let cascade = state.remove_peer(&peer_id);
        state
            .peers
            .insert(peer_id.clone(), Peer::new(peer_id.clone(), user.clone(), now_ms));
        debug!(room_id = %self.id, peer_id = %peer_id, "peer joined");
        (peer_id, cascade)
    }

    /// Update the peer's liveness timestamp. False if the peer is gone.
    pub fn touch_peer(&self, peer_id: &PeerId, now_ms: i64) -> bool {
        let mut state = self.state.write();
        match state.peers.get_mut(peer_id) {
            Some(peer) => {
                peer.touch(now_ms);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains_peer(&self, peer_id: &PeerId) -> bool {
        self.state.read().peers.contains_key(peer_id)
    }

    /// Full peer-map snapshot for the sync response
    #[must_use]
    pub fn sync_snapshot(&self) -> BTreeMap<String, PeerSyncView> {
        self.state
            .read()
            .peers
            .values()
            .map(|p| (p.id.as_str().to_string(), p.sync_view()))
            .collect()
    }

    #[must_use]
    pub fn peer_summaries(&self) -> Vec<PeerSummary> {
        self.state.read().peers.values().map(Peer::summary).collect()
    }

    /// Peers currently producing (live and unpaused producers only)
    #[must_use]
    pub fn producers_snapshot(&self) -> Vec<ProducerSummary> {
        let state = self.state.read();
        let mut out = Vec::new();
        for peer in state.peers.values() {
            for producer_id in peer.producers.values() {
                if let Some(record) = state.producers.get(producer_id) {
                    if !record.closed && !record.paused {
                        out.push(ProducerSummary {
                            peer_id: record.peer_id.clone(),
                            id: record.id.clone(),
                            paused: record.paused,
                            closed: record.closed,
                        });
                    }
                }
            }
        }
        out
    }
}

/// Creates and looks up rooms; enumeration is a snapshot, not a live view
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<Room>>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn create_room(&self, host: &UserId) -> Arc<Room> {
        let id = RoomId::from(Uuid::new_v4().to_string());
        let room = Arc::new(Room::new(id.clone(), host.clone()));
        self.rooms.insert(id.clone(), Arc::clone(&room));
        debug!(room_id = %id, host = %host, "room created");
        room
    }

    #[must_use]
    pub fn get_room(&self, id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.get(id).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        self.rooms
            .iter()
            .map(|entry| RoomSummary {
                room_id: entry.key().clone(),
                peer_count: entry.value().peer_count(),
            })
            .collect()
    }

    #[must_use]
    pub fn all_rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|e| Arc::clone(e.value())).collect()
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::UserRegistry;
    use serde_json::Value;

    fn fixture() -> (Arc<Room>, User, User) {
        let users = UserRegistry::new();
        let host = users.create_user();
        let guest = users.create_user();
        let registry = RoomRegistry::new();
        let room = registry.create_room(host.id());
        (room, host, guest)
    }

    fn seed_producer_and_consumer(room: &Room, sender: &PeerId, receiver: &PeerId) {
        let mut state = room.state.write();
        state.transports.insert(
            TransportId::from("t-send"),
            TransportRecord {
                id: TransportId::from("t-send"),
                peer_id: sender.clone(),
                direction: TransportDirection::Send,
                state: TransportState::Connected,
            },
        );
        state.transports.insert(
            TransportId::from("t-recv"),
            TransportRecord {
                id: TransportId::from("t-recv"),
                peer_id: receiver.clone(),
                direction: TransportDirection::Recv,
                state: TransportState::Connected,
            },
        );
        state.producers.insert(
            ProducerId::from("p1"),
            ProducerRecord {
                id: ProducerId::from("p1"),
                peer_id: sender.clone(),
                transport_id: TransportId::from("t-send"),
                kind: MediaKind::Video,
                media_tag: "cam-video".to_string(),
                paused: false,
                closed: false,
            },
        );
        state.consumers.insert(
            ConsumerId::from("c1"),
            ConsumerRecord {
                id: ConsumerId::from("c1"),
                peer_id: receiver.clone(),
                producer_peer_id: sender.clone(),
                producer_id: ProducerId::from("p1"),
                transport_id: TransportId::from("t-recv"),
                media_tag: "cam-video".to_string(),
                kind: MediaKind::Video,
                state: ConsumerState::Paused,
            },
        );
        let sender_peer = state.peers.get_mut(sender).expect("sender peer");
        sender_peer
            .transports
            .insert(TransportDirection::Send, TransportId::from("t-send"));
        sender_peer
            .producers
            .insert("cam-video".to_string(), ProducerId::from("p1"));
        sender_peer.media.insert(
            "cam-video".to_string(),
            crate::peer::MediaInfo {
                paused: false,
                encodings: Value::Null,
            },
        );
        let receiver_peer = state.peers.get_mut(receiver).expect("receiver peer");
        receiver_peer
            .transports
            .insert(TransportDirection::Recv, TransportId::from("t-recv"));
        receiver_peer
            .consumer_layers
            .insert(ConsumerId::from("c1"), crate::peer::ConsumerLayers::default());
    }

    #[test]
    fn test_join_peer_replaces_existing() {
        let (room, _host, guest) = fixture();
        let (first, cascade) = room.join_peer(&guest, 1_000);
        assert!(cascade.is_empty());

        let (second, _) = room.join_peer(&guest, 2_000);
        assert_eq!(first, second);
        assert_eq!(room.peer_count(), 1);

        let state = room.state.read();
        assert_eq!(state.peers.get(&second).expect("peer").join_ts, 2_000);
    }

    #[test]
    fn test_send_transport_close_cascades_to_producer_and_consumers() {
        let (room, host, guest) = fixture();
        let (sender, _) = room.join_peer(&host, 0);
        let (receiver, _) = room.join_peer(&guest, 0);
        seed_producer_and_consumer(&room, &sender, &receiver);

        let mut state = room.state.write();
        let cascade = state.detach_transport(&TransportId::from("t-send"));

        assert_eq!(cascade.transports, vec![TransportId::from("t-send")]);
        assert_eq!(cascade.producers, vec![ProducerId::from("p1")]);
        assert_eq!(cascade.consumers, vec![ConsumerId::from("c1")]);

        // Tombstones remain; live lookups no longer see them.
        assert!(state.find_producer(&sender, "cam-video").is_none());
        assert!(!state.has_live_consumer(&receiver, &sender, "cam-video"));
        assert!(state
            .live_transport(&sender, &TransportId::from("t-send"))
            .is_none());

        // The owning peers' maps were pruned.
        let sender_peer = state.peers.get(&sender).expect("sender");
        assert!(sender_peer.media.is_empty());
        assert!(sender_peer.producers.is_empty());
        assert!(sender_peer.transports.is_empty());
        let receiver_peer = state.peers.get(&receiver).expect("receiver");
        assert!(receiver_peer.consumer_layers.is_empty());

        // A second detach is a no-op.
        let again = state.detach_transport(&TransportId::from("t-send"));
        assert!(again.is_empty());
    }

    #[test]
    fn test_remove_peer_cascades_everything_it_owns() {
        let (room, host, guest) = fixture();
        let (sender, _) = room.join_peer(&host, 0);
        let (receiver, _) = room.join_peer(&guest, 0);
        seed_producer_and_consumer(&room, &sender, &receiver);

        let mut state = room.state.write();
        let cascade = state.remove_peer(&sender);

        assert!(state.peers.get(&sender).is_none());
        assert_eq!(cascade.transports, vec![TransportId::from("t-send")]);
        // Closing the sender's producer closed the receiver's consumer too.
        assert_eq!(cascade.consumers, vec![ConsumerId::from("c1")]);
        assert!(state
            .peers
            .get(&receiver)
            .expect("receiver")
            .consumer_layers
            .is_empty());
    }

    #[test]
    fn test_producers_snapshot_filters_paused_and_closed() {
        let (room, host, guest) = fixture();
        let (sender, _) = room.join_peer(&host, 0);
        let (receiver, _) = room.join_peer(&guest, 0);
        seed_producer_and_consumer(&room, &sender, &receiver);

        assert_eq!(room.producers_snapshot().len(), 1);

        room.state
            .write()
            .producers
            .get_mut(&ProducerId::from("p1"))
            .expect("producer")
            .paused = true;
        assert!(room.producers_snapshot().is_empty());
    }

    #[test]
    fn test_room_listing_counts_peers() {
        let users = UserRegistry::new();
        let host = users.create_user();
        let registry = RoomRegistry::new();
        let room = registry.create_room(host.id());

        assert_eq!(registry.list_rooms()[0].peer_count, 0);
        room.join_peer(&host, 0);
        let listing = registry.list_rooms();
        assert_eq!(listing[0].room_id, *room.id());
        assert_eq!(listing[0].peer_count, 1);
    }
}
