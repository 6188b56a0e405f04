//! Per-peer session state
//!
//! A [`Peer`] is plain data living inside its room's lock; it holds no
//! interior mutability and no references to other entities, only ids.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::engine::StatsSample;
use crate::types::{ConsumerId, PeerId, ProducerId, TransportDirection, TransportId};
use crate::user::{User, UserSnapshot};

/// What a peer currently publishes under one media tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub paused: bool,
    pub encodings: Value,
}

/// Simulcast layer selection state for one consumer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerLayers {
    pub current_layer: Option<u32>,
    pub client_selected_layer: Option<u32>,
}

/// A user's membership in one room
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,
    pub user: User,
    /// Epoch milliseconds of the join
    pub join_ts: i64,
    /// Epoch milliseconds of the last successful sync
    pub last_seen_ts: i64,
    /// Published tracks by media tag
    pub media: HashMap<String, MediaInfo>,
    /// Layer state for every live consumer this peer holds
    pub consumer_layers: HashMap<ConsumerId, ConsumerLayers>,
    /// Latest engine stats, keyed by producer/consumer id
    pub stats: HashMap<String, Vec<StatsSample>>,
    /// At most one transport per direction
    pub transports: HashMap<TransportDirection, TransportId>,
    /// Producers by media tag
    pub producers: HashMap<String, ProducerId>,
}

impl Peer {
    #[must_use]
    pub fn new(id: PeerId, user: User, now_ms: i64) -> Self {
        Self {
            id,
            user,
            join_ts: now_ms,
            last_seen_ts: now_ms,
            media: HashMap::new(),
            consumer_layers: HashMap::new(),
            stats: HashMap::new(),
            transports: HashMap::new(),
            producers: HashMap::new(),
        }
    }

    /// Record liveness; called on every successful sync
    pub fn touch(&mut self, now_ms: i64) {
        self.last_seen_ts = now_ms;
    }

    #[must_use]
    pub fn is_stale(&self, now_ms: i64, stale_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_ts) > stale_ms as i64
    }

    /// The snapshot clients receive in every sync response
    #[must_use]
    pub fn sync_view(&self) -> PeerSyncView {
        PeerSyncView {
            join_ts: self.join_ts,
            last_seen_ts: self.last_seen_ts,
            media: self.media.clone(),
            consumer_layers: self.consumer_layers.clone(),
            stats: self.stats.clone(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            id: self.id.clone(),
            user: self.user.snapshot(),
        }
    }
}

/// Per-peer entry of the sync response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSyncView {
    pub join_ts: i64,
    pub last_seen_ts: i64,
    pub media: HashMap<String, MediaInfo>,
    pub consumer_layers: HashMap<ConsumerId, ConsumerLayers>,
    pub stats: HashMap<String, Vec<StatsSample>>,
}

/// Per-peer entry of the room membership listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSummary {
    pub id: PeerId,
    pub user: UserSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::UserRegistry;

    #[test]
    fn test_staleness() {
        let users = UserRegistry::new();
        let user = users.create_user();
        let peer = Peer::new(PeerId::from("r.u"), user, 1_000);

        assert!(!peer.is_stale(1_000, 15_000));
        assert!(!peer.is_stale(16_000, 15_000));
        assert!(peer.is_stale(16_001, 15_000));
    }

    #[test]
    fn test_sync_view_wire_names() {
        let users = UserRegistry::new();
        let user = users.create_user();
        let mut peer = Peer::new(PeerId::from("r.u"), user, 42);
        peer.media.insert(
            "cam-video".to_string(),
            MediaInfo {
                paused: false,
                encodings: Value::Null,
            },
        );
        peer.consumer_layers
            .insert(ConsumerId::from("c1"), ConsumerLayers::default());

        let json = serde_json::to_value(peer.sync_view()).expect("serialize");
        assert_eq!(json["joinTs"], 42);
        assert_eq!(json["lastSeenTs"], 42);
        assert_eq!(json["media"]["cam-video"]["paused"], false);
        assert!(json["consumerLayers"]["c1"]["currentLayer"].is_null());
    }
}
