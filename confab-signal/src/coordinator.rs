//! The signaling coordinator
//!
//! One `Coordinator` instance owns every registry for the process and
//! exposes one method per negotiation step. Registry locks are taken only
//! around reads/writes of the maps themselves, never across an engine call;
//! every mutating operation therefore runs as validate → engine call →
//! re-validate & commit, and rolls back (closing the freshly created engine
//! object) when the precondition vanished while the call was in flight.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use crate::config::SignalingConfig;
use crate::engine::{EngineEvent, MediaEngine, TransportOptions};
use crate::error::{Result, SignalError};
use crate::peer::{ConsumerLayers, MediaInfo, PeerSummary, PeerSyncView};
use crate::room::{
    Cascade, ConsumerRecord, ConsumerState, ProducerRecord, ProducerSummary, Room, RoomRegistry,
    RoomSummary, TransportRecord, TransportState,
};
use crate::types::{
    ConsumerId, MediaKind, PeerId, ProducerId, RoomId, TransportDirection, TransportId, UserId,
};
use crate::user::{User, UserRegistry};

/// Latest loudest-producer report from the engine's audio-level observer.
/// All fields null while every observed producer is silent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSpeaker {
    pub producer_id: Option<ProducerId>,
    pub volume: Option<i32>,
    pub peer_id: Option<PeerId>,
}

/// Everything a client receives from a successful sync
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub peers: BTreeMap<String, PeerSyncView>,
    pub active_speaker: ActiveSpeaker,
}

/// Everything a client needs to attach its local consumer object
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGrant {
    pub producer_id: ProducerId,
    pub id: ConsumerId,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    #[serde(rename = "type")]
    pub consumer_type: String,
    pub producer_paused: bool,
}

pub struct Coordinator {
    config: SignalingConfig,
    engine: Arc<dyn MediaEngine>,
    users: UserRegistry,
    rooms: RoomRegistry,
    active_speaker: RwLock<ActiveSpeaker>,
    fatal_tx: watch::Sender<bool>,
}

impl Coordinator {
    pub fn new(config: SignalingConfig, engine: Arc<dyn MediaEngine>) -> Arc<Self> {
        let (fatal_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            engine,
            users: UserRegistry::new(),
            rooms: RoomRegistry::new(),
            active_speaker: RwLock::new(ActiveSpeaker::default()),
            fatal_tx,
        })
    }

    #[must_use]
    pub fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    #[must_use]
    pub fn config(&self) -> &SignalingConfig {
        &self.config
    }

    /// Becomes true when the engine worker dies and the process must exit
    #[must_use]
    pub fn fatal_signal(&self) -> watch::Receiver<bool> {
        self.fatal_tx.subscribe()
    }

    // ---- identity & rooms ----

    pub fn login(&self) -> User {
        self.users.create_user()
    }

    pub fn create_room(&self, user_id: &UserId) -> Result<Arc<Room>> {
        let user = self.users.get_user(user_id).ok_or(SignalError::UserNotFound)?;
        Ok(self.rooms.create_room(user.id()))
    }

    #[must_use]
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        self.rooms.list_rooms()
    }

    pub fn room_peers(
        &self,
        room_id: &RoomId,
    ) -> Result<(Vec<PeerSummary>, Vec<ProducerSummary>)> {
        let room = self
            .rooms
            .get_room(room_id)
            .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;
        Ok((room.peer_summaries(), room.producers_snapshot()))
    }

    /// Create (or re-create) this user's peer in the room and return the
    /// router capabilities the client needs to initialize its device.
    pub async fn join(&self, room_id: &RoomId, user_id: &UserId) -> Result<(PeerId, Value)> {
        let user = self.users.get_user(user_id).ok_or(SignalError::UserNotFound)?;
        let room = self
            .rooms
            .get_room(room_id)
            .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;

        let (peer_id, cascade) = room.join_peer(&user, Self::now_ms());
        self.apply_cascade(cascade).await;
        info!(room_id = %room_id, peer_id = %peer_id, "peer joined room");

        Ok((peer_id, self.engine.router_rtp_capabilities().await))
    }

    // ---- signaling operations ----

    pub async fn router_rtp_capabilities(&self) -> Value {
        self.engine.router_rtp_capabilities().await
    }

    /// Read-with-side-effect: returns the room snapshot and touches the
    /// peer's liveness timestamp. `NotConnected` tells the client to rejoin.
    pub fn sync(&self, peer_id: &PeerId) -> Result<SyncSnapshot> {
        let room = peer_id
            .room_id()
            .and_then(|room_id| self.rooms.get_room(&room_id))
            .ok_or(SignalError::NotConnected)?;
        if !room.touch_peer(peer_id, Self::now_ms()) {
            return Err(SignalError::NotConnected);
        }
        Ok(SyncSnapshot {
            peers: room.sync_snapshot(),
            active_speaker: self.active_speaker.read().clone(),
        })
    }

    pub async fn create_transport(
        &self,
        peer_id: &PeerId,
        direction: TransportDirection,
    ) -> Result<TransportOptions> {
        let room = self.room_of_peer(peer_id)?;
        if !room.contains_peer(peer_id) {
            return Err(SignalError::PeerNotFound(peer_id.clone()));
        }

        let options = self.engine.create_transport(peer_id, direction).await?;

        let commit: Option<Cascade> = {
            let mut state = room.state.write();
            if !state.peers.contains_key(peer_id) {
                None
            } else {
                let previous = state
                    .peers
                    .get(peer_id)
                    .and_then(|p| p.transports.get(&direction).cloned());
                let mut cascade = Cascade::default();
                if let Some(old_id) = previous {
                    // One transport per direction: the replacement closes
                    // its predecessor.
                    cascade = state.detach_transport(&old_id);
                }
                state.transports.insert(
                    options.id.clone(),
                    TransportRecord {
                        id: options.id.clone(),
                        peer_id: peer_id.clone(),
                        direction,
                        state: TransportState::Created,
                    },
                );
                if let Some(peer) = state.peers.get_mut(peer_id) {
                    peer.transports.insert(direction, options.id.clone());
                }
                Some(cascade)
            }
        };

        match commit {
            Some(cascade) => {
                self.apply_cascade(cascade).await;
                debug!(peer_id = %peer_id, transport_id = %options.id, %direction, "transport created");
                Ok(options)
            }
            None => {
                // Peer evicted while the engine call was in flight.
                let _ = self.engine.close_transport(&options.id).await;
                Err(SignalError::PeerNotFound(peer_id.clone()))
            }
        }
    }

    pub async fn connect_transport(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        dtls_parameters: Value,
    ) -> Result<()> {
        let room = self.room_of_peer(peer_id)?;
        {
            let state = room.state.read();
            if state.live_transport(peer_id, transport_id).is_none() {
                return Err(SignalError::TransportNotFound(transport_id.clone()));
            }
        }

        if let Err(e) = self
            .engine
            .connect_transport(transport_id, dtls_parameters)
            .await
        {
            // The transport is retained so the caller can probe again.
            return Err(SignalError::ConnectFailed(transport_id.clone(), e.to_string()));
        }

        let mut state = room.state.write();
        if let Some(record) = state.transports.get_mut(transport_id) {
            if record.state == TransportState::Created {
                record.state = TransportState::Connected;
            }
        }
        debug!(peer_id = %peer_id, transport_id = %transport_id, "transport connected");
        Ok(())
    }

    pub async fn send_track(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: Value,
        paused: bool,
        app_data: Value,
    ) -> Result<ProducerId> {
        let room = self.room_of_peer(peer_id)?;
        let media_tag = media_tag_of(&app_data)?;
        {
            let state = room.state.read();
            let transport = state
                .live_transport(peer_id, transport_id)
                .ok_or_else(|| SignalError::TransportNotFound(transport_id.clone()))?;
            if transport.direction != TransportDirection::Send {
                return Err(SignalError::InvalidState(format!(
                    "transport {transport_id} is not a send transport"
                )));
            }
        }

        let mut merged = match app_data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.insert("peerId".to_string(), json!(peer_id.as_str()));
        merged.insert("transportId".to_string(), json!(transport_id.as_str()));
        let encodings = rtp_parameters.get("encodings").cloned().unwrap_or(Value::Null);

        let producer = self
            .engine
            .produce(transport_id, kind, rtp_parameters, paused, Value::Object(merged))
            .await?;

        let commit: Option<Cascade> = {
            let mut state = room.state.write();
            if state.live_transport(peer_id, transport_id).is_none() {
                None
            } else {
                let previous = state
                    .peers
                    .get(peer_id)
                    .and_then(|p| p.producers.get(&media_tag).cloned());
                let mut cascade = Cascade::default();
                if let Some(old_id) = previous {
                    // Re-publishing a tag replaces the previous producer.
                    cascade = state.detach_producer(&old_id);
                }
                state.producers.insert(
                    producer.id.clone(),
                    ProducerRecord {
                        id: producer.id.clone(),
                        peer_id: peer_id.clone(),
                        transport_id: transport_id.clone(),
                        kind,
                        media_tag: media_tag.clone(),
                        paused,
                        closed: false,
                    },
                );
                if let Some(peer) = state.peers.get_mut(peer_id) {
                    peer.producers.insert(media_tag.clone(), producer.id.clone());
                    peer.media.insert(media_tag.clone(), MediaInfo { paused, encodings });
                }
                Some(cascade)
            }
        };

        match commit {
            Some(cascade) => {
                self.apply_cascade(cascade).await;
                if kind == MediaKind::Audio {
                    if let Err(e) = self.engine.observe_audio_level(&producer.id).await {
                        warn!(producer_id = %producer.id, error = %e, "audio-level observation failed");
                    }
                }
                info!(peer_id = %peer_id, producer_id = %producer.id, %kind, media_tag = %media_tag, "producer created");
                Ok(producer.id)
            }
            None => {
                let _ = self.engine.close_producer(&producer.id).await;
                Err(SignalError::TransportNotFound(transport_id.clone()))
            }
        }
    }

    pub async fn recv_track(
        &self,
        peer_id: &PeerId,
        media_peer_id: &PeerId,
        media_tag: &str,
        rtp_capabilities: Value,
    ) -> Result<ConsumerGrant> {
        let room = self.room_of_peer(peer_id)?;

        let (producer_id, recv_transport) = {
            let state = room.state.read();
            if !state.peers.contains_key(peer_id) {
                return Err(SignalError::PeerNotFound(peer_id.clone()));
            }
            let producer = state.find_producer(media_peer_id, media_tag).ok_or_else(|| {
                SignalError::ProducerNotFound {
                    peer: media_peer_id.clone(),
                    media_tag: media_tag.to_string(),
                }
            })?;
            let recv_transport = state
                .peers
                .get(peer_id)
                .and_then(|p| p.transports.get(&TransportDirection::Recv))
                .cloned();
            (producer.id.clone(), recv_transport)
        };

        if !self.engine.can_consume(&producer_id, &rtp_capabilities).await {
            return Err(SignalError::IncompatibleCapabilities {
                peer: media_peer_id.clone(),
                media_tag: media_tag.to_string(),
            });
        }

        let transport_id =
            recv_transport.ok_or_else(|| SignalError::RecvTransportNotFound(peer_id.clone()))?;
        {
            let state = room.state.read();
            if state.live_transport(peer_id, &transport_id).is_none() {
                return Err(SignalError::RecvTransportNotFound(peer_id.clone()));
            }
            if state.has_live_consumer(peer_id, media_peer_id, media_tag) {
                return Err(SignalError::DuplicateConsumer {
                    peer: media_peer_id.clone(),
                    media_tag: media_tag.to_string(),
                });
            }
        }

        let app_data = json!({
            "peerId": peer_id.as_str(),
            "mediaPeerId": media_peer_id.as_str(),
            "mediaTag": media_tag,
        });
        let consumer = self
            .engine
            .consume(&transport_id, &producer_id, rtp_capabilities, app_data)
            .await?;

        let rejection: Option<SignalError> = {
            let mut state = room.state.write();
            if !state.peers.contains_key(peer_id) {
                Some(SignalError::PeerNotFound(peer_id.clone()))
            } else if state.producers.get(&producer_id).is_none_or(|p| p.closed) {
                Some(SignalError::ProducerNotFound {
                    peer: media_peer_id.clone(),
                    media_tag: media_tag.to_string(),
                })
            } else if state.live_transport(peer_id, &transport_id).is_none() {
                Some(SignalError::RecvTransportNotFound(peer_id.clone()))
            } else if state.has_live_consumer(peer_id, media_peer_id, media_tag) {
                // Lost the race against an identical request.
                Some(SignalError::DuplicateConsumer {
                    peer: media_peer_id.clone(),
                    media_tag: media_tag.to_string(),
                })
            } else {
                state.consumers.insert(
                    consumer.id.clone(),
                    ConsumerRecord {
                        id: consumer.id.clone(),
                        peer_id: peer_id.clone(),
                        producer_peer_id: media_peer_id.clone(),
                        producer_id: producer_id.clone(),
                        transport_id: transport_id.clone(),
                        media_tag: media_tag.to_string(),
                        kind: consumer.kind,
                        state: ConsumerState::Paused,
                    },
                );
                if let Some(peer) = state.peers.get_mut(peer_id) {
                    peer.consumer_layers
                        .insert(consumer.id.clone(), ConsumerLayers::default());
                }
                None
            }
        };

        if let Some(error) = rejection {
            let _ = self.engine.close_consumer(&consumer.id).await;
            return Err(error);
        }

        info!(peer_id = %peer_id, consumer_id = %consumer.id, source = %media_peer_id, media_tag = %media_tag, "consumer created (paused)");
        Ok(ConsumerGrant {
            producer_id,
            id: consumer.id,
            kind: consumer.kind,
            rtp_parameters: consumer.rtp_parameters,
            consumer_type: consumer.consumer_type,
            producer_paused: consumer.producer_paused,
        })
    }

    /// The step that actually starts media flow: consumers are created
    /// paused so the client can finish ICE/DTLS before bytes arrive.
    pub async fn resume_consumer(&self, peer_id: &PeerId, consumer_id: &ConsumerId) -> Result<()> {
        let room = self.room_of_peer(peer_id)?;
        {
            let state = room.state.read();
            match state.consumers.get(consumer_id) {
                None => return Err(SignalError::ConsumerNotFound(consumer_id.clone())),
                Some(c) if c.peer_id != *peer_id => {
                    return Err(SignalError::ConsumerNotFound(consumer_id.clone()))
                }
                Some(c) if c.state == ConsumerState::Closed => {
                    return Err(SignalError::AlreadyClosed(consumer_id.clone()))
                }
                Some(_) => {}
            }
        }

        self.engine.resume_consumer(consumer_id).await?;

        let mut state = room.state.write();
        if let Some(record) = state.consumers.get_mut(consumer_id) {
            if record.state == ConsumerState::Paused {
                record.state = ConsumerState::Resumed;
            }
        }
        debug!(peer_id = %peer_id, consumer_id = %consumer_id, "consumer resumed");
        Ok(())
    }

    // ---- reconciliation ----

    /// Evict every peer whose last sync is older than the staleness window
    pub async fn sweep_stale_peers(&self, now_ms: i64) {
        for room in self.rooms.all_rooms() {
            let stale: Vec<PeerId> = {
                let state = room.state.read();
                state
                    .peers
                    .values()
                    .filter(|p| p.is_stale(now_ms, self.config.peer_stale_ms))
                    .map(|p| p.id.clone())
                    .collect()
            };
            for peer_id in stale {
                warn!(room_id = %room.id(), peer_id = %peer_id, "removing stale peer");
                let cascade = room.state.write().remove_peer(&peer_id);
                self.apply_cascade(cascade).await;
            }
        }
    }

    /// Pull engine stats for every live producer and consumer. A failure
    /// for one entity is logged and must not abort the rest of the sweep.
    pub async fn refresh_stats(&self) {
        for room in self.rooms.all_rooms() {
            let producers: Vec<(ProducerId, PeerId)> = {
                let state = room.state.read();
                state
                    .producers
                    .values()
                    .filter(|p| !p.closed)
                    .map(|p| (p.id.clone(), p.peer_id.clone()))
                    .collect()
            };
            for (producer_id, owner) in producers {
                match self.engine.producer_stats(&producer_id).await {
                    Ok(samples) => {
                        let mut state = room.state.write();
                        if let Some(peer) = state.peers.get_mut(&owner) {
                            peer.stats.insert(producer_id.as_str().to_string(), samples);
                        }
                    }
                    Err(e) => {
                        warn!(producer_id = %producer_id, error = %e, "producer stats fetch failed");
                    }
                }
            }

            let consumers: Vec<(ConsumerId, PeerId)> = {
                let state = room.state.read();
                state
                    .consumers
                    .values()
                    .filter(|c| c.state != ConsumerState::Closed)
                    .map(|c| (c.id.clone(), c.peer_id.clone()))
                    .collect()
            };
            for (consumer_id, owner) in consumers {
                match self.engine.consumer_stats(&consumer_id).await {
                    Ok(samples) => {
                        let mut state = room.state.write();
                        if let Some(peer) = state.peers.get_mut(&owner) {
                            peer.stats.insert(consumer_id.as_str().to_string(), samples);
                        }
                    }
                    Err(e) => {
                        warn!(consumer_id = %consumer_id, error = %e, "consumer stats fetch failed");
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn active_speaker(&self) -> ActiveSpeaker {
        self.active_speaker.read().clone()
    }

    /// React to an engine-originated event. Cascade handling is idempotent
    /// with the request-path cleanup, so a concurrent close is harmless.
    pub async fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::WorkerDied => {
                error!("media engine worker died; no routing is possible");
                self.fatal_tx.send_replace(true);
            }
            EngineEvent::TransportClosed { transport_id } => {
                for room in self.rooms.all_rooms() {
                    let cascade = room.state.write().detach_transport(&transport_id);
                    self.apply_cascade(cascade).await;
                }
            }
            EngineEvent::ProducerClosed { producer_id } => {
                for room in self.rooms.all_rooms() {
                    let cascade = room.state.write().detach_producer(&producer_id);
                    self.apply_cascade(cascade).await;
                }
            }
            EngineEvent::Volumes {
                producer_id,
                peer_id,
                volume,
            } => {
                *self.active_speaker.write() = ActiveSpeaker {
                    producer_id: Some(producer_id),
                    volume: Some(volume),
                    peer_id: Some(peer_id),
                };
            }
            EngineEvent::Silence => {
                *self.active_speaker.write() = ActiveSpeaker::default();
            }
        }
    }

    /// Spawn the staleness sweep, the stats refresh and the engine event
    /// pump. Not called by the constructor so tests drive ticks themselves.
    pub fn spawn_maintenance(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let coordinator = Arc::clone(self);
        let sweep_every = Duration::from_millis(self.config.sweep_interval_ms);
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(sweep_every);
            loop {
                ticker.tick().await;
                coordinator.sweep_stale_peers(Self::now_ms()).await;
            }
        }));

        let coordinator = Arc::clone(self);
        let stats_every = Duration::from_millis(self.config.stats_interval_ms);
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(stats_every);
            loop {
                ticker.tick().await;
                coordinator.refresh_stats().await;
            }
        }));

        let coordinator = Arc::clone(self);
        let mut events = self.engine.subscribe();
        handles.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => coordinator.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "engine event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        handles
    }

    // ---- internals ----

    fn room_of_peer(&self, peer_id: &PeerId) -> Result<Arc<Room>> {
        peer_id
            .room_id()
            .and_then(|room_id| self.rooms.get_room(&room_id))
            .ok_or_else(|| SignalError::PeerNotFound(peer_id.clone()))
    }

    /// Perform the engine-side closes a registry cascade left owed.
    /// Every close is idempotent; failures are logged and skipped.
    async fn apply_cascade(&self, cascade: Cascade) {
        if cascade.is_empty() {
            return;
        }
        for id in &cascade.transports {
            if let Err(e) = self.engine.close_transport(id).await {
                warn!(transport_id = %id, error = %e, "transport close failed");
            }
        }
        for id in &cascade.producers {
            if let Err(e) = self.engine.close_producer(id).await {
                warn!(producer_id = %id, error = %e, "producer close failed");
            }
        }
        for id in &cascade.consumers {
            if let Err(e) = self.engine.close_consumer(id).await {
                warn!(consumer_id = %id, error = %e, "consumer close failed");
            }
        }
    }
}

fn media_tag_of(app_data: &Value) -> Result<String> {
    app_data
        .get("mediaTag")
        .or_else(|| app_data.get("mediaType"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            SignalError::InvalidState("send-track appData is missing a media tag".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::LoopbackEngine;

    fn coordinator() -> (Arc<Coordinator>, Arc<LoopbackEngine>) {
        let engine = Arc::new(LoopbackEngine::new(EngineConfig::default()));
        let coordinator = Coordinator::new(SignalingConfig::default(), engine.clone());
        (coordinator, engine)
    }

    #[test]
    fn test_media_tag_of_accepts_both_keys() {
        assert_eq!(
            media_tag_of(&json!({"mediaTag": "cam-video"})).expect("tag"),
            "cam-video"
        );
        assert_eq!(
            media_tag_of(&json!({"mediaType": "screen-audio"})).expect("tag"),
            "screen-audio"
        );
        assert!(media_tag_of(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_sync_unknown_peer_is_not_connected() {
        let (coordinator, _engine) = coordinator();
        let err = coordinator
            .sync(&PeerId::from("ghost.room"))
            .expect_err("should fail");
        assert_eq!(err.to_string(), "not connected");
    }

    #[tokio::test]
    async fn test_create_room_requires_login() {
        let (coordinator, _engine) = coordinator();
        assert!(matches!(
            coordinator.create_room(&UserId::from("nobody")),
            Err(SignalError::UserNotFound)
        ));

        let user = coordinator.login();
        let room = coordinator.create_room(user.id()).expect("room");
        assert_eq!(room.host_user(), user.id());
    }

    #[tokio::test]
    async fn test_active_speaker_relay() {
        let (coordinator, _engine) = coordinator();

        coordinator
            .handle_event(EngineEvent::Volumes {
                producer_id: ProducerId::from("p1"),
                peer_id: PeerId::from("r.u1"),
                volume: -50,
            })
            .await;
        let speaker = coordinator.active_speaker();
        assert_eq!(speaker.producer_id, Some(ProducerId::from("p1")));
        assert_eq!(speaker.volume, Some(-50));

        coordinator.handle_event(EngineEvent::Silence).await;
        let speaker = coordinator.active_speaker();
        assert!(speaker.producer_id.is_none());
        assert!(speaker.volume.is_none());
        assert!(speaker.peer_id.is_none());
    }

    #[tokio::test]
    async fn test_worker_death_raises_fatal_signal() {
        let (coordinator, _engine) = coordinator();
        let rx = coordinator.fatal_signal();
        assert!(!*rx.borrow());

        coordinator.handle_event(EngineEvent::WorkerDied).await;
        assert!(*rx.borrow());
    }
}
