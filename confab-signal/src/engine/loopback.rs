//! In-process media engine used by the development binary and the test suite
//!
//! `LoopbackEngine` performs the whole negotiation dance — ids, ICE/DTLS
//! parameter blobs, pause state, close cascades, events — without moving a
//! single RTP packet. Production deployments implement [`MediaEngine`]
//! against a real SFU worker instead.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::{ConsumerId, MediaKind, PeerId, ProducerId, TransportDirection, TransportId};

use super::{
    EngineError, EngineEvent, EngineResult, MediaEngine, NewConsumer, NewProducer, StatsSample,
    TransportOptions,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct TransportEntry {
    peer_id: PeerId,
    direction: TransportDirection,
    connected: bool,
}

struct ProducerEntry {
    transport_id: TransportId,
    kind: MediaKind,
    paused: bool,
    app_data: Value,
}

struct ConsumerEntry {
    transport_id: TransportId,
    producer_id: ProducerId,
    paused: bool,
}

pub struct LoopbackEngine {
    config: EngineConfig,
    transports: DashMap<TransportId, TransportEntry>,
    producers: DashMap<ProducerId, ProducerEntry>,
    consumers: DashMap<ConsumerId, ConsumerEntry>,
    /// Audio producers registered with the level observer
    observed: DashMap<ProducerId, ()>,
    seq: AtomicU64,
    events: broadcast::Sender<EngineEvent>,
}

impl LoopbackEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            transports: DashMap::new(),
            producers: DashMap::new(),
            consumers: DashMap::new(),
            observed: DashMap::new(),
            seq: AtomicU64::new(0),
            events,
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn next_port(&self) -> u16 {
        let span = u64::from(self.config.rtc_max_port - self.config.rtc_min_port) + 1;
        let offset = self.next_seq() % span;
        self.config.rtc_min_port + offset as u16
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine (e.g. unit tests without an event pump).
        let _ = self.events.send(event);
    }

    /// Simulate the audio-level observer reporting `producer_id` as loudest.
    /// No-op for producers that were never registered with the observer.
    pub fn emit_volume(&self, producer_id: &ProducerId, volume: i32) {
        if !self.observed.contains_key(producer_id) {
            return;
        }
        let Some(entry) = self.producers.get(producer_id) else {
            return;
        };
        let peer_id = entry
            .app_data
            .get("peerId")
            .and_then(Value::as_str)
            .map(PeerId::from);
        drop(entry);
        if let Some(peer_id) = peer_id {
            self.emit(EngineEvent::Volumes {
                producer_id: producer_id.clone(),
                peer_id,
                volume,
            });
        }
    }

    /// Simulate the audio-level observer reporting silence.
    pub fn emit_silence(&self) {
        self.emit(EngineEvent::Silence);
    }

    /// Simulate the worker process dying.
    pub fn kill_worker(&self) {
        self.emit(EngineEvent::WorkerDied);
    }

    #[must_use]
    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Owner, direction and connect state the engine recorded for a transport
    #[must_use]
    pub fn transport_meta(
        &self,
        transport_id: &TransportId,
    ) -> Option<(PeerId, TransportDirection, bool)> {
        self.transports
            .get(transport_id)
            .map(|t| (t.peer_id.clone(), t.direction, t.connected))
    }

    #[must_use]
    pub fn consumer_paused(&self, consumer_id: &ConsumerId) -> Option<bool> {
        self.consumers.get(consumer_id).map(|c| c.paused)
    }

    fn codecs_of_kind(&self, kind: MediaKind) -> Vec<Value> {
        self.config
            .media_codecs
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
            .collect()
    }

    /// Fabricate a DTLS certificate fingerprint from a sequence number
    fn fingerprint(seed: u64) -> String {
        let mut x = seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(0xD1B5_4A32_D192_ED03);
        let mut parts = Vec::with_capacity(32);
        for _ in 0..32 {
            x ^= x >> 33;
            x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
            parts.push(format!("{:02X}", (x & 0xFF) as u8));
        }
        parts.join(":")
    }
}

#[async_trait]
impl MediaEngine for LoopbackEngine {
    async fn router_rtp_capabilities(&self) -> Value {
        json!({
            "codecs": self.config.media_codecs,
            "headerExtensions": [],
        })
    }

    async fn create_transport(
        &self,
        peer_id: &PeerId,
        direction: TransportDirection,
    ) -> EngineResult<TransportOptions> {
        let id = TransportId::from(nanoid::nanoid!());
        let seq = self.next_seq();
        let port = self.next_port();

        self.transports.insert(
            id.clone(),
            TransportEntry {
                peer_id: peer_id.clone(),
                direction,
                connected: false,
            },
        );

        debug!(transport_id = %id, peer_id = %peer_id, %direction, "loopback transport created");

        Ok(TransportOptions {
            id,
            ice_parameters: json!({
                "usernameFragment": nanoid::nanoid!(8),
                "password": nanoid::nanoid!(22),
                "iceLite": true,
            }),
            ice_candidates: json!([{
                "foundation": "udpcandidate",
                "ip": self.config.listen_ip,
                "port": port,
                "priority": 1015,
                "protocol": "udp",
                "type": "host",
            }]),
            dtls_parameters: json!({
                "role": "auto",
                "fingerprints": [{
                    "algorithm": "sha-256",
                    "value": Self::fingerprint(seq),
                }],
            }),
        })
    }

    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: Value,
    ) -> EngineResult<()> {
        if !dtls_parameters.is_object() {
            return Err(EngineError::new("malformed dtlsParameters"));
        }
        let mut entry = self
            .transports
            .get_mut(transport_id)
            .ok_or_else(|| EngineError::new(format!("transport {transport_id} not found")))?;
        entry.connected = true;
        Ok(())
    }

    async fn close_transport(&self, transport_id: &TransportId) -> EngineResult<()> {
        // Idempotent: closing an unknown transport is a no-op.
        if self.transports.remove(transport_id).is_none() {
            return Ok(());
        }

        let closed_producers: Vec<ProducerId> = self
            .producers
            .iter()
            .filter(|e| e.value().transport_id == *transport_id)
            .map(|e| e.key().clone())
            .collect();
        for producer_id in &closed_producers {
            self.producers.remove(producer_id);
            self.observed.remove(producer_id);
            self.emit(EngineEvent::ProducerClosed {
                producer_id: producer_id.clone(),
            });
        }

        let closed_consumers: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|e| {
                e.value().transport_id == *transport_id
                    || closed_producers.contains(&e.value().producer_id)
            })
            .map(|e| e.key().clone())
            .collect();
        for consumer_id in &closed_consumers {
            self.consumers.remove(consumer_id);
        }

        self.emit(EngineEvent::TransportClosed {
            transport_id: transport_id.clone(),
        });
        Ok(())
    }

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: Value,
        paused: bool,
        app_data: Value,
    ) -> EngineResult<NewProducer> {
        if !rtp_parameters.is_object() {
            return Err(EngineError::new("malformed rtpParameters"));
        }
        if !self.transports.contains_key(transport_id) {
            return Err(EngineError::new(format!(
                "transport {transport_id} not found"
            )));
        }

        let id = ProducerId::from(nanoid::nanoid!());
        self.producers.insert(
            id.clone(),
            ProducerEntry {
                transport_id: transport_id.clone(),
                kind,
                paused,
                app_data,
            },
        );
        Ok(NewProducer { id, kind, paused })
    }

    async fn close_producer(&self, producer_id: &ProducerId) -> EngineResult<()> {
        // Idempotent, like close_transport.
        if self.producers.remove(producer_id).is_none() {
            return Ok(());
        }
        self.observed.remove(producer_id);
        let orphaned: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|e| e.value().producer_id == *producer_id)
            .map(|e| e.key().clone())
            .collect();
        for consumer_id in orphaned {
            self.consumers.remove(&consumer_id);
        }
        Ok(())
    }

    async fn observe_audio_level(&self, producer_id: &ProducerId) -> EngineResult<()> {
        let entry = self
            .producers
            .get(producer_id)
            .ok_or_else(|| EngineError::new(format!("producer {producer_id} not found")))?;
        if entry.kind != MediaKind::Audio {
            return Err(EngineError::new("only audio producers can be observed"));
        }
        drop(entry);
        self.observed.insert(producer_id.clone(), ());
        Ok(())
    }

    async fn can_consume(&self, producer_id: &ProducerId, rtp_capabilities: &Value) -> bool {
        rtp_capabilities.is_object() && self.producers.contains_key(producer_id)
    }

    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        _rtp_capabilities: Value,
        _app_data: Value,
    ) -> EngineResult<NewConsumer> {
        if !self.transports.contains_key(transport_id) {
            return Err(EngineError::new(format!(
                "transport {transport_id} not found"
            )));
        }
        let (kind, producer_paused) = {
            let entry = self
                .producers
                .get(producer_id)
                .ok_or_else(|| EngineError::new(format!("producer {producer_id} not found")))?;
            (entry.kind, entry.paused)
        };

        let id = ConsumerId::from(nanoid::nanoid!());
        let ssrc = 100_000 + self.next_seq();
        self.consumers.insert(
            id.clone(),
            ConsumerEntry {
                transport_id: transport_id.clone(),
                producer_id: producer_id.clone(),
                paused: true,
            },
        );

        Ok(NewConsumer {
            id,
            kind,
            rtp_parameters: json!({
                "codecs": self.codecs_of_kind(kind),
                "encodings": [{ "ssrc": ssrc }],
            }),
            consumer_type: "simple".to_string(),
            producer_paused,
        })
    }

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> EngineResult<()> {
        let mut entry = self
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| EngineError::new(format!("consumer {consumer_id} not found")))?;
        entry.paused = false;
        Ok(())
    }

    async fn close_consumer(&self, consumer_id: &ConsumerId) -> EngineResult<()> {
        // Idempotent, like close_transport.
        self.consumers.remove(consumer_id);
        Ok(())
    }

    async fn producer_stats(&self, producer_id: &ProducerId) -> EngineResult<Vec<StatsSample>> {
        if !self.producers.contains_key(producer_id) {
            return Err(EngineError::new(format!(
                "producer {producer_id} not found"
            )));
        }
        Ok(vec![StatsSample {
            bitrate: Some(u64::from(self.config.initial_available_outgoing_bitrate)),
            fraction_lost: Some(0.0),
            jitter: Some(0.0),
            score: Some(10),
            rid: None,
        }])
    }

    async fn consumer_stats(&self, consumer_id: &ConsumerId) -> EngineResult<Vec<StatsSample>> {
        if !self.consumers.contains_key(consumer_id) {
            return Err(EngineError::new(format!(
                "consumer {consumer_id} not found"
            )));
        }
        Ok(vec![StatsSample {
            bitrate: Some(u64::from(self.config.initial_available_outgoing_bitrate)),
            fraction_lost: Some(0.0),
            jitter: None,
            score: Some(10),
            rid: None,
        }])
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
