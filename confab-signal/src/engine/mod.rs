//! The narrow interface to the media-routing engine
//!
//! The coordinator negotiates transports, producers and consumers by calling
//! into an engine that does all the actual media-plane work (ICE/DTLS
//! handshakes, RTP forwarding, codec matching, bandwidth estimation). The
//! engine is a black box: every parameter blob it hands out
//! (ICE parameters, DTLS fingerprints, RTP parameters) is carried as opaque
//! JSON and returned to clients verbatim.

mod loopback;

pub use loopback::LoopbackEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::types::{ConsumerId, MediaKind, PeerId, ProducerId, TransportDirection, TransportId};

/// An operation the engine rejected or could not complete
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Connection parameters a client needs to complete transport negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub id: TransportId,
    pub ice_parameters: Value,
    pub ice_candidates: Value,
    pub dtls_parameters: Value,
}

/// Result of a successful produce call
#[derive(Debug, Clone)]
pub struct NewProducer {
    pub id: ProducerId,
    pub kind: MediaKind,
    pub paused: bool,
}

/// Result of a successful consume call (consumers always start paused)
#[derive(Debug, Clone)]
pub struct NewConsumer {
    pub id: ConsumerId,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    pub consumer_type: String,
    pub producer_paused: bool,
}

/// One engine-reported statistics snapshot for a producer or consumer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSample {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraction_lost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
}

/// Events the engine emits outside any request/response exchange
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The worker process terminated. Fatal: no routing is possible.
    WorkerDied,
    TransportClosed { transport_id: TransportId },
    ProducerClosed { producer_id: ProducerId },
    /// An observed audio producer is the loudest in its observation window
    Volumes {
        producer_id: ProducerId,
        peer_id: PeerId,
        volume: i32,
    },
    /// Every observed audio producer went quiet
    Silence,
}

/// The media-routing engine as seen by the coordinator.
///
/// Implementations must be safe to call concurrently; the coordinator never
/// holds registry locks across these calls.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Router RTP capabilities, returned to clients unchanged
    async fn router_rtp_capabilities(&self) -> Value;

    async fn create_transport(
        &self,
        peer_id: &PeerId,
        direction: TransportDirection,
    ) -> EngineResult<TransportOptions>;

    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: Value,
    ) -> EngineResult<()>;

    /// Closing a transport closes every producer and consumer riding on it.
    async fn close_transport(&self, transport_id: &TransportId) -> EngineResult<()>;

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: Value,
        paused: bool,
        app_data: Value,
    ) -> EngineResult<NewProducer>;

    /// Closing a producer closes every consumer subscribed to it.
    async fn close_producer(&self, producer_id: &ProducerId) -> EngineResult<()>;

    /// Register an audio producer with the engine's audio-level observer.
    /// The observer drops closed producers on its own.
    async fn observe_audio_level(&self, producer_id: &ProducerId) -> EngineResult<()>;

    /// Whether a client with the given capabilities can consume the producer
    async fn can_consume(&self, producer_id: &ProducerId, rtp_capabilities: &Value) -> bool;

    /// Create a consumer for `producer_id` on `transport_id`, always paused
    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: Value,
        app_data: Value,
    ) -> EngineResult<NewConsumer>;

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> EngineResult<()>;

    async fn close_consumer(&self, consumer_id: &ConsumerId) -> EngineResult<()>;

    async fn producer_stats(&self, producer_id: &ProducerId) -> EngineResult<Vec<StatsSample>>;

    async fn consumer_stats(&self, consumer_id: &ConsumerId) -> EngineResult<Vec<StatsSample>>;

    /// Subscribe to engine-originated events
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}
