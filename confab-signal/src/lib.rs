//! Confab signaling coordinator
//!
//! This crate implements the session/signaling side of a multi-party WebRTC
//! conference: the state machine tracking rooms, peers, transports, producers
//! and consumers, the negotiation operations driven by browser clients, and
//! the periodic reconciliation that evicts stale peers and refreshes media
//! statistics.
//!
//! ## Architecture
//!
//! - **`Coordinator`**: owns all registries and exposes one method per
//!   signaling operation
//! - **`RoomRegistry` / `Room`**: per-room arenas for peers, transports,
//!   producers and consumers, referenced by id
//! - **`UserRegistry`**: opaque identity store backing the login cookie
//! - **`MediaEngine`**: the narrow interface to the media-routing engine;
//!   the coordinator never touches RTP, ICE or DTLS itself
//!
//! The actual media plane (packet forwarding, codec negotiation, bandwidth
//! estimation) lives entirely behind [`engine::MediaEngine`]. The
//! [`engine::LoopbackEngine`] implementation fabricates negotiation
//! parameters in-process and is what the development binary and the test
//! suite run against.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod logging;
pub mod peer;
pub mod room;
pub mod types;
pub mod user;

pub use config::{Config, EngineConfig, LoggingConfig, ServerConfig, SignalingConfig};
pub use coordinator::{ActiveSpeaker, ConsumerGrant, Coordinator, SyncSnapshot};
pub use engine::{EngineError, EngineEvent, LoopbackEngine, MediaEngine, TransportOptions};
pub use error::{Result, SignalError};
pub use peer::{PeerSummary, PeerSyncView};
pub use room::{ProducerSummary, Room, RoomRegistry, RoomSummary};
pub use types::{
    ConsumerId, MediaKind, PeerId, ProducerId, RoomId, TransportDirection, TransportId, UserId,
};
pub use user::{User, UserRegistry};
