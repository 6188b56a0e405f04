use thiserror::Error;

use crate::engine::EngineError;
use crate::types::{ConsumerId, PeerId, RoomId, TransportId};

/// Errors surfaced by signaling operations.
///
/// All of these are recovered at the HTTP boundary and turned into an
/// in-band error response; none should crash the process. The message text
/// of the lookup failures matches what clients already parse.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("user not found")]
    UserNotFound,

    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("peer {0} not found")]
    PeerNotFound(PeerId),

    #[error("server-side transport {0} not found")]
    TransportNotFound(TransportId),

    #[error("server-side recv transport for {0} not found")]
    RecvTransportNotFound(PeerId),

    #[error("server-side producer for {peer}:{media_tag} not found")]
    ProducerNotFound { peer: PeerId, media_tag: String },

    #[error("server-side consumer {0} not found")]
    ConsumerNotFound(ConsumerId),

    #[error("consumer for {peer}:{media_tag} already exists")]
    DuplicateConsumer { peer: PeerId, media_tag: String },

    #[error("client cannot consume {peer}:{media_tag}")]
    IncompatibleCapabilities { peer: PeerId, media_tag: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("transport {0} connect failed: {1}")]
    ConnectFailed(TransportId, String),

    #[error("consumer {0} already closed")]
    AlreadyClosed(ConsumerId),

    #[error("not connected")]
    NotConnected,

    #[error("media engine error: {0}")]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, SignalError>;
