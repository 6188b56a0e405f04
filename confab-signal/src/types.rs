//! Common identifier and enum types used throughout the coordinator

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque identifier for an authenticated browser session
    UserId
);
string_id!(
    /// Unique identifier for a conference room
    RoomId
);
string_id!(
    /// Engine-assigned identifier for a transport
    TransportId
);
string_id!(
    /// Engine-assigned identifier for a producer
    ProducerId
);
string_id!(
    /// Engine-assigned identifier for a consumer
    ConsumerId
);

/// A user's membership in one room.
///
/// The composite form `"{room_id}.{user_id}"` is the wire-visible peer id;
/// room and user ids are uuids and never contain a dot, so the first `.`
/// is an unambiguous separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn compose(room_id: &RoomId, user_id: &UserId) -> Self {
        Self(format!("{}.{}", room_id.as_str(), user_id.as_str()))
    }

    /// The room component of the composite id, if well-formed.
    #[must_use]
    pub fn room_id(&self) -> Option<RoomId> {
        self.0.split_once('.').map(|(room, _)| RoomId::from(room))
    }

    /// The user component of the composite id, if well-formed.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.0.split_once('.').map(|(_, user)| UserId::from(user))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Direction of a transport, from the client's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

impl fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Recv => write!(f, "recv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_compose_and_split() {
        let room = RoomId::from("7c9f5ab0-1111-4e2a-9f00-aaaaaaaaaaaa");
        let user = UserId::from("1d2e3f40-2222-4b3c-8d00-bbbbbbbbbbbb");
        let peer = PeerId::compose(&room, &user);

        assert_eq!(
            peer.as_str(),
            "7c9f5ab0-1111-4e2a-9f00-aaaaaaaaaaaa.1d2e3f40-2222-4b3c-8d00-bbbbbbbbbbbb"
        );
        assert_eq!(peer.room_id(), Some(room));
        assert_eq!(peer.user_id(), Some(user));
    }

    #[test]
    fn test_peer_id_malformed() {
        let peer = PeerId::from("no-separator");
        assert_eq!(peer.room_id(), None);
        assert_eq!(peer.user_id(), None);
    }

    #[test]
    fn test_direction_wire_format() {
        assert_eq!(
            serde_json::to_string(&TransportDirection::Recv).expect("serialize"),
            "\"recv\""
        );
        let d: TransportDirection = serde_json::from_str("\"send\"").expect("deserialize");
        assert_eq!(d, TransportDirection::Send);
    }

    #[test]
    fn test_media_kind_wire_format() {
        assert_eq!(
            serde_json::to_string(&MediaKind::Audio).expect("serialize"),
            "\"audio\""
        );
        let k: MediaKind = serde_json::from_str("\"video\"").expect("deserialize");
        assert_eq!(k, MediaKind::Video);
    }
}
