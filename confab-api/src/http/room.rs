// Room management HTTP handlers

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use confab_signal::{PeerSummary, ProducerSummary, RoomId, RoomSummary};

use super::{session, ApiResult, AppState};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
}

/// Room peer/producer snapshot
#[derive(Debug, Serialize)]
pub struct RoomPeersResponse {
    pub peers: Vec<PeerSummary>,
    pub producers: Vec<ProducerSummary>,
}

/// Create a room hosted by the cookie-identified user
///
/// Path: `GET /room/create`
pub async fn create(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<Json<CreateRoomResponse>> {
    let user_id = session::identity(&jar)?;
    let room = state.coordinator.create_room(&user_id)?;
    Ok(Json(CreateRoomResponse {
        room_id: room.id().clone(),
    }))
}

/// List rooms with their current peer counts (a snapshot, not a live view)
///
/// Path: `GET /room/list`
pub async fn list(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.coordinator.list_rooms())
}

/// Peer/producer snapshot for one room
///
/// Path: `GET /room/{roomId}/peers`
pub async fn peers(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<RoomPeersResponse>> {
    let (peers, producers) = state.coordinator.room_peers(&RoomId::from(room_id))?;
    Ok(Json(RoomPeersResponse { peers, producers }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_room_response_wire_shape() {
        let json = serde_json::to_value(CreateRoomResponse {
            room_id: RoomId::from("r-1"),
        })
        .expect("serialize");
        assert_eq!(json["roomId"], "r-1");
    }

    #[test]
    fn test_room_listing_wire_shape() {
        let json = serde_json::to_value(vec![RoomSummary {
            room_id: RoomId::from("r-1"),
            peer_count: 3,
        }])
        .expect("serialize");
        assert_eq!(json[0]["roomId"], "r-1");
        assert_eq!(json[0]["peerCount"], 3);
    }
}
