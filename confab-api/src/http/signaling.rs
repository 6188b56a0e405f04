// Signaling protocol handlers (HTTP polling)
//
// One handler per negotiation step. The client drives the documented
// sequence (capabilities → create-transport → connect-transport →
// send/recv-track → resume-consumer); the coordinator rejects anything out
// of order with the structured errors serialized by `ApiError`.

use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use confab_signal::{
    ConsumerGrant, ConsumerId, MediaKind, PeerId, ProducerId, RoomId, SyncSnapshot,
    TransportDirection, TransportId, TransportOptions,
};

use super::{session, ApiResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room_id: RoomId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub peer_id: PeerId,
    pub router_rtp_capabilities: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    pub router_rtp_capabilities: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub peer_id: PeerId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportRequest {
    pub peer_id: PeerId,
    pub direction: TransportDirection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportResponse {
    pub transport_options: TransportOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    pub peer_id: PeerId,
    pub transport_id: TransportId,
    pub dtls_parameters: Value,
}

#[derive(Debug, Serialize)]
pub struct ConnectedResponse {
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTrackRequest {
    pub peer_id: PeerId,
    pub transport_id: TransportId,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub app_data: Value,
}

#[derive(Debug, Serialize)]
pub struct SendTrackResponse {
    pub id: ProducerId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecvTrackRequest {
    pub peer_id: PeerId,
    pub media_peer_id: PeerId,
    pub media_tag: String,
    pub rtp_capabilities: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeConsumerRequest {
    pub peer_id: PeerId,
    pub consumer_id: ConsumerId,
}

#[derive(Debug, Serialize)]
pub struct ResumedResponse {
    pub resumed: bool,
}

/// Create this user's peer in a room and hand back the router capabilities
/// the client needs to initialize its local device
///
/// Path: `POST /signaling/join`
pub async fn join(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<JoinRequest>,
) -> ApiResult<Json<JoinResponse>> {
    let user_id = session::identity(&jar)?;
    let (peer_id, router_rtp_capabilities) =
        state.coordinator.join(&req.room_id, &user_id).await?;
    Ok(Json(JoinResponse {
        peer_id,
        router_rtp_capabilities,
    }))
}

/// Router RTP capabilities, verbatim from the engine
///
/// Path: `GET /signaling/router-rtp-capabilities`
pub async fn router_rtp_capabilities(
    State(state): State<AppState>,
) -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse {
        router_rtp_capabilities: state.coordinator.router_rtp_capabilities().await,
    })
}

/// Poll endpoint: returns the room's peer map and the active speaker, and
/// doubles as the liveness signal that keeps the peer from being evicted
///
/// Path: `POST /signaling/sync`
pub async fn sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> ApiResult<Json<SyncSnapshot>> {
    Ok(Json(state.coordinator.sync(&req.peer_id)?))
}

/// Path: `POST /signaling/create-transport`
pub async fn create_transport(
    State(state): State<AppState>,
    Json(req): Json<CreateTransportRequest>,
) -> ApiResult<Json<CreateTransportResponse>> {
    let transport_options = state
        .coordinator
        .create_transport(&req.peer_id, req.direction)
        .await?;
    Ok(Json(CreateTransportResponse { transport_options }))
}

/// Path: `POST /signaling/connect-transport`
pub async fn connect_transport(
    State(state): State<AppState>,
    Json(req): Json<ConnectTransportRequest>,
) -> ApiResult<Json<ConnectedResponse>> {
    state
        .coordinator
        .connect_transport(&req.peer_id, &req.transport_id, req.dtls_parameters)
        .await?;
    Ok(Json(ConnectedResponse { connected: true }))
}

/// Path: `POST /signaling/send-track`
pub async fn send_track(
    State(state): State<AppState>,
    Json(req): Json<SendTrackRequest>,
) -> ApiResult<Json<SendTrackResponse>> {
    let id = state
        .coordinator
        .send_track(
            &req.peer_id,
            &req.transport_id,
            req.kind,
            req.rtp_parameters,
            req.paused,
            req.app_data,
        )
        .await?;
    Ok(Json(SendTrackResponse { id }))
}

/// Path: `POST /signaling/recv-track`
pub async fn recv_track(
    State(state): State<AppState>,
    Json(req): Json<RecvTrackRequest>,
) -> ApiResult<Json<ConsumerGrant>> {
    let grant = state
        .coordinator
        .recv_track(
            &req.peer_id,
            &req.media_peer_id,
            &req.media_tag,
            req.rtp_capabilities,
        )
        .await?;
    Ok(Json(grant))
}

/// Path: `POST /signaling/resume-consumer`
pub async fn resume_consumer(
    State(state): State<AppState>,
    Json(req): Json<ResumeConsumerRequest>,
) -> ApiResult<Json<ResumedResponse>> {
    state
        .coordinator
        .resume_consumer(&req.peer_id, &req.consumer_id)
        .await?;
    Ok(Json(ResumedResponse { resumed: true }))
}
