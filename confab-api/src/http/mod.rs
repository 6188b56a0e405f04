// Module: http
// HTTP/JSON routes for session, room and signaling operations

pub mod error;
pub mod health;
pub mod room;
pub mod session;
pub mod signaling;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use confab_signal::Coordinator;

pub use error::{ApiError, ApiResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// Create the HTTP router with all routes
pub fn create_router(coordinator: Arc<Coordinator>) -> Router {
    let state = AppState { coordinator };

    Router::new()
        // Health check endpoint (for monitoring probes)
        .merge(health::create_health_router())
        // Session and room management
        .route("/login", get(session::login))
        .route("/room/create", get(room::create))
        .route("/room/list", get(room::list))
        .route("/room/{roomId}/peers", get(room::peers))
        // Signaling (HTTP polling protocol)
        .route(
            "/signaling/router-rtp-capabilities",
            get(signaling::router_rtp_capabilities),
        )
        .route("/signaling/join", post(signaling::join))
        .route("/signaling/sync", post(signaling::sync))
        .route("/signaling/create-transport", post(signaling::create_transport))
        .route(
            "/signaling/connect-transport",
            post(signaling::connect_transport),
        )
        .route("/signaling/send-track", post(signaling::send_track))
        .route("/signaling/recv-track", post(signaling::recv_track))
        .route("/signaling/resume-consumer", post(signaling::resume_consumer))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
