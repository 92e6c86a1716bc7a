//! HTTP API of the gateway.
//!
//! Routes (paths match the protocol clients already speak):
//! - POST /api/chat/start
//! - GET /api/chat/stream
//! - GET /health

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::server::streaming::events_to_sse_stream;
use crate::session::SessionManager;

/// Application state shared across handlers.
pub struct AppState {
    pub manager: SessionManager,
    pub config: Arc<Config>,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .route("/api/chat/start", post(start_chat))
        .route("/api/chat/stream", get(stream_chat))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Permissive CORS for the one configured frontend origin. Preflight
/// `OPTIONS` requests are answered by the layer without reaching a handler.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new().allow_origin(origin),
        Err(_) => {
            warn!(origin, "Invalid CORS origin, cross-origin requests will be refused");
            CorsLayer::new()
        }
    };
    layer
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Start request: the prompt forwarded verbatim to the upstream API.
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query parameters for the stream endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    #[serde(default)]
    pub session_id: String,

    /// First chunk index to deliver. Defaults to a full replay.
    #[serde(default)]
    pub last_chunk_index: u64,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn start_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: rejection.body_text(),
                }),
            )
                .into_response();
        }
    };

    let session_id = state.manager.start(req.message).await;
    Json(StartResponse {
        session_id: session_id.to_string(),
    })
    .into_response()
}

async fn stream_chat(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Response {
    info!(
        session_id = params.session_id,
        from_index = params.last_chunk_index,
        "Stream request"
    );

    // An id that is not even a UUID cannot name a session.
    let Ok(session_id) = Uuid::parse_str(&params.session_id) else {
        return not_found();
    };

    match state.manager.attach(&session_id, params.last_chunk_index).await {
        Ok(rx) => (
            [(header::CACHE_CONTROL, "no-cache")],
            Sse::new(events_to_sse_stream(rx)).keep_alive(KeepAlive::default()),
        )
            .into_response(),
        Err(_) => not_found(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Session not found").into_response()
}

async fn health() -> &'static str {
    "OK"
}
