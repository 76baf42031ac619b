//! HTTP room relay
//!
//! Store-and-poll rendezvous for the two session descriptions:
//! - `GET /signal/room/:room/:kind` returns `{ok, payload, updatedAt}` or 404 `{ok:false, error:"missing"}`
//! - `POST /signal/room/:room/:kind` with `{payload}` stores it
//! - `DELETE /signal/room/:room/:kind` clears it
//! - `GET /signal/health` reports liveness and the number of known rooms

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use super::signaling::{RoomStore, SignalKind};

pub type SharedRooms = Arc<RwLock<RoomStore>>;

/// Build the relay router over a shared room store
pub fn build_router(rooms: SharedRooms) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/signal/health", get(health_handler))
        .route(
            "/signal/room/:room/:kind",
            get(get_handler).post(post_handler).delete(delete_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(rooms)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<usize>,
}

impl RelayReply {
    fn ok() -> Self {
        Self {
            ok: true,
            payload: None,
            updated_at: None,
            error: None,
            rooms: None,
        }
    }

    fn missing() -> Self {
        Self {
            ok: false,
            error: Some("missing".to_string()),
            ..Self::ok()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PostBody {
    #[serde(default)]
    pub payload: Option<Value>,
}

async fn health_handler(State(rooms): State<SharedRooms>) -> Json<RelayReply> {
    let count = rooms.read().await.len();
    info!("health rooms={}", count);
    Json(RelayReply {
        rooms: Some(count),
        ..RelayReply::ok()
    })
}

async fn get_handler(
    State(rooms): State<SharedRooms>,
    Path((room, kind)): Path<(String, SignalKind)>,
) -> Response {
    // Lookups create the room, so they take the write lock
    let stored = rooms.write().await.get(&room, kind);
    match stored {
        Some((payload, updated_at)) => {
            info!("room={} kind={} hit", room, kind);
            Json(RelayReply {
                payload: Some(payload),
                updated_at: Some(updated_at),
                ..RelayReply::ok()
            })
            .into_response()
        }
        None => {
            info!("room={} kind={} miss", room, kind);
            (StatusCode::NOT_FOUND, Json(RelayReply::missing())).into_response()
        }
    }
}

async fn post_handler(
    State(rooms): State<SharedRooms>,
    Path((room, kind)): Path<(String, SignalKind)>,
    Json(body): Json<PostBody>,
) -> Json<RelayReply> {
    rooms.write().await.set(&room, kind, body.payload);
    info!("room={} kind={} set", room, kind);
    Json(RelayReply::ok())
}

async fn delete_handler(
    State(rooms): State<SharedRooms>,
    Path((room, kind)): Path<(String, SignalKind)>,
) -> Json<RelayReply> {
    rooms.write().await.clear(&room, kind);
    info!("room={} kind={} clear", room, kind);
    Json(RelayReply::ok())
}
