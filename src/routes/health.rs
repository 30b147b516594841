use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/live", get(live))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    version: &'static str,
    components: Components,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Components {
    lexicon_words: usize,
    redis: &'static str,
    ai: bool,
    contributions: bool,
}

#[derive(Serialize)]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
}

/// Degraded when Redis is configured but not answering; every other
/// component has an in-process fallback.
async fn root(State(state): State<AppState>) -> Response {
    let redis = match state.redis() {
        Some(cache) if cache.is_connected().await => "connected",
        Some(_) => "disconnected",
        None => "memory",
    };
    let healthy = redis != "disconnected";

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
        components: Components {
            lexicon_words: state.lexicon().len(),
            redis,
            ai: state.ai_available(),
            contributions: state.trigger().is_configured(),
        },
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "healthy",
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
    })
    .into_response()
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
