use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::services::translation::TranslateRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct BatchRequest {
    texts: Vec<String>,
    to: String,
    #[serde(default)]
    from: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(translate))
        .route("/batch", post(translate_batch))
}

async fn translate(
    State(state): State<AppState>,
    Json(body): Json<TranslateRequest>,
) -> Result<Response, AppError> {
    let result = state.translation().translate(body).await?;
    Ok(ok(result))
}

async fn translate_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> Result<Response, AppError> {
    let batch = state
        .translation()
        .translate_batch(body.texts, body.to, body.from)
        .await?;
    Ok(ok(batch))
}
