use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::db::clamp_search_limit;
use crate::lexicon::normalize_word;
use crate::response::{ok, AppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    words: Vec<String>,
    count: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search))
        .route("/stats", get(stats))
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let prefix = query.q.as_deref().map(normalize_word).unwrap_or_default();
    if prefix.is_empty() {
        return Err(AppError::validation("q is required"));
    }

    let words = state
        .dictionary()
        .search(&prefix, clamp_search_limit(query.limit))
        .await?;
    Ok(ok(SearchResponse {
        count: words.len(),
        query: prefix,
        words,
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Response, AppError> {
    let stats = state.dictionary().stats().await?;
    Ok(ok(stats))
}
