use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct EtymologyQuery {
    lang: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/:word", get(get_etymology))
}

async fn get_etymology(
    State(state): State<AppState>,
    Path(word): Path<String>,
    Query(query): Query<EtymologyQuery>,
) -> Result<Response, AppError> {
    let result = state
        .etymology()
        .get_full_etymology(&word, query.lang.as_deref())
        .await?;
    Ok(ok(result))
}
