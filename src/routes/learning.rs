use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::response::{ok, AppError};
use crate::services::learning::{BulkOptions, BulkWord, LearningConfig, StoreOptions};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct StoreWordRequest {
    word: String,
    #[serde(default)]
    translations: BTreeMap<String, String>,
    #[serde(flatten)]
    options: StoreOptions,
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    words: Vec<BulkWord>,
    #[serde(flatten)]
    options: BulkOptions,
}

#[derive(Debug, Deserialize)]
struct LangQuery {
    lang: Option<String>,
}

#[derive(Serialize)]
struct LearnedTranslation {
    word: String,
    lang: String,
    translation: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/words", post(store_word))
        .route("/words/:word", get(get_word))
        .route("/bulk", post(bulk_upload))
        .route("/stats", get(stats))
        .route("/config", get(get_config).put(update_config))
        .route("/contribute", post(contribute))
}

async fn store_word(
    State(state): State<AppState>,
    Json(body): Json<StoreWordRequest>,
) -> Result<Response, AppError> {
    let outcome = state
        .learning()
        .store_learned_word(&body.word, body.translations, body.options)
        .await?;

    let trigger = state.trigger();
    if outcome.should_trigger_pr && trigger.is_configured() {
        trigger.spawn();
    }
    Ok(ok(outcome))
}

/// With `lang`, the learned translation into that language; without it, the
/// whole ledger record.
async fn get_word(
    State(state): State<AppState>,
    Path(word): Path<String>,
    Query(query): Query<LangQuery>,
) -> Result<Response, AppError> {
    let learning = state.learning();
    match query.lang.filter(|l| !l.trim().is_empty()) {
        Some(lang) => match learning.get_learned_translation(&word, &lang).await? {
            Some(translation) => Ok(ok(LearnedTranslation { word, lang, translation })),
            None => Err(AppError::not_found(format!("no learned {lang} translation for '{word}'"))),
        },
        None => match learning.get_learned_word(&word).await? {
            Some(record) => Ok(ok(record)),
            None => Err(AppError::not_found(format!("'{word}' has not been learned"))),
        },
    }
}

async fn bulk_upload(
    State(state): State<AppState>,
    Json(body): Json<BulkRequest>,
) -> Result<Response, AppError> {
    let result = state
        .learning()
        .bulk_upload_words(body.words, body.options)
        .await;
    if result.rejected {
        return Err(AppError::validation(result.errors.join("; ")));
    }

    let trigger = state.trigger();
    if result.should_trigger_pr && trigger.is_configured() {
        trigger.spawn();
    }
    Ok(ok(result))
}

async fn stats(State(state): State<AppState>) -> Result<Response, AppError> {
    let stats = state.learning().stats().await?;
    Ok(ok(stats))
}

async fn get_config(State(state): State<AppState>) -> Response {
    ok(state.learning().config().await)
}

async fn update_config(
    State(state): State<AppState>,
    Json(body): Json<LearningConfig>,
) -> Result<Response, AppError> {
    let config = state.learning().update_config(body).await?;
    Ok(ok(config))
}

async fn contribute(State(state): State<AppState>) -> Result<Response, AppError> {
    let result = state.trigger().run().await?;
    Ok(ok(result))
}
