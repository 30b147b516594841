mod dictionary;
mod etymology;
mod health;
mod learning;
mod translate;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let healthcheck_endpoint = normalize_healthcheck_endpoint(
        std::env::var("HEALTHCHECK_ENDPOINT")
            .ok()
            .as_deref()
            .unwrap_or("/health"),
    );

    let mut app = Router::new()
        .nest("/api/translate", translate::router())
        .nest("/api/etymology", etymology::router())
        .nest("/api/dictionary", dictionary::router())
        .nest("/api/learning", learning::router());

    let mut health_paths = vec!["/health".to_string()];
    if healthcheck_endpoint != "/health" {
        health_paths.push(healthcheck_endpoint);
    }
    for path in &health_paths {
        app = app.nest(path.as_str(), health::router());
    }

    app.fallback(fallback_handler).with_state(state)
}

fn normalize_healthcheck_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return "/health".to_string();
    }

    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    with_slash.trim_end_matches('/').to_string()
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found").into_response()
}

#[cfg(test)]
mod tests {
    use super::normalize_healthcheck_endpoint;

    #[test]
    fn healthcheck_endpoint_is_normalized() {
        assert_eq!(normalize_healthcheck_endpoint("status/"), "/status");
        assert_eq!(normalize_healthcheck_endpoint("  "), "/health");
        assert_eq!(normalize_healthcheck_endpoint("/"), "/health");
        assert_eq!(normalize_healthcheck_endpoint("/api/health"), "/api/health");
    }
}
