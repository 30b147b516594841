use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::RepositoryError;
use crate::services::contribution::ContributionError;
use crate::services::etymology::EtymologyError;
use crate::services::learning::LearningError;
use crate::services::translation::TranslationError;

#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(SuccessResponse { success: true, data })).into_response()
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::operational(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    fn operational(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            is_operational: true,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if !self.is_operational {
            tracing::error!(code = %self.code, message = %self.message, "request failed");
        }
        let message = if self.is_operational {
            self.message
        } else {
            "internal server error".to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<TranslationError> for AppError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::Validation(msg) => Self::validation(msg),
            TranslationError::Unavailable(_) => {
                Self::unavailable("TRANSLATION_UNAVAILABLE", err.to_string())
            }
        }
    }
}

impl From<EtymologyError> for AppError {
    fn from(err: EtymologyError) -> Self {
        match err {
            EtymologyError::Validation(msg) => Self::validation(msg),
        }
    }
}

impl From<LearningError> for AppError {
    fn from(err: LearningError) -> Self {
        match err {
            LearningError::Validation(msg) => Self::validation(msg),
            LearningError::Store(e) => Self::internal(e.to_string()),
        }
    }
}

impl From<ContributionError> for AppError {
    fn from(err: ContributionError) -> Self {
        match err {
            ContributionError::InProgress => Self::conflict(err.to_string()),
            ContributionError::NotConfigured => {
                Self::unavailable("CONTRIBUTION_NOT_CONFIGURED", err.to_string())
            }
            ContributionError::NoEligibleWords
            | ContributionError::AlreadyInLexicon(_)
            | ContributionError::MarkerMissing => {
                Self::operational(StatusCode::UNPROCESSABLE_ENTITY, "CONTRIBUTION_REJECTED", err.to_string())
            }
            ContributionError::Vcs(_) => {
                Self::operational(StatusCode::BAD_GATEWAY, "CONTRIBUTION_FAILED", err.to_string())
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        Self::internal(err.to_string())
    }
}

pub fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> AppError {
    AppError {
        status,
        code: code.into(),
        message: message.into(),
        is_operational: true,
    }
}
