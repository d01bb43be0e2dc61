//! Error taxonomy and the `{code, message}` response envelope.
//!
//! Every handler returns `Result<_, AppError>`; nothing escapes the handler
//! boundary in any other shape. Persistence failures arrive as
//! `RepositoryError` and are folded in through `From`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::RepositoryError;

/// ApiErrorBody
///
/// The fixed error envelope. `code` always repeats the HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ApiErrorBody {
    #[schema(example = 403)]
    pub code: u16,
    #[schema(example = "only users with role Administrator can create categories")]
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or unresolvable credential.
    #[error("{0}")]
    Authentication(String),
    /// Valid identity lacking the role or ownership the action needs.
    #[error("{0}")]
    Forbidden(String),
    /// Malformed body, non-numeric id or a failed field check.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Storage(String),
    /// Anything else that is the server's fault, e.g. a misconfigured base URL.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Storage(detail) => {
                // Details stay in the logs.
                tracing::error!(error = %detail, "storage failure");
                "could not complete the request".to_string()
            }
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                "could not complete the request".to_string()
            }
            other => other.to_string(),
        };
        let body = ApiErrorBody {
            code: status.as_u16(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => AppError::NotFound("record not found".to_string()),
            // Only identity creation expects a conflict and recovers from it.
            RepositoryError::Conflict(detail) | RepositoryError::Unexpected(detail) => {
                AppError::Storage(detail)
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("invalid body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(format!("invalid path: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(format!("invalid query: {}", rejection.body_text()))
    }
}

/// Parses a path id, mapping anything non-numeric to a validation error.
pub fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse::<i64>()
        .map_err(|e| AppError::Validation(format!("invalid id: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(AppError::Authentication("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Storage("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn repository_errors_fold_into_the_taxonomy() {
        let not_found: AppError = RepositoryError::NotFound.into();
        assert!(matches!(not_found, AppError::NotFound(_)));

        let unexpected: AppError = RepositoryError::Unexpected("pool closed".into()).into();
        assert!(matches!(unexpected, AppError::Storage(_)));

        let conflict: AppError = RepositoryError::Conflict("users_google_sub_key".into()).into();
        assert_eq!(conflict.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn non_numeric_ids_are_validation_errors() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id("abc"), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn envelope_repeats_the_status_code() {
        let response = AppError::NotFound("category not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ApiErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            ApiErrorBody {
                code: 404,
                message: "category not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn storage_details_are_not_leaked() {
        let response = AppError::Storage("password authentication failed".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ApiErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, 500);
        assert!(!body.message.contains("password"));
    }
}
