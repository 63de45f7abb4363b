use crate::auth::AuthError;
use crate::hierarchy::DeletionError;
use crate::storage::StorageError;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Error type for HTTP handlers. Renders as `{"error": ..., "code": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Deletion(#[from] DeletionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

fn internal(err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        other => internal(other),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut extra = serde_json::Map::new();
        let (status, code, message) = match &self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            ApiError::Store(err) => classify_store_error(err),
            ApiError::Deletion(err) => match err {
                DeletionError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                DeletionError::ModeRequired { subfolders, notes } => {
                    extra.insert("subfolders".into(), json!(subfolders));
                    extra.insert("notes".into(), json!(notes));
                    (
                        StatusCode::CONFLICT,
                        "DELETE_MODE_REQUIRED",
                        err.to_string(),
                    )
                }
                DeletionError::Step { .. } => internal(err),
            },
            ApiError::Auth(err) => match err {
                AuthError::InvalidCredentials(_)
                | AuthError::InvalidToken
                | AuthError::NotSignedIn => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", err.to_string())
                }
                AuthError::Provider { .. } | AuthError::Request(_) => {
                    tracing::error!(error = %err, "Auth service error");
                    (
                        StatusCode::BAD_GATEWAY,
                        "AUTH_UNAVAILABLE",
                        "The auth service is unavailable".to_string(),
                    )
                }
            },
            ApiError::Storage(err) => match err {
                StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                StorageError::InvalidPath(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string()),
                StorageError::Empty(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                StorageError::Io(_) => internal(err),
            },
        };

        let mut body = serde_json::Map::new();
        body.insert("error".into(), json!(message));
        body.insert("code".into(), json!(code));
        body.extend(extra);

        (status, Json(serde_json::Value::Object(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = render(StoreError::not_found("folder", "f9").into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["error"], "folder with id f9 not found");
    }

    #[tokio::test]
    async fn test_mode_required_carries_counts() {
        let err = DeletionError::ModeRequired {
            subfolders: 2,
            notes: 5,
        };
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "DELETE_MODE_REQUIRED");
        assert_eq!(body["subfolders"], 2);
        assert_eq!(body["notes"], 5);
    }

    #[tokio::test]
    async fn test_internal_errors_are_sanitized() {
        let (status, body) = render(StoreError::Backend("password=secret".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "An internal error occurred");
    }
}
