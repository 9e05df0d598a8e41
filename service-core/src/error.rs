use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Generic 401 that never says why the caller was rejected.
    pub fn unauthorized() -> Self {
        AppError::Unauthorized(anyhow::anyhow!("Unauthorized"))
    }

    /// Generic 403 that never names the required role or membership.
    pub fn forbidden() -> Self {
        AppError::Forbidden(anyhow::anyhow!("Forbidden"))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error_message, details) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None),
            AppError::Forbidden(err) => (StatusCode::FORBIDDEN, err.to_string(), None),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string(), None),
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::BadGateway(msg) => {
                tracing::error!(error = %msg, "Upstream error");
                (StatusCode::BAD_GATEWAY, "Bad Gateway".to_string(), None)
            }
            AppError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
                None,
            ),
            AppError::DatabaseError(err) => {
                tracing::error!(error = ?err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::RedisError(err) => {
                tracing::error!(error = %err, "Cache error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = ?err, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_string(res: Response) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let res = AppError::DatabaseError(anyhow::anyhow!("connection refused to 10.0.0.5"))
            .into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_string(res).await;
        assert!(body.contains("Internal server error"));
        assert!(!body.contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn unauthorized_is_generic() {
        let res = AppError::unauthorized().into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(res).await, r#"{"error":"Unauthorized"}"#);
    }

    #[tokio::test]
    async fn conflict_keeps_safe_message() {
        let res = AppError::Conflict(anyhow::anyhow!("invite expired or used")).into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert!(body_string(res).await.contains("invite expired or used"));
    }
}
