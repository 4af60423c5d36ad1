use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Store unreachable while connecting. Handled inside the connector,
    /// callers only ever observe it as unavailability.
    #[error("Connection error: {0}")]
    Connection(anyhow::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store query error: {0}")]
    StoreQuery(anyhow::Error),

    #[error("Store write error: {0}")]
    StoreWrite(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Connection(_) | AppError::ServiceUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StoreQuery(_)
            | AppError::StoreWrite(_)
            | AppError::InternalError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
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

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            AppError::Connection(err) => ErrorResponse {
                error: "Database connection not ready".to_string(),
                message: Some("Please try again later".to_string()),
                details: Some(err.to_string()),
            },
            AppError::ServiceUnavailable(reason) => ErrorResponse {
                error: reason,
                message: Some("Please try again later".to_string()),
                details: None,
            },
            AppError::Validation(reason) => ErrorResponse {
                error: "Invalid data format".to_string(),
                message: Some(reason),
                details: None,
            },
            AppError::StoreQuery(err) => ErrorResponse {
                error: "Failed to query database".to_string(),
                message: None,
                details: Some(err.to_string()),
            },
            AppError::StoreWrite(err) => ErrorResponse {
                error: "Failed to write to database".to_string(),
                message: None,
                details: Some(err.to_string()),
            },
            AppError::InternalError(err) => ErrorResponse {
                error: "Internal server error".to_string(),
                message: None,
                details: Some(format!("{:#}", err)),
            },
            AppError::ConfigError(err) => ErrorResponse {
                error: "Configuration error".to_string(),
                message: None,
                details: Some(err.to_string()),
            },
        };

        (status, Json(body)).into_response()
    }
}
