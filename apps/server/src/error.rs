use std::io::Error as IoError;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use heartwatch_service::EngineError;
use heartwatch_service::config::Error as ConfigError;
use thiserror::Error;

/// Errors that stop the server from starting
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Engine startup failed: {0:#}")]
    Startup(#[from] anyhow::Error),
}

/// Errors returned from request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Engine(EngineError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::InvalidInput(_) | EngineError::UnknownMonitorType(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Engine(EngineError::JobExists(_)) => StatusCode::CONFLICT,
            ApiError::Engine(EngineError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            // Storage details stay in the log
            ApiError::Engine(EngineError::Persistence(cause)) => {
                tracing::error!("Request failed: {}", cause);
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": message }))
    }
}
