use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize)]
pub enum AppError {
    RateLimited { retry_after_seconds: i64 },
    ValidationRejected(String),
    GeneratorError(String),
    ExecutionError(String),
    ConfigError(String),
    NotificationError(String),
    Internal(String),
}

impl AppError {
    /// HTTP status the transport answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::RateLimited { .. } => 429,
            AppError::ValidationRejected(_) => 400,
            AppError::GeneratorError(_) => 502,
            AppError::NotificationError(_) => 502,
            AppError::ExecutionError(_) | AppError::ConfigError(_) | AppError::Internal(_) => 500,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::RateLimited {
                retry_after_seconds,
            } => write!(f, "Rate limited: retry after {}s", retry_after_seconds),
            AppError::ValidationRejected(msg) => write!(f, "Validation rejected: {}", msg),
            AppError::GeneratorError(msg) => write!(f, "Generator error: {}", msg),
            AppError::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            AppError::NotificationError(msg) => write!(f, "Notification error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::ExecutionError(err.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
