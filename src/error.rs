use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::models::PoolBalance;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,
}

/// Identity registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("External account id {0} is already in use")]
    DuplicateIdentity(String),

    #[error("No external account id registered for user {0}")]
    NotFound(String),

    #[error("User {0} already has an external account id")]
    AlreadyRegistered(String),

    #[error("Invalid external account id: expected 32 alphanumeric characters")]
    InvalidId,

    #[error("Failed to persist registry: {0}")]
    Persistence(String),
}

/// Ledger service errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("'id_wallet' not found in the response data")]
    WalletNotFound,

    #[error("API responded with status code: {status}. Response: {body}")]
    Remote { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response body: {0}")]
    Decode(String),
}

/// Batch file errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("The CSV file is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Malformed CSV file: {0}")]
    Malformed(String),
}

/// Errors that abort a distribution run before any transfer
#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("No external account ids have been registered yet")]
    EmptyRegistry,

    #[error("Failed to check pool wallet balance: {0}")]
    PoolBalance(#[source] LedgerError),

    #[error("Insufficient balance in the pool wallet for one or more resources: {0}")]
    InsufficientPoolBalance(PoolBalance),
}

/// Interactive submission errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("No submission in progress")]
    NoSession,

    #[error("Too many attempts, retry in {remaining_secs}s")]
    Cooldown { remaining_secs: i64 },
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, error_code, details) = match &self {
            AppError::Registry(RegistryError::DuplicateIdentity(_)) => {
                (StatusCode::CONFLICT, "DUPLICATE_IDENTITY", None)
            }
            AppError::Registry(RegistryError::AlreadyRegistered(_)) => {
                (StatusCode::CONFLICT, "ALREADY_REGISTERED", None)
            }
            AppError::Registry(RegistryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "IDENTITY_NOT_FOUND", None)
            }
            AppError::Registry(RegistryError::InvalidId) => {
                (StatusCode::BAD_REQUEST, "INVALID_IDENTITY", None)
            }
            AppError::Registry(RegistryError::Persistence(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR", None)
            }
            AppError::Ledger(LedgerError::Remote { status, .. }) => (
                StatusCode::BAD_GATEWAY,
                "LEDGER_REMOTE_ERROR",
                Some(serde_json::json!({ "status": status })),
            ),
            AppError::Ledger(_) => (StatusCode::BAD_GATEWAY, "LEDGER_ERROR", None),
            AppError::Batch(BatchError::MissingColumns(columns)) => (
                StatusCode::BAD_REQUEST,
                "MISSING_COLUMNS",
                Some(serde_json::json!({ "missing_columns": columns })),
            ),
            AppError::Batch(BatchError::Malformed(_)) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_BATCH", None)
            }
            AppError::Distribution(DistributionError::EmptyRegistry) => {
                (StatusCode::CONFLICT, "EMPTY_REGISTRY", None)
            }
            AppError::Distribution(DistributionError::PoolBalance(_)) => {
                (StatusCode::BAD_GATEWAY, "POOL_BALANCE_UNAVAILABLE", None)
            }
            AppError::Distribution(DistributionError::InsufficientPoolBalance(balance)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "INSUFFICIENT_POOL_BALANCE",
                Some(serde_json::json!({ "pool": balance })),
            ),
            AppError::Session(SessionError::NoSession) => {
                (StatusCode::CONFLICT, "NO_SESSION", None)
            }
            AppError::Session(SessionError::Cooldown { remaining_secs }) => (
                StatusCode::TOO_MANY_REQUESTS,
                "COOLDOWN",
                Some(serde_json::json!({ "retry_after_secs": remaining_secs })),
            ),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", None),
            AppError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None)
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(error: reqwest::Error) -> Self {
        LedgerError::Transport(error.to_string())
    }
}

impl From<csv::Error> for BatchError {
    fn from(error: csv::Error) -> Self {
        BatchError::Malformed(error.to_string())
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(error: std::io::Error) -> Self {
        RegistryError::Persistence(error.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(error: serde_json::Error) -> Self {
        RegistryError::Persistence(format!("Invalid registry file: {}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
