use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::types::SettlementStatus;

/// Top-level error type for the settlement pipeline.
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("no scores available for league")]
    NoScoresAvailable,

    #[error("invalid payout address: {0}")]
    InvalidPayoutAddress(String),

    #[error("league already settled")]
    AlreadySettled,

    #[error("gateway submission failed: {0}")]
    GatewaySubmissionFailed(String),

    #[error("confirmation not observed within {0} seconds")]
    ConfirmationTimeout(u64),

    #[error("ledger rejected transaction: {0}")]
    LedgerRejected(String),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: SettlementStatus,
        to: SettlementStatus,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("submitting credentials not configured")]
    CredentialsMissing,

    #[error("ledger rpc error: {0}")]
    Rpc(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SettlementError>;

impl From<reqwest::Error> for SettlementError {
    fn from(e: reqwest::Error) -> Self {
        SettlementError::Rpc(e.to_string())
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(e: serde_json::Error) -> Self {
        SettlementError::Internal(format!("json: {e}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for SettlementError {
    fn into_response(self) -> Response {
        let status = match &self {
            SettlementError::NotFound(_) => StatusCode::NOT_FOUND,
            SettlementError::AlreadySettled => StatusCode::CONFLICT,
            SettlementError::NoScoresAvailable
            | SettlementError::InvalidPayoutAddress(_)
            | SettlementError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SettlementError::GatewaySubmissionFailed(_)
            | SettlementError::LedgerRejected(_)
            | SettlementError::ConfirmationTimeout(_)
            | SettlementError::Rpc(_) => StatusCode::BAD_GATEWAY,
            SettlementError::CredentialsMissing
            | SettlementError::Config(_)
            | SettlementError::Database(_)
            | SettlementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
