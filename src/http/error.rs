//! Structured error responses.
//!
//! Every failure is rendered as
//! `{ "error": <kind>, "message": <text>, "retry": <hint>, "transactionHash"?: <hash> }`.

use alloy::primitives::TxHash;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::contract::ContractError;
use crate::error::{ErrorKind, RetryHint};
use crate::merkle::WhitelistError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
    pub retry: RetryHint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<TxHash>,
}

#[derive(Debug)]
pub struct ApiError {
    body: ErrorBody,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            body: ErrorBody {
                error: kind,
                message: message.into(),
                retry: RetryHint::None,
                transaction_hash: None,
            },
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Input, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.body.error
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.body.error)
    }
}

/// HTTP status for an error kind. A pending transaction is accepted work,
/// not a failure.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StateConflict => StatusCode::CONFLICT,
        ErrorKind::Network => StatusCode::BAD_GATEWAY,
        ErrorKind::Pending => StatusCode::ACCEPTED,
        ErrorKind::Signing => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Consistency | ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<WhitelistError> for ApiError {
    fn from(e: WhitelistError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<ContractError> for ApiError {
    fn from(e: ContractError) -> Self {
        Self {
            body: ErrorBody {
                error: e.kind(),
                message: e.to_string(),
                retry: e.retry_hint(),
                transaction_hash: e.transaction_hash(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.body.error {
            ErrorKind::Consistency | ErrorKind::Storage => {
                tracing::error!(kind = %self.body.error, message = %self.body.message, "Request failed")
            }
            _ => tracing::debug!(kind = %self.body.error, message = %self.body.message, "Request rejected"),
        }
        (status, Json(self.body)).into_response()
    }
}
