//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.
//! Domain errors keep their own codes so clients can branch on them.

use crate::errors::{LedgerError, SpinError, TopUpError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::error;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (INSUFFICIENT_FUNDS, UNKNOWN_CASE, BAD_REQUEST, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    InternalError(String),
    InsufficientFunds { balance: u64, price: u64 },
    SpinAlreadyInProgress,
    UnknownCase(u32),
    InvalidAmount(String),
    UnknownPaymentMethod(String),
    InvalidIdempotencyKey,
}

impl ApiError {
    pub fn new(request_id: String, kind: ApiErrorKind) -> Self {
        Self { kind, request_id }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self::new(request_id, ApiErrorKind::NotFound(message))
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self::new(request_id, ApiErrorKind::BadRequest(message))
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self::new(request_id, ApiErrorKind::InternalError(message))
    }

    pub fn from_spin(request_id: String, err: SpinError) -> Self {
        let kind = match err {
            SpinError::InsufficientFunds { balance, price } => {
                ApiErrorKind::InsufficientFunds { balance, price }
            }
            SpinError::SpinAlreadyInProgress => ApiErrorKind::SpinAlreadyInProgress,
            SpinError::UnknownCase(case_id) => ApiErrorKind::UnknownCase(case_id.0),
            SpinError::NoCaseSelected => ApiErrorKind::BadRequest(err.to_string()),
            SpinError::Ledger(ledger_error) => return Self::from_ledger(request_id, ledger_error),
        };
        Self::new(request_id, kind)
    }

    pub fn from_top_up(request_id: String, err: TopUpError) -> Self {
        let kind = match err {
            TopUpError::InvalidAmount(message) => ApiErrorKind::InvalidAmount(message),
            TopUpError::UnknownPaymentMethod(method) => ApiErrorKind::UnknownPaymentMethod(method),
            TopUpError::InvalidIdempotencyKey => ApiErrorKind::InvalidIdempotencyKey,
            TopUpError::Ledger(ledger_error) => return Self::from_ledger(request_id, ledger_error),
        };
        Self::new(request_id, kind)
    }

    fn from_ledger(request_id: String, err: LedgerError) -> Self {
        let kind = match err {
            LedgerError::InsufficientFunds { balance, requested } => ApiErrorKind::InsufficientFunds {
                balance,
                price: requested,
            },
            LedgerError::ZeroAmount | LedgerError::BalanceOverflow { .. } => {
                ApiErrorKind::InvalidAmount(err.to_string())
            }
            LedgerError::Storage(message) => {
                error!(request_id = %request_id, "Ledger storage failure: {}", message);
                ApiErrorKind::InternalError("Ledger unavailable".to_string())
            }
        };
        Self::new(request_id, kind)
    }

    /// Stable error code sent to clients
    pub fn code(&self) -> &'static str {
        match &self.kind {
            ApiErrorKind::NotFound(_) => "NOT_FOUND",
            ApiErrorKind::BadRequest(_) => "BAD_REQUEST",
            ApiErrorKind::InternalError(_) => "INTERNAL_ERROR",
            ApiErrorKind::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            ApiErrorKind::SpinAlreadyInProgress => "SPIN_ALREADY_IN_PROGRESS",
            ApiErrorKind::UnknownCase(_) => "UNKNOWN_CASE",
            ApiErrorKind::InvalidAmount(_) => "INVALID_AMOUNT",
            ApiErrorKind::UnknownPaymentMethod(_) => "UNKNOWN_PAYMENT_METHOD",
            ApiErrorKind::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::NotFound(_) | ApiErrorKind::UnknownCase(_) => StatusCode::NOT_FOUND,
            ApiErrorKind::BadRequest(_)
            | ApiErrorKind::InvalidAmount(_)
            | ApiErrorKind::UnknownPaymentMethod(_)
            | ApiErrorKind::InvalidIdempotencyKey => StatusCode::BAD_REQUEST,
            ApiErrorKind::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorKind::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            ApiErrorKind::SpinAlreadyInProgress => StatusCode::CONFLICT,
        }
    }

    fn message(&self) -> String {
        match &self.kind {
            ApiErrorKind::NotFound(msg)
            | ApiErrorKind::BadRequest(msg)
            | ApiErrorKind::InternalError(msg) => msg.clone(),
            ApiErrorKind::InsufficientFunds { balance, price } => {
                format!("Balance {} does not cover case price {}", balance, price)
            }
            ApiErrorKind::SpinAlreadyInProgress => "A spin is already in progress".to_string(),
            ApiErrorKind::UnknownCase(case_id) => format!("Case {} does not exist", case_id),
            ApiErrorKind::InvalidAmount(msg) => msg.clone(),
            ApiErrorKind::UnknownPaymentMethod(method) => {
                format!("Payment method '{}' is not supported", method)
            }
            ApiErrorKind::InvalidIdempotencyKey => "idempotency_key must not be empty".to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match &self.kind {
            ApiErrorKind::InsufficientFunds { balance, price } => {
                Some(json!({ "balance": balance, "price": price }))
            }
            ApiErrorKind::UnknownCase(case_id) => Some(json!({ "case_id": case_id })),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.request_id, self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.message(),
                details: self.details(),
            },
        });

        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::types::CaseId;

    #[test]
    fn test_spin_errors_map_to_codes() {
        let cases = [
            (
                SpinError::InsufficientFunds { balance: 50, price: 100 },
                "INSUFFICIENT_FUNDS",
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                SpinError::SpinAlreadyInProgress,
                "SPIN_ALREADY_IN_PROGRESS",
                StatusCode::CONFLICT,
            ),
            (SpinError::UnknownCase(CaseId(9)), "UNKNOWN_CASE", StatusCode::NOT_FOUND),
            (
                SpinError::Ledger(LedgerError::Storage("disk".to_string())),
                "INTERNAL_ERROR",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, code, status) in cases {
            let api_error = ApiError::from_spin("req-1".to_string(), err);
            assert_eq!(api_error.code(), code);
            assert_eq!(api_error.status(), status);
        }
    }

    #[test]
    fn test_top_up_errors_map_to_codes() {
        let err = ApiError::from_top_up("req-2".to_string(), TopUpError::InvalidAmount("-5".to_string()));
        assert_eq!(err.code(), "INVALID_AMOUNT");

        let err = ApiError::from_top_up(
            "req-3".to_string(),
            TopUpError::UnknownPaymentMethod("paypal".to_string()),
        );
        assert_eq!(err.code(), "UNKNOWN_PAYMENT_METHOD");
        assert!(err.to_string().contains("paypal"));
    }

    #[test]
    fn test_insufficient_funds_details() {
        let err = ApiError::from_spin(
            "req-4".to_string(),
            SpinError::InsufficientFunds { balance: 50, price: 100 },
        );
        assert_eq!(err.details(), Some(json!({ "balance": 50, "price": 100 })));
    }
}
