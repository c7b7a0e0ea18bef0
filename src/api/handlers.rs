//! Request Handlers
//!
//! Thin adapters from HTTP to [`CaseService`]. Mutating calls run on the
//! blocking pool since a ledger append may fsync.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::cases::types::{AccountId, Case, CaseId, SpinResult};
use crate::cases::session::SessionSnapshot;
use crate::ledger::Transaction;
use crate::service::{CaseService, FairnessVerification};
use crate::topup::amount_from_json;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use tracing::debug;

/// Shared application state
pub struct AppState {
    pub service: Arc<CaseService>,
    pub version: String,
}

impl AppState {
    pub fn new(service: Arc<CaseService>) -> Self {
        Self {
            service,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn account_from_path(request_id: &RequestId, raw: String) -> Result<AccountId, ApiError> {
    if raw.trim().is_empty() {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "account_id must not be empty".to_string(),
        ));
    }
    Ok(AccountId::new(raw))
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
        random_source: state.service.random_source().to_string(),
        cases: state.service.catalog().len(),
        accounts: state.service.account_count(),
    })
}

/// GET /catalog
pub async fn catalog_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Case>> {
    Json(state.service.catalog().cases().to_vec())
}

/// GET /payment-methods
pub async fn payment_methods_handler(
    State(state): State<Arc<AppState>>,
) -> Json<PaymentMethodsResponse> {
    Json(PaymentMethodsResponse {
        payment_methods: state.service.payment_methods().to_vec(),
    })
}

/// POST /spin
pub async fn spin_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpinRequest>,
) -> Result<Json<SpinResult>, ApiError> {
    let account_id = account_from_path(&request_id, request.account_id)?;
    let case_id = CaseId(request.case_id);
    debug!(request_id = %request_id.0, %account_id, %case_id, "Spin requested");

    let service = state.service.clone();
    let outcome = tokio::task::spawn_blocking(move || service.spin(&account_id, case_id))
        .await
        .map_err(|e| ApiError::internal_error(request_id.0.clone(), format!("Spin task failed: {}", e)))?;

    outcome
        .map(Json)
        .map_err(|e| ApiError::from_spin(request_id.0, e))
}

/// POST /topup
pub async fn top_up_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<TopUpRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let account_id = account_from_path(&request_id, request.account_id)?;
    let amount = amount_from_json(&request.amount)
        .map_err(|e| ApiError::from_top_up(request_id.0.clone(), e))?;

    let service = state.service.clone();
    let method = request.payment_method_id;
    let key = request.idempotency_key;
    let outcome = tokio::task::spawn_blocking(move || service.top_up(&account_id, amount, &method, &key))
        .await
        .map_err(|e| {
            ApiError::internal_error(request_id.0.clone(), format!("Top-up task failed: {}", e))
        })?;

    outcome
        .map(|receipt| Json(receipt.transaction))
        .map_err(|e| ApiError::from_top_up(request_id.0, e))
}

/// GET /balance/:account_id
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account_id = account_from_path(&request_id, account_id)?;
    let balance = state.service.balance(&account_id);
    Ok(Json(BalanceResponse { account_id, balance }))
}

/// GET /transactions/:account_id
pub async fn transactions_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let account_id = account_from_path(&request_id, account_id)?;
    let audit = state.service.audit(&account_id);
    let transactions = state.service.history(&account_id);

    Ok(Json(TransactionsResponse {
        account_id,
        balance: audit.balance,
        consistent: audit.consistent,
        transactions,
    }))
}

/// GET /session/:account_id
pub async fn session_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let account_id = account_from_path(&request_id, account_id)?;
    Ok(Json(state.service.session_snapshot(&account_id)))
}

/// POST /fairness/verify
pub async fn verify_fairness_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<FairnessVerifyRequest>,
) -> Result<Json<FairnessVerification>, ApiError> {
    state
        .service
        .verify_fairness(
            &request.bundle,
            request.expected_input.as_deref(),
            request.total_weight,
        )
        .map(Json)
        .map_err(|message| ApiError::bad_request(request_id.0, message))
}

/// GET /metrics
pub async fn metrics_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .service
        .render_metrics()
        .map_err(|e| ApiError::internal_error(request_id.0, e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}
