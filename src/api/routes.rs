//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/catalog", get(catalog_handler))
        .route("/payment-methods", get(payment_methods_handler))
        .route("/spin", post(spin_handler))
        .route("/topup", post(top_up_handler))
        .route("/balance/:account_id", get(balance_handler))
        .route("/transactions/:account_id", get(transactions_handler))
        .route("/session/:account_id", get(session_handler))
        .route("/fairness/verify", post(verify_fairness_handler))
        // Prometheus scrape target
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
