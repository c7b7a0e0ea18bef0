//! Request and response bodies

use crate::cases::types::{AccountId, PaymentMethod, VRFBundle};
use crate::ledger::Transaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub random_source: String,
    pub cases: usize,
    pub accounts: usize,
}

/// POST /spin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinRequest {
    pub account_id: String,
    pub case_id: u32,
}

/// POST /topup
///
/// `amount` stays raw JSON so non-numeric input is reported as
/// `INVALID_AMOUNT` instead of a generic body rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUpRequest {
    pub account_id: String,
    pub amount: serde_json::Value,
    pub payment_method_id: String,
    #[serde(default)]
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodsResponse {
    pub payment_methods: Vec<PaymentMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub account_id: AccountId,
    pub balance: u64,
    pub consistent: bool,
    pub transactions: Vec<Transaction>,
}

/// POST /fairness/verify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessVerifyRequest {
    pub bundle: VRFBundle,
    /// Input the bundle must have been signed over, e.g. `spin_id:case_id:account_id`
    #[serde(default)]
    pub expected_input: Option<String>,
    /// Case total weight, to reproduce the roll
    #[serde(default)]
    pub total_weight: Option<u64>,
}
