//! Balance top-ups through external payment methods
//!
//! A top-up is validated in full before the ledger is touched, then lands as
//! a single idempotent credit of `amount + bonus`.

use crate::cases::types::{AccountId, PaymentMethod};
use crate::errors::TopUpError;
use crate::ledger::{BalanceLedger, Transaction};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Parse a user-entered amount. Only positive whole numbers are accepted.
pub fn parse_amount(input: &str) -> Result<u64, TopUpError> {
    let trimmed = input.trim();
    let amount: u64 = trimmed
        .parse()
        .map_err(|_| TopUpError::InvalidAmount(format!("'{}' is not a positive integer", trimmed)))?;
    if amount == 0 {
        return Err(TopUpError::InvalidAmount("amount must be greater than zero".to_string()));
    }
    Ok(amount)
}

/// Accept a JSON number or numeric string holding a positive integer
pub fn amount_from_json(value: &Value) -> Result<u64, TopUpError> {
    match value {
        Value::Number(number) => match number.as_u64() {
            Some(0) => Err(TopUpError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            )),
            Some(amount) => Ok(amount),
            None => Err(TopUpError::InvalidAmount(format!(
                "{} is not a positive integer",
                number
            ))),
        },
        Value::String(text) => parse_amount(text),
        other => Err(TopUpError::InvalidAmount(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

/// `floor(amount * percent / 100)`
pub fn compute_bonus(amount: u64, bonus_percent: u32) -> u128 {
    u128::from(amount) * u128::from(bonus_percent) / 100
}

/// Credited top-up with its bonus breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUpReceipt {
    pub transaction: Transaction,
    pub paid: u64,
    pub bonus: u64,
    pub payment_method: String,
    /// The idempotency key had already been applied
    pub replayed: bool,
}

pub struct TopUpProcessor {
    ledger: Arc<BalanceLedger>,
    methods: Vec<PaymentMethod>,
}

impl TopUpProcessor {
    pub fn new(ledger: Arc<BalanceLedger>, methods: Vec<PaymentMethod>) -> Self {
        Self { ledger, methods }
    }

    pub fn payment_methods(&self) -> &[PaymentMethod] {
        &self.methods
    }

    pub fn payment_method(&self, id: &str) -> Option<&PaymentMethod> {
        self.methods.iter().find(|method| method.id == id)
    }

    /// Credit `amount` plus the method's bonus.
    ///
    /// Retrying with the same idempotency key returns the first transaction.
    pub fn top_up(
        &self,
        account_id: &AccountId,
        amount: u64,
        payment_method_id: &str,
        idempotency_key: &str,
    ) -> Result<Transaction, TopUpError> {
        self.top_up_with_receipt(account_id, amount, payment_method_id, idempotency_key)
            .map(|receipt| receipt.transaction)
    }

    pub fn top_up_with_receipt(
        &self,
        account_id: &AccountId,
        amount: u64,
        payment_method_id: &str,
        idempotency_key: &str,
    ) -> Result<TopUpReceipt, TopUpError> {
        if amount == 0 {
            return Err(TopUpError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        if idempotency_key.trim().is_empty() {
            return Err(TopUpError::InvalidIdempotencyKey);
        }
        let method = self
            .payment_method(payment_method_id)
            .ok_or_else(|| TopUpError::UnknownPaymentMethod(payment_method_id.to_string()))?;

        let credited = u64::try_from(u128::from(amount) + compute_bonus(amount, method.bonus_percent))
            .map_err(|_| {
                TopUpError::InvalidAmount(format!(
                    "{} with a {}% bonus exceeds the maximum balance",
                    amount, method.bonus_percent
                ))
            })?;

        let credit = self
            .ledger
            .credit_tracked(account_id, credited, Some(idempotency_key))?;

        if !credit.replayed {
            info!(
                %account_id,
                amount,
                bonus = credited - amount,
                method = %method.id,
                tx_id = %credit.transaction.id,
                "Top-up credited"
            );
        }

        Ok(TopUpReceipt {
            transaction: credit.transaction,
            paid: amount,
            bonus: credited - amount,
            payment_method: method.id.clone(),
            replayed: credit.replayed,
        })
    }
}
