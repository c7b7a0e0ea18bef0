//! lootcase - case opening reward service
//!
//! Users spend balance to open a case and receive one item drawn by weight.
//! Balances live in an append-only ledger; top-ups add a payment method bonus
//! and are applied exactly once per idempotency key.

pub mod api;
pub mod cases;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod metrics;
pub mod service;
pub mod topup;

pub use cases::{
    AccountId, Case, CaseCatalog, CaseId, DrawEngine, Item, ItemId, PaymentMethod, RandomSource,
    Rarity, SpinResult, SpinSession,
};
pub use config::{ConfigLoader, LootConfig};
pub use errors::{LootError, LootResult};
pub use ledger::{BalanceLedger, Transaction, TransactionKind};
pub use service::CaseService;
pub use topup::TopUpProcessor;
