//! Balance ledger
//!
//! Every balance change is an appended [`Transaction`]; the balance is the
//! running sum of an account's history. Mutations for one account run under
//! that account's mutex (check, durable append, apply), so they never
//! interleave. Different accounts never share a lock.

pub mod store;

use crate::cases::types::AccountId;
use crate::errors::{LedgerError, StoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use store::{MemoryStore, TransactionStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Debit,
    Credit,
}

/// Immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: AccountId,
    /// Position in the account's history, starting at 0
    pub sequence: u64,
    pub kind: TransactionKind,
    pub amount: u64,
    pub balance_after: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Spin this debit paid for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spin_id: Option<Uuid>,
}

/// Applied credit, or the original one when its idempotency key was seen before
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub transaction: Transaction,
    pub replayed: bool,
}

/// Result of recomputing an account from its history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerAudit {
    pub account_id: AccountId,
    pub balance: u64,
    pub total_credits: u64,
    pub total_debits: u64,
    pub transaction_count: usize,
    pub consistent: bool,
}

#[derive(Default)]
struct AccountBook {
    balance: u64,
    next_sequence: u64,
    history: Vec<Transaction>,
    /// idempotency key -> index into `history`
    idempotency: HashMap<String, usize>,
}

impl AccountBook {
    fn apply(&mut self, tx: Transaction) {
        self.balance = tx.balance_after;
        self.next_sequence = tx.sequence + 1;
        if let Some(key) = &tx.idempotency_key {
            self.idempotency.insert(key.clone(), self.history.len());
        }
        self.history.push(tx);
    }

    /// Check that `tx` is the next entry this book expects during replay
    fn follows(&self, tx: &Transaction) -> bool {
        let expected_balance = match tx.kind {
            TransactionKind::Credit => self.balance.checked_add(tx.amount),
            TransactionKind::Debit => self.balance.checked_sub(tx.amount),
        };
        tx.amount > 0
            && tx.sequence == self.next_sequence
            && expected_balance == Some(tx.balance_after)
    }
}

fn lock_book(book: &Mutex<AccountBook>) -> MutexGuard<'_, AccountBook> {
    // Books are only mutated after a successful append, so a panic elsewhere
    // cannot leave one half-applied.
    match book.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct BalanceLedger {
    books: DashMap<AccountId, Arc<Mutex<AccountBook>>>,
    store: Arc<dyn TransactionStore>,
}

impl BalanceLedger {
    /// In-memory ledger
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Empty ledger writing to `store`. Use [`BalanceLedger::recover`] for a
    /// store that already holds history.
    pub fn with_store(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            books: DashMap::new(),
            store,
        }
    }

    /// Rebuild balances by replaying every transaction in `store`
    pub fn recover(store: Arc<dyn TransactionStore>) -> Result<Self, StoreError> {
        let ledger = Self::with_store(store.clone());
        let transactions = store.load_all()?;
        let count = transactions.len();

        for (index, tx) in transactions.into_iter().enumerate() {
            let book = ledger.book(&tx.account_id);
            let mut book = lock_book(&book);
            if !book.follows(&tx) {
                return Err(StoreError::Corrupted {
                    line: index + 1,
                    reason: format!(
                        "transaction {} (sequence {}) does not follow account {} history",
                        tx.id, tx.sequence, tx.account_id
                    ),
                });
            }
            book.apply(tx);
        }

        info!(
            transactions = count,
            accounts = ledger.books.len(),
            "Ledger recovered from transaction log"
        );
        Ok(ledger)
    }

    fn book(&self, account_id: &AccountId) -> Arc<Mutex<AccountBook>> {
        // Clone the Arc so the map shard is released before locking the book
        self.books.entry(account_id.clone()).or_default().clone()
    }

    fn existing_book(&self, account_id: &AccountId) -> Option<Arc<Mutex<AccountBook>>> {
        self.books.get(account_id).map(|book| book.clone())
    }

    /// Remove a book that never recorded a transaction, unless another
    /// caller still holds it
    fn discard_empty_book(&self, account_id: &AccountId, handle: &Arc<Mutex<AccountBook>>) {
        self.books.remove_if(account_id, |_, book| {
            Arc::ptr_eq(book, handle)
                && Arc::strong_count(book) == 2
                && lock_book(book).history.is_empty()
        });
    }

    /// Withdraw `amount` if the balance covers it; otherwise change nothing
    pub fn debit(
        &self,
        account_id: &AccountId,
        amount: u64,
        spin_id: Option<Uuid>,
    ) -> Result<Transaction, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let Some(book) = self.existing_book(account_id) else {
            debug!(%account_id, amount, "Debit refused for account with no history");
            return Err(LedgerError::InsufficientFunds {
                balance: 0,
                requested: amount,
            });
        };
        let mut book = lock_book(&book);

        if book.balance < amount {
            debug!(%account_id, amount, balance = book.balance, "Debit refused: insufficient funds");
            return Err(LedgerError::InsufficientFunds {
                balance: book.balance,
                requested: amount,
            });
        }

        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id: account_id.clone(),
            sequence: book.next_sequence,
            kind: TransactionKind::Debit,
            amount,
            balance_after: book.balance - amount,
            timestamp: Utc::now(),
            idempotency_key: None,
            spin_id,
        };

        self.store.append(&tx).map_err(|e| {
            warn!(%account_id, amount, "Debit not applied, log append failed: {}", e);
            LedgerError::from(e)
        })?;
        book.apply(tx.clone());

        info!(%account_id, amount, balance = tx.balance_after, tx_id = %tx.id, "Debit applied");
        Ok(tx)
    }

    /// Deposit `amount`. A repeated `idempotency_key` returns the original
    /// transaction and changes nothing.
    pub fn credit(
        &self,
        account_id: &AccountId,
        amount: u64,
        idempotency_key: Option<&str>,
    ) -> Result<Transaction, LedgerError> {
        self.credit_tracked(account_id, amount, idempotency_key)
            .map(|credit| credit.transaction)
    }

    /// Like [`BalanceLedger::credit`], also reporting whether the key was a replay
    pub fn credit_tracked(
        &self,
        account_id: &AccountId,
        amount: u64,
        idempotency_key: Option<&str>,
    ) -> Result<Credit, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let handle = self.book(account_id);
        let mut book = lock_book(&handle);

        if let Some(key) = idempotency_key {
            if let Some(&index) = book.idempotency.get(key) {
                let original = book.history[index].clone();
                if original.amount != amount {
                    warn!(
                        %account_id,
                        key,
                        original_amount = original.amount,
                        retried_amount = amount,
                        "Idempotency key reused with a different amount; returning original credit"
                    );
                }
                debug!(%account_id, key, tx_id = %original.id, "Duplicate credit ignored");
                return Ok(Credit {
                    transaction: original,
                    replayed: true,
                });
            }
        }

        let balance_after = book
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow {
                balance: book.balance,
                amount,
            })?;

        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id: account_id.clone(),
            sequence: book.next_sequence,
            kind: TransactionKind::Credit,
            amount,
            balance_after,
            timestamp: Utc::now(),
            idempotency_key: idempotency_key.map(str::to_string),
            spin_id: None,
        };

        if let Err(e) = self.store.append(&tx) {
            warn!(%account_id, amount, "Credit not applied, log append failed: {}", e);
            let created_here = book.history.is_empty();
            drop(book);
            if created_here {
                self.discard_empty_book(account_id, &handle);
            }
            return Err(e.into());
        }
        book.apply(tx.clone());

        info!(%account_id, amount, balance = tx.balance_after, tx_id = %tx.id, "Credit applied");
        Ok(Credit {
            transaction: tx,
            replayed: false,
        })
    }

    /// Current balance; accounts without history read as zero
    pub fn balance(&self, account_id: &AccountId) -> u64 {
        self.existing_book(account_id)
            .map(|book| lock_book(&book).balance)
            .unwrap_or(0)
    }

    /// Account history, oldest first
    pub fn history(&self, account_id: &AccountId) -> Vec<Transaction> {
        self.existing_book(account_id)
            .map(|book| lock_book(&book).history.clone())
            .unwrap_or_default()
    }

    /// Recompute the account from its history and compare with the cached balance
    pub fn audit(&self, account_id: &AccountId) -> LedgerAudit {
        let (balance, history) = self
            .existing_book(account_id)
            .map(|book| {
                let book = lock_book(&book);
                (book.balance, book.history.clone())
            })
            .unwrap_or_default();

        let mut running: u64 = 0;
        let mut total_credits: u64 = 0;
        let mut total_debits: u64 = 0;
        let mut consistent = true;

        for (expected_sequence, tx) in history.iter().enumerate() {
            let next = match tx.kind {
                TransactionKind::Credit => {
                    total_credits = total_credits.saturating_add(tx.amount);
                    running.checked_add(tx.amount)
                }
                TransactionKind::Debit => {
                    total_debits = total_debits.saturating_add(tx.amount);
                    running.checked_sub(tx.amount)
                }
            };
            match next {
                Some(value) if value == tx.balance_after && tx.sequence == expected_sequence as u64 => {
                    running = value;
                }
                _ => {
                    consistent = false;
                    break;
                }
            }
        }

        LedgerAudit {
            account_id: account_id.clone(),
            balance,
            total_credits,
            total_debits,
            transaction_count: history.len(),
            consistent: consistent && running == balance,
        }
    }

    pub fn account_count(&self) -> usize {
        self.books.len()
    }
}

impl Default for BalanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::thread;

    struct FailingStore;

    impl TransactionStore for FailingStore {
        fn append(&self, _tx: &Transaction) -> Result<(), StoreError> {
            Err(StoreError::WriteFailed("disk full".to_string()))
        }

        fn load_all(&self) -> Result<Vec<Transaction>, StoreError> {
            Ok(vec![])
        }
    }

    fn account(id: &str) -> AccountId {
        AccountId::new(id)
    }

    #[test]
    fn test_credit_then_debit() {
        let ledger = BalanceLedger::new();
        let alice = account("alice");

        let credit = ledger.credit(&alice, 250, None).unwrap();
        assert_eq!(credit.balance_after, 250);
        assert_eq!(credit.sequence, 0);

        let debit = ledger.debit(&alice, 100, None).unwrap();
        assert_eq!(debit.kind, TransactionKind::Debit);
        assert_eq!(debit.balance_after, 150);
        assert_eq!(debit.sequence, 1);
        assert_eq!(ledger.balance(&alice), 150);
    }

    #[test]
    fn test_overdraft_is_refused_without_side_effects() {
        let ledger = BalanceLedger::new();
        let bob = account("bob");
        ledger.credit(&bob, 50, None).unwrap();

        let err = ledger.debit(&bob, 100, None).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                balance: 50,
                requested: 100
            }
        );
        assert_eq!(ledger.balance(&bob), 50);
        assert_eq!(ledger.history(&bob).len(), 1);
    }

    #[test]
    fn test_unknown_account_reads_as_empty() {
        let ledger = BalanceLedger::new();
        let ghost = account("ghost");

        assert_eq!(ledger.balance(&ghost), 0);
        assert!(matches!(
            ledger.debit(&ghost, 1, None),
            Err(LedgerError::InsufficientFunds { balance: 0, requested: 1 })
        ));
        assert_eq!(ledger.account_count(), 0);
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let ledger = BalanceLedger::new();
        assert_eq!(ledger.credit(&account("a"), 0, None), Err(LedgerError::ZeroAmount));
        assert_eq!(ledger.debit(&account("a"), 0, None), Err(LedgerError::ZeroAmount));
    }

    #[test]
    fn test_idempotent_credit() {
        let ledger = BalanceLedger::new();
        let carol = account("carol");

        let first = ledger.credit(&carol, 1050, Some("topup-1")).unwrap();
        for _ in 0..5 {
            let retry = ledger.credit(&carol, 1050, Some("topup-1")).unwrap();
            assert_eq!(retry, first);
        }
        assert_eq!(ledger.balance(&carol), 1050);
        assert_eq!(ledger.history(&carol).len(), 1);

        let replay = ledger.credit_tracked(&carol, 1050, Some("topup-1")).unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.transaction, first);

        // Keys are scoped per account
        let dave = account("dave");
        ledger.credit(&dave, 10, Some("topup-1")).unwrap();
        assert_eq!(ledger.balance(&dave), 10);
    }

    #[test]
    fn test_overflow_rejected() {
        let ledger = BalanceLedger::new();
        let whale = account("whale");
        ledger.credit(&whale, u64::MAX, None).unwrap();
        assert!(matches!(
            ledger.credit(&whale, 1, None),
            Err(LedgerError::BalanceOverflow { .. })
        ));
        assert_eq!(ledger.balance(&whale), u64::MAX);
    }

    #[test]
    fn test_failed_append_leaves_balance_untouched() {
        let ledger = BalanceLedger::with_store(Arc::new(FailingStore));
        let erin = account("erin");

        assert!(matches!(
            ledger.credit(&erin, 100, Some("k")),
            Err(LedgerError::Storage(_))
        ));
        assert_eq!(ledger.balance(&erin), 0);
        assert!(ledger.history(&erin).is_empty());

        // The key was never consumed
        assert!(matches!(
            ledger.credit(&erin, 100, Some("k")),
            Err(LedgerError::Storage(_))
        ));

        // Nor was an account created for the failed credits
        assert_eq!(ledger.account_count(), 0);
    }

    #[test]
    fn test_random_sequences_keep_invariant() {
        let ledger = BalanceLedger::new();
        let frank = account("frank");
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..2_000 {
            let amount = rng.gen_range(1..500);
            if rng.gen_bool(0.5) {
                let _ = ledger.credit(&frank, amount, None);
            } else {
                let before = ledger.balance(&frank);
                match ledger.debit(&frank, amount, None) {
                    Ok(tx) => assert_eq!(tx.balance_after, before - amount),
                    Err(LedgerError::InsufficientFunds { balance, .. }) => {
                        assert!(amount > before);
                        assert_eq!(balance, before);
                    }
                    Err(e) => panic!("unexpected error {}", e),
                }
            }

            let audit = ledger.audit(&frank);
            assert!(audit.consistent);
            assert_eq!(audit.total_credits - audit.total_debits, audit.balance);
        }
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let ledger = Arc::new(BalanceLedger::new());
        let shared = account("shared");
        ledger.credit(&shared, 1_000, None).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                let shared = shared.clone();
                thread::spawn(move || {
                    (0..20)
                        .filter(|_| ledger.debit(&shared, 7, None).is_ok())
                        .count()
                })
            })
            .collect();

        let successes: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(successes, 1_000 / 7);
        assert_eq!(ledger.balance(&shared), 1_000 - 7 * successes as u64);
        assert!(ledger.audit(&shared).consistent);
    }

    #[test]
    fn test_recover_replays_history() {
        let store = Arc::new(MemoryStore::new());
        {
            let ledger = BalanceLedger::with_store(store.clone());
            ledger.credit(&account("gina"), 300, Some("t-1")).unwrap();
            ledger.debit(&account("gina"), 120, None).unwrap();
            ledger.credit(&account("hank"), 40, None).unwrap();
        }

        let recovered = BalanceLedger::recover(store).unwrap();
        assert_eq!(recovered.balance(&account("gina")), 180);
        assert_eq!(recovered.balance(&account("hank")), 40);

        // Idempotency keys survive recovery
        let retry = recovered.credit(&account("gina"), 300, Some("t-1")).unwrap();
        assert_eq!(retry.sequence, 0);
        assert_eq!(recovered.balance(&account("gina")), 180);

        // Sequence numbers continue
        let next = recovered.debit(&account("gina"), 80, None).unwrap();
        assert_eq!(next.sequence, 2);
    }

    #[test]
    fn test_recover_rejects_gaps() {
        let store = Arc::new(MemoryStore::new());
        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id: account("ivy"),
            sequence: 3,
            kind: TransactionKind::Credit,
            amount: 10,
            balance_after: 10,
            timestamp: Utc::now(),
            idempotency_key: None,
            spin_id: None,
        };
        store.append(&tx).unwrap();

        assert!(matches!(
            BalanceLedger::recover(store),
            Err(StoreError::Corrupted { line: 1, .. })
        ));
    }
}
