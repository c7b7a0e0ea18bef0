//! End-to-end spin and top-up flows across catalog, ledger, sessions and
//! the on-disk transaction log

use lootcase::cases::random::{ScriptedRandomSource, SeededRandomSource};
use lootcase::cases::{AccountId, CaseCatalog, CaseId, ItemId, SpinPhase, SpinSession};
use lootcase::errors::{SpinError, TopUpError};
use lootcase::ledger::store::{JsonLinesStore, TransactionStore};
use lootcase::{BalanceLedger, PaymentMethod, TopUpProcessor, TransactionKind};
use std::sync::Arc;

const TWO_ITEM_CATALOG: &str = r#"
[[cases]]
id = 1
name = "Starter Case"
price = 100

[[cases.items]]
id = 1
name = "A"
rarity = "legendary"
value = 400
weight = 1

[[cases.items]]
id = 2
name = "B"
rarity = "common"
value = 20
weight = 3
"#;

fn catalog() -> Arc<CaseCatalog> {
    Arc::new(CaseCatalog::from_toml_str(TWO_ITEM_CATALOG).expect("valid catalog"))
}

#[test]
fn test_spin_then_top_up_scenario() {
    let ledger = Arc::new(BalanceLedger::new());
    let account = AccountId::new("alice");
    ledger.credit(&account, 250, None).unwrap();

    let session = SpinSession::new(
        account.clone(),
        catalog(),
        ledger.clone(),
        Arc::new(SeededRandomSource::new(2024)),
    );
    session.select_case(CaseId(1)).unwrap();
    let result = session.spin().unwrap();

    assert_eq!(ledger.balance(&account), 150);
    assert!([ItemId(1), ItemId(2)].contains(&result.item.id));
    assert!(result.roll < 4);

    let topups = TopUpProcessor::new(ledger.clone(), PaymentMethod::defaults());
    let credit = topups.top_up(&account, 1000, "sbp", "order-1").unwrap();
    assert_eq!(credit.amount, 1050);
    assert_eq!(ledger.balance(&account), 1200);

    let audit = ledger.audit(&account);
    assert!(audit.consistent);
    assert_eq!(audit.total_credits, 1300);
    assert_eq!(audit.total_debits, 100);
}

#[test]
fn test_insufficient_balance_scenario() {
    let ledger = Arc::new(BalanceLedger::new());
    let account = AccountId::new("bob");
    ledger.credit(&account, 50, None).unwrap();

    let session = SpinSession::new(
        account.clone(),
        catalog(),
        ledger.clone(),
        Arc::new(ScriptedRandomSource::new(vec![0])),
    );
    session.select_case(CaseId(1)).unwrap();

    assert_eq!(
        session.spin(),
        Err(SpinError::InsufficientFunds {
            balance: 50,
            price: 100
        })
    );
    assert!(matches!(session.phase(), SpinPhase::Rejected(_)));
    assert_eq!(ledger.balance(&account), 50);
    assert_eq!(ledger.history(&account).len(), 1);
}

#[test]
fn test_top_up_input_errors() {
    let ledger = Arc::new(BalanceLedger::new());
    let topups = TopUpProcessor::new(ledger.clone(), PaymentMethod::defaults());
    let account = AccountId::new("carol");

    assert!(matches!(
        lootcase::topup::parse_amount("-100"),
        Err(TopUpError::InvalidAmount(_))
    ));
    assert!(matches!(
        topups.top_up(&account, 100, "gift-card", "k-1"),
        Err(TopUpError::UnknownPaymentMethod(_))
    ));
    assert_eq!(ledger.balance(&account), 0);
}

#[test]
fn test_balances_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let account = AccountId::new("dana");

    let spin_id = {
        let store: Arc<dyn TransactionStore> = Arc::new(JsonLinesStore::open(&path, true).unwrap());
        let ledger = Arc::new(BalanceLedger::recover(store).unwrap());
        let topups = TopUpProcessor::new(ledger.clone(), PaymentMethod::defaults());
        topups.top_up(&account, 500, "crypto", "order-7").unwrap();

        let session = SpinSession::new(
            account.clone(),
            catalog(),
            ledger.clone(),
            Arc::new(ScriptedRandomSource::new(vec![0])),
        );
        session.select_case(CaseId(1)).unwrap();
        session.spin().unwrap().spin_id
    };

    let store: Arc<dyn TransactionStore> = Arc::new(JsonLinesStore::open(&path, true).unwrap());
    let ledger = Arc::new(BalanceLedger::recover(store).unwrap());
    assert_eq!(ledger.balance(&account), 550 - 100);

    let history = ledger.history(&account);
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].kind, TransactionKind::Debit);
    assert_eq!(history[1].spin_id, Some(spin_id));

    // The idempotency key from before the restart still holds
    let topups = TopUpProcessor::new(ledger.clone(), PaymentMethod::defaults());
    let replay = topups.top_up(&account, 500, "crypto", "order-7").unwrap();
    assert_eq!(replay.id, history[0].id);
    assert_eq!(ledger.balance(&account), 450);
}

#[tokio::test]
async fn test_concurrent_sessions_on_shared_ledger() {
    let ledger = Arc::new(BalanceLedger::new());
    let catalog = catalog();
    let accounts: Vec<AccountId> = (0..8).map(|i| AccountId::new(format!("player-{}", i))).collect();
    for account in &accounts {
        ledger.credit(account, 1_000, None).unwrap();
    }

    let tasks: Vec<_> = accounts
        .iter()
        .cloned()
        .map(|account| {
            let session = SpinSession::new(
                account,
                catalog.clone(),
                ledger.clone(),
                Arc::new(SeededRandomSource::new(7)),
            );
            tokio::task::spawn_blocking(move || {
                session.select_case(CaseId(1)).unwrap();
                (0..15).filter(|_| session.spin().is_ok()).count()
            })
        })
        .collect();

    for (task, account) in futures::future::join_all(tasks).await.into_iter().zip(&accounts) {
        let spins = task.unwrap();
        assert_eq!(spins, 10);
        assert_eq!(ledger.balance(account), 0);
        assert!(ledger.audit(account).consistent);
    }
}
