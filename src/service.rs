//! Case service
//!
//! Wires the catalog, ledger, top-up processor and spin sessions together
//! and records metrics. This is what the HTTP layer and the binaries hold.

use crate::cases::catalog::CaseCatalog;
use crate::cases::random::{OsRandomSource, RandomSource};
use crate::cases::session::{SessionRegistry, SessionSnapshot};
use crate::cases::types::{AccountId, CaseId, PaymentMethod, SpinResult, VRFBundle};
use crate::cases::vrf_engine::VrfRandomSource;
use crate::config::{LootConfig, RandomSourceKind};
use crate::errors::{LootError, LootResult, SpinError, TopUpError};
use crate::ledger::store::{JsonLinesStore, TransactionStore};
use crate::ledger::{BalanceLedger, LedgerAudit, Transaction};
use crate::metrics::LootMetrics;
use crate::topup::{TopUpProcessor, TopUpReceipt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of checking a fairness bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FairnessVerification {
    pub valid: bool,
    /// Whether the bundle was signed with this server's key. Absent when the
    /// server does not draw with VRF.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_key: Option<bool>,
    /// Roll reproduced from the VRF output, when a total weight was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll: Option<u64>,
}

pub struct CaseService {
    catalog: Arc<CaseCatalog>,
    ledger: Arc<BalanceLedger>,
    topups: TopUpProcessor,
    sessions: SessionRegistry,
    metrics: LootMetrics,
    random_source: &'static str,
    vrf_public_key: Option<String>,
}

impl CaseService {
    pub fn new(
        catalog: Arc<CaseCatalog>,
        ledger: Arc<BalanceLedger>,
        rng: Arc<dyn RandomSource>,
        payment_methods: Vec<PaymentMethod>,
    ) -> LootResult<Self> {
        Ok(Self {
            topups: TopUpProcessor::new(ledger.clone(), payment_methods),
            sessions: SessionRegistry::new(catalog.clone(), ledger.clone(), rng.clone()),
            metrics: LootMetrics::new()?,
            random_source: rng.name(),
            vrf_public_key: None,
            catalog,
            ledger,
        })
    }

    /// Build every component from configuration, replaying the transaction
    /// log when one is configured
    pub fn from_config(config: &LootConfig) -> LootResult<Self> {
        let catalog = match &config.catalog.path {
            Some(path) => {
                let catalog = CaseCatalog::load(path)?;
                info!(path = %path, cases = catalog.len(), "Catalog loaded");
                catalog
            }
            None => {
                let catalog = CaseCatalog::builtin();
                info!(cases = catalog.len(), "Using built-in catalog");
                catalog
            }
        };

        let ledger = match &config.ledger.log_path {
            Some(path) => {
                let store: Arc<dyn TransactionStore> =
                    Arc::new(JsonLinesStore::open(path, config.ledger.sync_writes)?);
                BalanceLedger::recover(store)?
            }
            None => {
                warn!("No ledger log configured; balances are kept in memory only");
                BalanceLedger::new()
            }
        };

        let (rng, vrf_public_key): (Arc<dyn RandomSource>, Option<String>) =
            match config.fairness.source {
                RandomSourceKind::Os => (Arc::new(OsRandomSource) as Arc<dyn RandomSource>, None),
                RandomSourceKind::Vrf => {
                    let source = match &config.fairness.vrf_secret_key {
                        Some(secret) => VrfRandomSource::from_secret_hex(secret).map_err(|reason| {
                            crate::errors::ConfigurationError::InvalidValue {
                                field: "fairness.vrf_secret_key".to_string(),
                                value: "<redacted>".to_string(),
                                reason,
                            }
                        })?,
                        None => {
                            warn!("No VRF secret key configured; generated an ephemeral key");
                            VrfRandomSource::new_random()
                        }
                    };
                    let public_key = source.public_key_hex();
                    info!(public_key = %public_key, "VRF draws enabled");
                    (Arc::new(source) as Arc<dyn RandomSource>, Some(public_key))
                }
            };

        let mut service = Self::new(
            Arc::new(catalog),
            Arc::new(ledger),
            rng,
            config.payment_methods.clone(),
        )?;
        service.vrf_public_key = vrf_public_key;
        Ok(service)
    }

    pub fn catalog(&self) -> &CaseCatalog {
        &self.catalog
    }

    pub fn payment_methods(&self) -> &[PaymentMethod] {
        self.topups.payment_methods()
    }

    /// Select `case_id` on the account's session and spin it
    pub fn spin(&self, account_id: &AccountId, case_id: CaseId) -> Result<SpinResult, SpinError> {
        let session = self.sessions.session(account_id);
        let outcome = session.spin_case(case_id);

        match &outcome {
            Ok(result) => {
                self.metrics.record_spin("revealed");
                self.metrics.record_draw(result.item.rarity);
            }
            Err(e) => self.metrics.record_spin(e.kind()),
        }
        outcome
    }

    pub fn top_up(
        &self,
        account_id: &AccountId,
        amount: u64,
        payment_method_id: &str,
        idempotency_key: &str,
    ) -> Result<TopUpReceipt, TopUpError> {
        let receipt =
            self.topups
                .top_up_with_receipt(account_id, amount, payment_method_id, idempotency_key)?;
        if !receipt.replayed {
            self.metrics
                .record_topup(&receipt.payment_method, receipt.transaction.amount);
        }
        Ok(receipt)
    }

    pub fn balance(&self, account_id: &AccountId) -> u64 {
        self.ledger.balance(account_id)
    }

    pub fn history(&self, account_id: &AccountId) -> Vec<Transaction> {
        self.ledger.history(account_id)
    }

    pub fn audit(&self, account_id: &AccountId) -> LedgerAudit {
        self.ledger.audit(account_id)
    }

    /// Session view for the presentation layer. Accounts that never spun
    /// report an idle session.
    pub fn session_snapshot(&self, account_id: &AccountId) -> SessionSnapshot {
        match self.sessions.get(account_id) {
            Some(session) => session.snapshot(),
            None => SessionSnapshot {
                account_id: account_id.clone(),
                phase: "idle",
                selected_case: None,
                last_result: None,
                last_error: None,
            },
        }
    }

    /// Check a VRF bundle against `expected_input` (the bundle's own input
    /// when omitted) and optionally reproduce the roll
    pub fn verify_fairness(
        &self,
        bundle: &VRFBundle,
        expected_input: Option<&str>,
        total_weight: Option<u64>,
    ) -> Result<FairnessVerification, String> {
        let expected = expected_input.unwrap_or(&bundle.input_message);
        let valid = VrfRandomSource::verify_vrf_proof(bundle, expected)?;
        let house_key = self
            .vrf_public_key
            .as_deref()
            .map(|key| key.eq_ignore_ascii_case(&bundle.public_key));
        let roll = match total_weight {
            Some(0) => return Err("total_weight must be positive".to_string()),
            Some(total) if valid => {
                let output = hex::decode(&bundle.vrf_output)
                    .map_err(|e| format!("Invalid VRF output hex: {}", e))?;
                Some(VrfRandomSource::roll_from_output(&output, total))
            }
            _ => None,
        };
        Ok(FairnessVerification {
            valid,
            house_key,
            roll,
        })
    }

    pub fn random_source(&self) -> &'static str {
        self.random_source
    }

    pub fn vrf_public_key(&self) -> Option<&str> {
        self.vrf_public_key.as_deref()
    }

    pub fn account_count(&self) -> usize {
        self.ledger.account_count()
    }

    pub fn metrics(&self) -> &LootMetrics {
        &self.metrics
    }

    pub fn render_metrics(&self) -> Result<String, LootError> {
        self.metrics.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::random::ScriptedRandomSource;
    use crate::config::ConfigBuilder;
    use crate::config::LedgerConfig;
    use tempfile::tempdir;

    fn service_with_script(values: Vec<u64>) -> CaseService {
        CaseService::new(
            Arc::new(CaseCatalog::builtin()),
            Arc::new(BalanceLedger::new()),
            Arc::new(ScriptedRandomSource::new(values)),
            PaymentMethod::defaults(),
        )
        .unwrap()
    }

    #[test]
    fn test_spin_records_metrics() {
        let service = service_with_script(vec![0]);
        let account = AccountId::new("player-1");

        assert!(matches!(
            service.spin(&account, CaseId(1)),
            Err(SpinError::InsufficientFunds { balance: 0, price: 100 })
        ));
        service.top_up(&account, 100, "card", "t-1").unwrap();
        let result = service.spin(&account, CaseId(1)).unwrap();

        assert_eq!(service.balance(&account), 0);
        assert_eq!(service.metrics().spin_count("revealed"), 1);
        assert_eq!(service.metrics().spin_count("insufficient_funds"), 1);
        assert_eq!(
            service.session_snapshot(&account).last_result,
            Some(result)
        );
    }

    #[test]
    fn test_replayed_topup_not_counted_twice() {
        let service = service_with_script(vec![0]);
        let account = AccountId::new("player-2");

        service.top_up(&account, 1000, "sbp", "order-1").unwrap();
        service.top_up(&account, 1000, "sbp", "order-1").unwrap();

        assert_eq!(service.balance(&account), 1050);
        assert_eq!(service.metrics().credited_total(), 1050);
    }

    #[test]
    fn test_unknown_account_snapshot_is_idle() {
        let service = service_with_script(vec![0]);
        let snapshot = service.session_snapshot(&AccountId::new("nobody"));
        assert_eq!(snapshot.phase, "idle");
        assert!(snapshot.last_result.is_none());
    }

    #[test]
    fn test_vrf_service_results_verify() {
        let config = ConfigBuilder::new()
            .random_source(RandomSourceKind::Vrf)
            .build();
        let service = CaseService::from_config(&config).unwrap();
        assert_eq!(service.random_source(), "vrf");
        assert!(service.vrf_public_key().is_some());

        let account = AccountId::new("player-3");
        service.top_up(&account, 500, "card", "t-1").unwrap();
        let result = service.spin(&account, CaseId(3)).unwrap();
        let bundle = result.fairness.clone().expect("VRF spins carry a proof");
        assert_eq!(Some(bundle.public_key.as_str()), service.vrf_public_key());

        let verification = service
            .verify_fairness(&bundle, None, Some(result.total_weight))
            .unwrap();
        assert!(verification.valid);
        assert_eq!(verification.house_key, Some(true));

        let expected = format!("{}:{}:{}", result.spin_id, result.case_id, result.account_id);
        assert!(
            service
                .verify_fairness(&bundle, Some(&expected), None)
                .unwrap()
                .valid
        );
        assert!(
            !service
                .verify_fairness(&bundle, Some("other:3:player-3"), None)
                .unwrap()
                .valid
        );
        assert_eq!(verification.roll, Some(result.roll));

        let mut forged = bundle;
        forged.input_message = "another-spin".to_string();
        assert!(!service.verify_fairness(&forged, None, None).unwrap().valid);
    }

    #[test]
    fn test_from_config_replays_ledger_log() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("ledger.jsonl");
        let config = ConfigBuilder::new()
            .ledger(LedgerConfig {
                log_path: Some(log_path.to_string_lossy().to_string()),
                sync_writes: false,
            })
            .build();

        let account = AccountId::new("player-4");
        {
            let service = CaseService::from_config(&config).unwrap();
            service.top_up(&account, 300, "crypto", "t-1").unwrap();
            service.spin(&account, CaseId(2)).unwrap();
        }

        let restarted = CaseService::from_config(&config).unwrap();
        assert_eq!(restarted.balance(&account), 330 - 75);
        assert_eq!(restarted.history(&account).len(), 2);
        assert!(restarted.audit(&account).consistent);
    }

    #[test]
    fn test_missing_catalog_file_is_fatal() {
        let config = ConfigBuilder::new()
            .catalog_path("/no/such/catalog.toml")
            .build();
        assert!(matches!(
            CaseService::from_config(&config),
            Err(LootError::Catalog(_))
        ));
    }
}
