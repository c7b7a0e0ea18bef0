//! Per-account spin state machine
//!
//! ```text
//! Idle --spin--> Debiting --ok--> Drawing --> Revealed
//!                    \
//!                     `--err--> Rejected
//! ```
//!
//! The session lock is only held for phase transitions. The debit runs under
//! the ledger's own account lock and the draw runs with no lock at all, while
//! the in-flight phase keeps any overlapping `spin()` out.

use crate::cases::catalog::CaseCatalog;
use crate::cases::draw::DrawEngine;
use crate::cases::random::{DrawContext, RandomSource};
use crate::cases::types::{AccountId, Case, CaseId, SpinResult};
use crate::errors::SpinError;
use crate::ledger::BalanceLedger;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpinPhase {
    Idle,
    Debiting,
    Drawing,
    Revealed(SpinResult),
    Rejected(SpinError),
}

impl SpinPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SpinPhase::Idle => "idle",
            SpinPhase::Debiting => "debiting",
            SpinPhase::Drawing => "drawing",
            SpinPhase::Revealed(_) => "revealed",
            SpinPhase::Rejected(_) => "rejected",
        }
    }

    pub fn in_flight(&self) -> bool {
        matches!(self, SpinPhase::Debiting | SpinPhase::Drawing)
    }
}

/// Read-only view handed to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub account_id: AccountId,
    pub phase: &'static str,
    pub selected_case: Option<CaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<SpinResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

struct SessionState {
    phase: SpinPhase,
    selected_case: Option<CaseId>,
    last_result: Option<SpinResult>,
}

pub struct SpinSession {
    account_id: AccountId,
    catalog: Arc<CaseCatalog>,
    ledger: Arc<BalanceLedger>,
    rng: Arc<dyn RandomSource>,
    state: Mutex<SessionState>,
}

impl SpinSession {
    pub fn new(
        account_id: AccountId,
        catalog: Arc<CaseCatalog>,
        ledger: Arc<BalanceLedger>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            account_id,
            catalog,
            ledger,
            rng,
            state: Mutex::new(SessionState {
                phase: SpinPhase::Idle,
                selected_case: None,
                last_result: None,
            }),
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Remember which case the next spin opens. Touches no funds.
    pub fn select_case(&self, case_id: CaseId) -> Result<(), SpinError> {
        let mut state = self.state();
        if state.phase.in_flight() {
            return Err(SpinError::SpinAlreadyInProgress);
        }
        if self.catalog.get_case(case_id).is_none() {
            return Err(SpinError::UnknownCase(case_id));
        }

        state.selected_case = Some(case_id);
        state.phase = SpinPhase::Idle;
        debug!(account_id = %self.account_id, %case_id, "Case selected");
        Ok(())
    }

    /// Pay for the selected case and reveal the drawn item.
    ///
    /// Overlapping calls fail fast with `SpinAlreadyInProgress` before any
    /// debit is attempted.
    pub fn spin(&self) -> Result<SpinResult, SpinError> {
        let (case, spin_id) = self.begin(None)?;
        self.settle(case, spin_id)
    }

    /// Select `case_id` and spin it in one step.
    ///
    /// Selection and the move to `Debiting` happen under one guard, so a
    /// concurrent `select_case` cannot change which case this call opens.
    pub fn spin_case(&self, case_id: CaseId) -> Result<SpinResult, SpinError> {
        let (case, spin_id) = self.begin(Some(case_id))?;
        self.settle(case, spin_id)
    }

    fn begin(&self, requested: Option<CaseId>) -> Result<(&Case, Uuid), SpinError> {
        let mut state = self.state();
        if state.phase.in_flight() {
            return Err(SpinError::SpinAlreadyInProgress);
        }
        let case = match requested {
            Some(case_id) => {
                let case = self
                    .catalog
                    .get_case(case_id)
                    .ok_or(SpinError::UnknownCase(case_id))?;
                state.selected_case = Some(case_id);
                case
            }
            None => {
                let case_id = state.selected_case.ok_or(SpinError::NoCaseSelected)?;
                match self.catalog.get_case(case_id) {
                    Some(case) => case,
                    None => {
                        let err = SpinError::UnknownCase(case_id);
                        state.phase = SpinPhase::Rejected(err.clone());
                        return Err(err);
                    }
                }
            }
        };
        state.phase = SpinPhase::Debiting;
        Ok((case, Uuid::new_v4()))
    }

    fn settle(&self, case: &Case, spin_id: Uuid) -> Result<SpinResult, SpinError> {
        let debit = match self.ledger.debit(&self.account_id, case.price, Some(spin_id)) {
            Ok(tx) => tx,
            Err(e) => {
                let err = SpinError::from(e);
                warn!(account_id = %self.account_id, case_id = %case.id, %spin_id, "Spin rejected: {}", err);
                self.state().phase = SpinPhase::Rejected(err.clone());
                return Err(err);
            }
        };

        self.state().phase = SpinPhase::Drawing;

        let context = DrawContext::new(spin_id, case.id, self.account_id.clone());
        let draw = DrawEngine::draw(case, self.rng.as_ref(), &context);

        let result = SpinResult {
            spin_id,
            case_id: case.id,
            account_id: self.account_id.clone(),
            item: draw.item.clone(),
            debit_transaction_id: debit.id,
            balance_after: debit.balance_after,
            roll: draw.roll,
            total_weight: draw.total_weight,
            fairness: draw.proof,
            timestamp: Utc::now(),
        };

        {
            let mut state = self.state();
            state.phase = SpinPhase::Revealed(result.clone());
            state.last_result = Some(result.clone());
        }

        info!(
            account_id = %self.account_id,
            case_id = %case.id,
            %spin_id,
            item = %result.item.name,
            rarity = %result.item.rarity,
            roll = result.roll,
            source = self.rng.name(),
            "Spin revealed"
        );
        Ok(result)
    }

    pub fn phase(&self) -> SpinPhase {
        self.state().phase.clone()
    }

    pub fn last_result(&self) -> Option<SpinResult> {
        self.state().last_result.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            account_id: self.account_id.clone(),
            phase: state.phase.label(),
            selected_case: state.selected_case,
            last_result: state.last_result.clone(),
            last_error: match &state.phase {
                SpinPhase::Rejected(err) => Some(err.to_string()),
                _ => None,
            },
        }
    }
}

/// Registry size above which settled sessions are pruned
pub const DEFAULT_SESSION_CAPACITY: usize = 100_000;

/// One session per account, created on first use.
///
/// Once the registry grows past its capacity, sessions that are not mid-spin
/// and not held by a caller are dropped. A pruned account starts over from
/// an idle session with no remembered result.
pub struct SessionRegistry {
    sessions: DashMap<AccountId, Arc<SpinSession>>,
    catalog: Arc<CaseCatalog>,
    ledger: Arc<BalanceLedger>,
    rng: Arc<dyn RandomSource>,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(
        catalog: Arc<CaseCatalog>,
        ledger: Arc<BalanceLedger>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        Self::with_capacity(catalog, ledger, rng, DEFAULT_SESSION_CAPACITY)
    }

    pub fn with_capacity(
        catalog: Arc<CaseCatalog>,
        ledger: Arc<BalanceLedger>,
        rng: Arc<dyn RandomSource>,
        capacity: usize,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            catalog,
            ledger,
            rng,
            capacity,
        }
    }

    pub fn session(&self, account_id: &AccountId) -> Arc<SpinSession> {
        let session = self
            .sessions
            .entry(account_id.clone())
            .or_insert_with(|| {
                Arc::new(SpinSession::new(
                    account_id.clone(),
                    self.catalog.clone(),
                    self.ledger.clone(),
                    self.rng.clone(),
                ))
            })
            .clone();

        if self.sessions.len() > self.capacity {
            let pruned = self.prune();
            debug!(pruned, remaining = self.sessions.len(), "Pruned settled sessions");
        }
        session
    }

    /// Drop every session that is not mid-spin and not referenced outside
    /// the registry. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| Arc::strong_count(session) > 1 || session.state().phase.in_flight());
        before.saturating_sub(self.sessions.len())
    }

    /// Existing session, without creating one
    pub fn get(&self, account_id: &AccountId) -> Option<Arc<SpinSession>> {
        self.sessions.get(account_id).map(|session| session.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
