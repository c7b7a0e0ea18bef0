//! Random sources for weighted draws
//!
//! Production draws use [`OsRandomSource`] or the verifiable
//! [`VrfRandomSource`](crate::cases::vrf_engine::VrfRandomSource).
//! [`SeededRandomSource`] and [`ScriptedRandomSource`] are predictable and
//! exist for tests and offline statistics only; configuration never selects them.

use crate::cases::types::{AccountId, CaseId, VRFBundle};
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// What a draw is for. Verifiable sources bind their output to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawContext {
    pub spin_id: Uuid,
    pub case_id: CaseId,
    pub account_id: AccountId,
}

impl DrawContext {
    pub fn new(spin_id: Uuid, case_id: CaseId, account_id: AccountId) -> Self {
        Self {
            spin_id,
            case_id,
            account_id,
        }
    }
}

impl fmt::Display for DrawContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.spin_id, self.case_id, self.account_id)
    }
}

/// One uniform value, plus a proof when the source can produce one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roll {
    pub value: u64,
    pub proof: Option<VRFBundle>,
}

impl Roll {
    pub fn plain(value: u64) -> Self {
        Self { value, proof: None }
    }
}

/// Supplier of uniform values in `[0, bound)`.
///
/// Callers never pass `bound == 0`.
pub trait RandomSource: Send + Sync {
    fn roll(&self, bound: u64, context: &DrawContext) -> Roll;

    /// Short label for logs and metrics
    fn name(&self) -> &'static str;
}

/// Operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn roll(&self, bound: u64, _context: &DrawContext) -> Roll {
        Roll::plain(OsRng.gen_range(0..bound))
    }

    fn name(&self) -> &'static str {
        "os"
    }
}

/// Seeded generator. Reproducible, therefore never for real draws.
pub struct SeededRandomSource {
    rng: Mutex<StdRng>,
}

impl SeededRandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandomSource {
    fn roll(&self, bound: u64, _context: &DrawContext) -> Roll {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Roll::plain(rng.gen_range(0..bound))
    }

    fn name(&self) -> &'static str {
        "seeded"
    }
}

/// Replays a fixed sequence of values (cycling), reduced modulo the bound
pub struct ScriptedRandomSource {
    values: Vec<u64>,
    cursor: AtomicUsize,
}

impl ScriptedRandomSource {
    pub fn new(values: Vec<u64>) -> Self {
        assert!(!values.is_empty(), "scripted source needs at least one value");
        Self {
            values,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for ScriptedRandomSource {
    fn roll(&self, bound: u64, _context: &DrawContext) -> Roll {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst) % self.values.len();
        Roll::plain(self.values[index] % bound)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> DrawContext {
        DrawContext::new(Uuid::nil(), CaseId(1), AccountId::new("player-1"))
    }

    #[test]
    fn test_os_source_stays_in_bounds() {
        let source = OsRandomSource;
        for bound in [1u64, 2, 7, 1_000, u64::MAX] {
            for _ in 0..100 {
                assert!(source.roll(bound, &context()).value < bound);
            }
        }
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let a = SeededRandomSource::new(42);
        let b = SeededRandomSource::new(42);
        let ctx = context();
        let first: Vec<u64> = (0..20).map(|_| a.roll(1_000, &ctx).value).collect();
        let second: Vec<u64> = (0..20).map(|_| b.roll(1_000, &ctx).value).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scripted_source_cycles() {
        let source = ScriptedRandomSource::new(vec![0, 3, 10]);
        let ctx = context();
        assert_eq!(source.roll(4, &ctx).value, 0);
        assert_eq!(source.roll(4, &ctx).value, 3);
        assert_eq!(source.roll(4, &ctx).value, 2);
        assert_eq!(source.roll(4, &ctx).value, 0);
    }

    #[test]
    fn test_context_display() {
        assert_eq!(
            context().to_string(),
            "00000000-0000-0000-0000-000000000000:1:player-1"
        );
    }
}
