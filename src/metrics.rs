//! Prometheus counters for spins, draws and top-ups

use crate::cases::types::Rarity;
use crate::errors::LootResult;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct LootMetrics {
    registry: Registry,
    spins: IntCounterVec,
    draws: IntCounterVec,
    topups: IntCounterVec,
    credited: IntCounter,
}

impl LootMetrics {
    pub fn new() -> LootResult<Self> {
        let registry = Registry::new_custom(Some("lootcase".to_string()), None)?;

        let spins = IntCounterVec::new(
            Opts::new("spins_total", "Spin attempts by outcome"),
            &["outcome"],
        )?;
        let draws = IntCounterVec::new(
            Opts::new("draws_total", "Revealed items by rarity"),
            &["rarity"],
        )?;
        let topups = IntCounterVec::new(
            Opts::new("topups_total", "Applied top-ups by payment method"),
            &["method"],
        )?;
        let credited = IntCounter::new(
            "topup_credited_total",
            "Currency credited through top-ups, bonus included",
        )?;

        registry.register(Box::new(spins.clone()))?;
        registry.register(Box::new(draws.clone()))?;
        registry.register(Box::new(topups.clone()))?;
        registry.register(Box::new(credited.clone()))?;

        Ok(Self {
            registry,
            spins,
            draws,
            topups,
            credited,
        })
    }

    /// `outcome` is `revealed` or the rejection kind, e.g. `insufficient_funds`
    pub fn record_spin(&self, outcome: &str) {
        self.spins.with_label_values(&[outcome]).inc();
    }

    pub fn record_draw(&self, rarity: Rarity) {
        let label = rarity.to_string();
        self.draws.with_label_values(&[label.as_str()]).inc();
    }

    pub fn record_topup(&self, method: &str, credited: u64) {
        self.topups.with_label_values(&[method]).inc();
        self.credited.inc_by(credited);
    }

    pub fn spin_count(&self, outcome: &str) -> u64 {
        self.spins.with_label_values(&[outcome]).get()
    }

    pub fn credited_total(&self) -> u64 {
        self.credited.get()
    }

    /// Text exposition format
    pub fn render(&self) -> LootResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::errors::LootError::Metrics(e.to_string()))
    }
}
