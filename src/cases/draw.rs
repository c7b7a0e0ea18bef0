//! Weighted draw over a case's item pool
//!
//! Items are walked in catalog order with an integer running sum, so a
//! given roll always selects the same item.

use crate::cases::random::{DrawContext, RandomSource, Roll};
use crate::cases::types::{Case, Item, VRFBundle};

/// Outcome of one draw
#[derive(Debug, Clone)]
pub struct Draw<'a> {
    pub item: &'a Item,
    pub roll: u64,
    pub total_weight: u64,
    pub proof: Option<VRFBundle>,
}

pub struct DrawEngine;

impl DrawEngine {
    /// Draw one item from `case`.
    ///
    /// Panics if the case has zero total weight; the catalog rejects such
    /// cases at load time, so reaching it is a programming error.
    pub fn draw<'a>(case: &'a Case, source: &dyn RandomSource, context: &DrawContext) -> Draw<'a> {
        let total_weight = case.total_weight();
        assert!(
            total_weight > 0,
            "case {} reached the draw engine with zero total weight",
            case.id
        );

        let Roll { value, proof } = source.roll(total_weight, context);
        let roll = value % total_weight;
        let item = Self::select(case, roll).unwrap_or_else(|| {
            unreachable!("roll {} below total weight {} always selects an item", roll, total_weight)
        });

        Draw {
            item,
            roll,
            total_weight,
            proof,
        }
    }

    /// First item whose cumulative weight exceeds `roll`.
    /// `None` when `roll >= case.total_weight()`.
    pub fn select(case: &Case, roll: u64) -> Option<&Item> {
        let mut cumulative = 0u64;
        case.items.iter().find(|item| {
            cumulative += u64::from(item.weight);
            roll < cumulative
        })
    }

    /// Probability of each item, in catalog order
    pub fn expected_frequencies(case: &Case) -> Vec<(&Item, f64)> {
        let total = case.total_weight() as f64;
        case.items
            .iter()
            .map(|item| (item, f64::from(item.weight) / total))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::random::{ScriptedRandomSource, SeededRandomSource};
    use crate::cases::types::{AccountId, CaseId, ItemId, Rarity};
    use crate::cases::vrf_engine::VrfRandomSource;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn weighted_case(weights: &[u32]) -> Case {
        Case {
            id: CaseId(1),
            name: "test".to_string(),
            description: String::new(),
            price: 100,
            items: weights
                .iter()
                .enumerate()
                .map(|(i, &weight)| Item {
                    id: ItemId(i as u32 + 1),
                    name: format!("item-{}", i + 1),
                    rarity: Rarity::Common,
                    value: 10,
                    weight,
                })
                .collect(),
        }
    }

    fn context() -> DrawContext {
        DrawContext::new(Uuid::new_v4(), CaseId(1), AccountId::new("player-1"))
    }

    #[test]
    fn test_select_walks_in_catalog_order() {
        // A weight 1, B weight 3: roll 0 -> A, rolls 1..=3 -> B
        let case = weighted_case(&[1, 3]);
        assert_eq!(DrawEngine::select(&case, 0).map(|i| i.id), Some(ItemId(1)));
        for roll in 1..=3 {
            assert_eq!(DrawEngine::select(&case, roll).map(|i| i.id), Some(ItemId(2)));
        }
        assert!(DrawEngine::select(&case, 4).is_none());
    }

    #[test]
    fn test_fixed_roll_is_reproducible() {
        let case = weighted_case(&[5, 10, 85]);
        let source = ScriptedRandomSource::new(vec![14, 15, 99]);
        let picks: Vec<ItemId> = (0..3)
            .map(|_| DrawEngine::draw(&case, &source, &context()).item.id)
            .collect();
        assert_eq!(picks, vec![ItemId(2), ItemId(3), ItemId(3)]);
    }

    #[test]
    fn test_draw_only_returns_case_items() {
        let case = weighted_case(&[1, 2, 3, 4]);
        let source = SeededRandomSource::new(7);
        for _ in 0..1_000 {
            let draw = DrawEngine::draw(&case, &source, &context());
            assert!(case.items.contains(draw.item));
            assert!(draw.roll < draw.total_weight);
        }
    }

    #[test]
    fn test_statistical_fairness() {
        let weights = [1u32, 3, 6, 10];
        let case = weighted_case(&weights);
        let source = SeededRandomSource::new(0x5eed);
        let draws = 100_000usize;

        let mut counts: HashMap<ItemId, usize> = HashMap::new();
        for _ in 0..draws {
            *counts.entry(DrawEngine::draw(&case, &source, &context()).item.id).or_default() += 1;
        }

        for (item, expected) in DrawEngine::expected_frequencies(&case) {
            let observed = counts.get(&item.id).copied().unwrap_or(0) as f64 / draws as f64;
            // Five standard deviations of a binomial proportion
            let tolerance = 5.0 * (expected * (1.0 - expected) / draws as f64).sqrt();
            assert!(
                (observed - expected).abs() < tolerance,
                "item {} observed {:.4}, expected {:.4}",
                item.id,
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_vrf_draw_carries_proof() {
        let case = weighted_case(&[1, 3]);
        let source = VrfRandomSource::new_random();
        let ctx = context();

        let draw = DrawEngine::draw(&case, &source, &ctx);
        let proof = draw.proof.expect("VRF draws attach a proof");
        assert!(VrfRandomSource::verify_vrf_proof(&proof, &ctx.to_string()).unwrap());

        let output = hex::decode(&proof.vrf_output).unwrap();
        let recomputed = VrfRandomSource::roll_from_output(&output, draw.total_weight);
        assert_eq!(recomputed, draw.roll);
        assert_eq!(DrawEngine::select(&case, recomputed), Some(draw.item));
    }

    #[test]
    #[should_panic(expected = "zero total weight")]
    fn test_zero_weight_case_is_a_programming_error() {
        let case = weighted_case(&[0]);
        DrawEngine::draw(&case, &SeededRandomSource::new(1), &context());
    }
}
