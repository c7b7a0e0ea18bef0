use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Case identifier as declared in the catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CaseId(pub u32);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item identifier, unique within its case
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Player account identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Item rarity tier. Declaration order is the tier order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    /// Weight used when a catalog entry does not declare one
    pub fn default_weight(self) -> u32 {
        match self {
            Rarity::Common => 600,
            Rarity::Rare => 250,
            Rarity::Epic => 100,
            Rarity::Legendary => 50,
        }
    }

    pub fn all() -> [Rarity; 4] {
        [Rarity::Common, Rarity::Rare, Rarity::Epic, Rarity::Legendary]
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rarity::Common => write!(f, "common"),
            Rarity::Rare => write!(f, "rare"),
            Rarity::Epic => write!(f, "epic"),
            Rarity::Legendary => write!(f, "legendary"),
        }
    }
}

/// A drawable item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub rarity: Rarity,
    /// Payout value in balance units
    pub value: u64,
    pub weight: u32,
}

/// A priced pool of items. Item order is the draw order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Case {
    pub id: CaseId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: u64,
    pub items: Vec<Item>,
}

impl Case {
    /// Sum of item weights. Overflow is rejected when the catalog loads.
    pub fn total_weight(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.weight)).sum()
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// Top-up payment method with its bonus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
    /// Bonus credited on top of the paid amount, in whole percent
    pub bonus_percent: u32,
}

impl PaymentMethod {
    pub fn new(id: &str, name: &str, bonus_percent: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            bonus_percent,
        }
    }

    /// Methods offered when configuration does not list any
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("card", "Bank card", 0),
            Self::new("sbp", "Fast payment system", 5),
            Self::new("crypto", "Crypto wallet", 10),
        ]
    }
}

/// VRF bundle containing cryptographic proof
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VRFBundle {
    /// Hex-encoded VRF output (32 bytes)
    pub vrf_output: String,
    /// Hex-encoded VRF pre-output point (32 bytes)
    pub vrf_preout: String,
    /// Hex-encoded DLEQ proof (64 bytes)
    pub vrf_proof: String,
    /// Hex-encoded public key (32 bytes)
    pub public_key: String,
    /// Input message used for VRF
    pub input_message: String,
}

/// Completed spin, created once per committed debit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpinResult {
    pub spin_id: Uuid,
    pub case_id: CaseId,
    pub account_id: AccountId,
    pub item: Item,
    /// Ledger transaction that paid for this spin
    pub debit_transaction_id: Uuid,
    pub balance_after: u64,
    /// Roll in `[0, total_weight)` that selected the item
    pub roll: u64,
    pub total_weight: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fairness: Option<VRFBundle>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_ordering() {
        assert!(Rarity::Common < Rarity::Rare);
        assert!(Rarity::Rare < Rarity::Epic);
        assert!(Rarity::Epic < Rarity::Legendary);
    }

    #[test]
    fn test_rarer_tiers_weigh_less() {
        let weights: Vec<u32> = Rarity::all().iter().map(|r| r.default_weight()).collect();
        assert!(weights.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_rarity_serde_lowercase() {
        let json = serde_json::to_string(&Rarity::Legendary).unwrap();
        assert_eq!(json, "\"legendary\"");
        let back: Rarity = serde_json::from_str("\"epic\"").unwrap();
        assert_eq!(back, Rarity::Epic);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&CaseId(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&AccountId::new("player-1")).unwrap(),
            "\"player-1\""
        );
    }
}
