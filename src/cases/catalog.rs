//! Case catalog
//!
//! Loaded once at startup and immutable afterwards. Validation here is what
//! lets the draw engine assume every case has a positive total weight.

use crate::cases::types::{Case, CaseId, Item, ItemId, Rarity};
use crate::errors::CatalogError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Catalog file layout (TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    pub cases: Vec<CaseEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseEntry {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: u64,
    pub items: Vec<ItemEntry>,
}

/// Item as written in a catalog file; `weight` falls back to the rarity default
#[derive(Debug, Clone, Deserialize)]
pub struct ItemEntry {
    pub id: u32,
    pub name: String,
    pub rarity: Rarity,
    pub value: u64,
    #[serde(default)]
    pub weight: Option<u32>,
}

impl From<ItemEntry> for Item {
    fn from(entry: ItemEntry) -> Self {
        Item {
            id: ItemId(entry.id),
            name: entry.name,
            rarity: entry.rarity,
            value: entry.value,
            weight: entry.weight.unwrap_or_else(|| entry.rarity.default_weight()),
        }
    }
}

impl From<CaseEntry> for Case {
    fn from(entry: CaseEntry) -> Self {
        Case {
            id: CaseId(entry.id),
            name: entry.name,
            description: entry.description,
            price: entry.price,
            items: entry.items.into_iter().map(Item::from).collect(),
        }
    }
}

/// Read-only set of cases
#[derive(Debug, Clone)]
pub struct CaseCatalog {
    cases: Vec<Case>,
}

impl CaseCatalog {
    /// Validate and freeze a list of cases
    pub fn new(cases: Vec<Case>) -> Result<Self, CatalogError> {
        if cases.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen_cases = HashSet::new();
        for case in &cases {
            if !seen_cases.insert(case.id) {
                return Err(CatalogError::DuplicateCase(case.id));
            }
            validate_case(case)?;
        }

        Ok(Self { cases })
    }

    /// Parse a TOML catalog document
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| CatalogError::LoadFailed(format!("Failed to parse TOML: {}", e)))?;
        Self::new(file.cases.into_iter().map(Case::from).collect())
    }

    /// Load a TOML catalog file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CatalogError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn get_case(&self, id: CaseId) -> Option<&Case> {
        self.cases.iter().find(|case| case.id == id)
    }

    /// Cases in declaration order
    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Built-in catalog used when no catalog file is configured
    pub fn builtin() -> Self {
        let cases = vec![
            builtin_case(
                1,
                "Mystic Case",
                "Rare artifacts and treasures",
                100,
                &[
                    (1, "Diamond Sword", Rarity::Legendary, 500),
                    (2, "Golden Crown", Rarity::Epic, 300),
                    (3, "Magic Shield", Rarity::Rare, 150),
                    (4, "Strength Potion", Rarity::Common, 50),
                ],
            ),
            builtin_case(
                2,
                "Battle Case",
                "Weapons and armor for combat",
                75,
                &[
                    (5, "Fire Axe", Rarity::Epic, 250),
                    (6, "Chainmail", Rarity::Rare, 120),
                    (7, "Battle Gloves", Rarity::Common, 40),
                    (8, "Warrior Helmet", Rarity::Rare, 100),
                ],
            ),
            builtin_case(
                3,
                "Magic Case",
                "Spells and magical artifacts",
                150,
                &[
                    (9, "Time Crystal", Rarity::Legendary, 800),
                    (10, "Spellbook", Rarity::Epic, 200),
                    (11, "Magic Wand", Rarity::Rare, 180),
                    (12, "Lucky Amulet", Rarity::Common, 60),
                ],
            ),
        ];

        // The builtin table is static and always valid.
        Self { cases }
    }
}

fn builtin_case(
    id: u32,
    name: &str,
    description: &str,
    price: u64,
    items: &[(u32, &str, Rarity, u64)],
) -> Case {
    Case {
        id: CaseId(id),
        name: name.to_string(),
        description: description.to_string(),
        price,
        items: items
            .iter()
            .map(|&(item_id, item_name, rarity, value)| Item {
                id: ItemId(item_id),
                name: item_name.to_string(),
                rarity,
                value,
                weight: rarity.default_weight(),
            })
            .collect(),
    }
}

fn validate_case(case: &Case) -> Result<(), CatalogError> {
    if case.items.is_empty() {
        return Err(CatalogError::EmptyCase(case.id));
    }
    if case.price == 0 {
        return Err(CatalogError::ZeroPrice(case.id));
    }

    let mut seen_items = HashSet::new();
    let mut total: u64 = 0;
    for item in &case.items {
        if !seen_items.insert(item.id) {
            return Err(CatalogError::DuplicateItem {
                case_id: case.id,
                item_id: item.id.0,
            });
        }
        if item.weight == 0 {
            return Err(CatalogError::ZeroWeight {
                case_id: case.id,
                item_id: item.id.0,
            });
        }
        total = total
            .checked_add(u64::from(item.weight))
            .ok_or(CatalogError::WeightOverflow(case.id))?;
    }

    Ok(())
}
