use serde::{Deserialize, Serialize};

use supplyledger_core::{Entity, ItemId, LedgerError, LedgerResult};

/// Unit of measure given to items that do not declare one.
pub const DEFAULT_UNIT: &str = "UN";

/// Category given to items that do not declare one.
pub const DEFAULT_CATEGORY: &str = "Geral";

/// Stable catalog code of an item. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    pub fn new(raw: impl AsRef<str>) -> LedgerResult<Self> {
        let sku = raw.as_ref().trim();
        if sku.is_empty() {
            return Err(LedgerError::incomplete("sku cannot be empty"));
        }
        Ok(Self(sku.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value when the sku is made of ASCII digits only.
    pub fn numeric(&self) -> Option<u64> {
        numeric_sku(&self.0)
    }

    /// The numeric sku right after this one.
    pub fn successor(&self) -> LedgerResult<Sku> {
        self.numeric()
            .and_then(|n| n.checked_add(1))
            .map(Sku::from)
            .ok_or_else(|| LedgerError::invalid_id(format!("no numeric sku follows {}", self.0)))
    }
}

impl std::borrow::Borrow<str> for Sku {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<u64> for Sku {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl core::fmt::Display for Sku {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

fn numeric_sku(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Policy for synthetic skus handed to items that arrive without a code.
///
/// The next synthetic sku is the largest purely-numeric sku starting with
/// `prefix`, plus one. With no such sku in the catalog the sequence starts at
/// `base`. No counter is stored: the catalog itself is the sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuPolicy {
    pub prefix: char,
    pub base: u64,
}

impl SkuPolicy {
    pub const DEFAULT_PREFIX: char = '3';
    pub const DEFAULT_BASE: u64 = 30_000_000;

    pub fn new(prefix: char, base: u64) -> Self {
        Self { prefix, base }
    }

    /// Whether `sku` takes part in the synthetic sequence.
    pub fn is_synthetic(&self, sku: &str) -> bool {
        sku.starts_with(self.prefix) && numeric_sku(sku).is_some()
    }

    /// Fails with `InvalidId` when the largest synthetic sku is `u64::MAX`.
    pub fn next_synthetic<'a>(&self, skus: impl IntoIterator<Item = &'a str>) -> LedgerResult<Sku> {
        let max = skus
            .into_iter()
            .filter(|s| self.is_synthetic(s))
            .filter_map(numeric_sku)
            .max();
        match max {
            Some(max) => Sku::from(max).successor(),
            None => Ok(Sku::from(self.base)),
        }
    }
}

impl Default for SkuPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX, Self::DEFAULT_BASE)
    }
}

/// Catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub sku: Sku,
    pub description: String,
    pub category: String,
    pub unit: String,
    /// Last known unit value; overwritten by every receipt of the item.
    pub unit_value: f64,
    pub minimum_stock: i64,
}

impl Item {
    pub fn from_new(id: ItemId, new: NewItem) -> Self {
        Self {
            id,
            sku: new.sku,
            description: new.description,
            category: new.category,
            unit: new.unit,
            unit_value: new.unit_value,
            minimum_stock: new.minimum_stock,
        }
    }

    /// Key used for case-insensitive description matching.
    pub fn description_key(&self) -> String {
        description_key(&self.description)
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for creating a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub sku: Sku,
    pub description: String,
    pub category: String,
    pub unit: String,
    pub unit_value: f64,
    pub minimum_stock: i64,
}

impl NewItem {
    pub fn new(sku: Sku, description: impl Into<String>) -> Self {
        Self {
            sku,
            description: description.into(),
            category: DEFAULT_CATEGORY.to_string(),
            unit: DEFAULT_UNIT.to_string(),
            unit_value: 0.0,
            minimum_stock: 0,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_unit_value(mut self, unit_value: f64) -> Self {
        self.unit_value = unit_value;
        self
    }

    pub fn with_minimum_stock(mut self, minimum_stock: i64) -> Self {
        self.minimum_stock = minimum_stock;
        self
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.description.trim().is_empty() {
            return Err(LedgerError::incomplete("description cannot be empty"));
        }
        if self.category.trim().is_empty() {
            return Err(LedgerError::incomplete("category cannot be empty"));
        }
        if self.unit.trim().is_empty() {
            return Err(LedgerError::incomplete("unit of measure cannot be empty"));
        }
        if !self.unit_value.is_finite() || self.unit_value < 0.0 {
            return Err(LedgerError::invalid_quantity(format!(
                "unit value must be a non-negative number (got {})",
                self.unit_value
            )));
        }
        if self.minimum_stock < 0 {
            return Err(LedgerError::invalid_quantity(
                "minimum stock cannot be negative",
            ));
        }
        Ok(())
    }

    /// Swap the sku, keeping everything else (used when a planned sku collides).
    pub fn with_sku(mut self, sku: Sku) -> Self {
        self.sku = sku;
        self
    }
}

/// Case-insensitive matching key for descriptions.
pub fn description_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Capitalize the first letter of every word and lowercase the rest.
///
/// A word starts at any letter not preceded by another letter, so
/// `"PARAFUSO 10000045 M8"` becomes `"Parafuso 10000045 M8"`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.trim().chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
