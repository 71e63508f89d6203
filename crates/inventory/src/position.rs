use serde::{Deserialize, Serialize};

use supplyledger_core::{Entity, ItemId, LedgerError, LedgerResult, PositionId};

/// Storage location label with all whitespace removed.
///
/// `"A-01 02"` and `"A-0102"` name the same position. Case is kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionLabel(String);

impl PositionLabel {
    pub fn new(raw: impl AsRef<str>) -> LedgerResult<Self> {
        let label = normalize_label(raw.as_ref());
        if label.is_empty() {
            return Err(LedgerError::incomplete("position label cannot be empty"));
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for PositionLabel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip every whitespace character from a label.
pub fn normalize_label(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Quantity of one item held at one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub item_id: ItemId,
    pub label: PositionLabel,
    pub quantity: f64,
}

impl Position {
    pub fn new(item_id: ItemId, label: PositionLabel, quantity: f64) -> Self {
        Self {
            id: PositionId::new(),
            item_id,
            label,
            quantity,
        }
    }
}

impl Entity for Position {
    type Id = PositionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// How `upsert_position` changes the stored quantity.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuantityChange {
    /// Add (or subtract, when negative) to the current quantity.
    Delta(f64),
    /// Replace the current quantity.
    Absolute(f64),
}

impl QuantityChange {
    /// Quantity after applying the change to `current` (zero when absent).
    pub fn apply(self, current: f64) -> f64 {
        match self {
            QuantityChange::Delta(d) => current + d,
            QuantityChange::Absolute(q) => q,
        }
    }

    pub fn validate(self) -> LedgerResult<()> {
        let value = match self {
            QuantityChange::Delta(d) => d,
            QuantityChange::Absolute(q) => q,
        };
        if !value.is_finite() {
            return Err(LedgerError::invalid_quantity(format!(
                "quantity must be finite (got {value})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_stripped_everywhere() {
        let a = PositionLabel::new("A-01 02").unwrap();
        let b = PositionLabel::new(" A-0102\t").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "A-0102");
    }

    #[test]
    fn case_is_preserved() {
        assert_eq!(PositionLabel::new("b 07").unwrap().as_str(), "b07");
    }

    #[test]
    fn blank_label_is_incomplete() {
        assert!(matches!(
            PositionLabel::new(" \n "),
            Err(LedgerError::IncompleteInput(_))
        ));
    }

    #[test]
    fn quantity_change_applies() {
        assert_eq!(QuantityChange::Delta(-4.0).apply(10.0), 6.0);
        assert_eq!(QuantityChange::Absolute(47.0).apply(50.0), 47.0);
        assert!(QuantityChange::Delta(f64::NAN).validate().is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Normalizing an already-normalized label changes nothing.
            #[test]
            fn normalization_is_idempotent(raw in "[A-Za-z0-9 \t-]{1,24}") {
                let once = normalize_label(&raw);
                prop_assert_eq!(normalize_label(&once), once.clone());
                prop_assert!(!once.chars().any(char::is_whitespace));
            }
        }
    }
}
