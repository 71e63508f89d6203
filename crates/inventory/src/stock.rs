//! Read-side shapes for stock queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyledger_core::{ItemId, PositionId};

use crate::item::{Item, Sku};
use crate::position::{Position, normalize_label};

/// Availability of an item at a position relative to its minimum-stock threshold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    Ok,
    Low,
    Out,
}

impl StockStatus {
    /// Items without a positive minimum are always `Ok`.
    pub fn classify(quantity: f64, minimum_stock: i64) -> Self {
        if minimum_stock <= 0 {
            return StockStatus::Ok;
        }
        if quantity <= 0.0 {
            StockStatus::Out
        } else if quantity < minimum_stock as f64 {
            StockStatus::Low
        } else {
            StockStatus::Ok
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Ok => "OK",
            StockStatus::Low => "LOW",
            StockStatus::Out => "OUT",
        }
    }
}

/// One position joined with its item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLine {
    pub position_id: PositionId,
    pub item_id: ItemId,
    pub sku: Sku,
    pub description: String,
    pub label: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_value: f64,
    pub total_value: f64,
    pub status: StockStatus,
}

impl StockLine {
    pub fn join(position: &Position, item: &Item) -> Self {
        Self {
            position_id: position.id,
            item_id: item.id,
            sku: item.sku.clone(),
            description: item.description.clone(),
            label: position.label.as_str().to_string(),
            quantity: position.quantity,
            unit: item.unit.clone(),
            unit_value: item.unit_value,
            total_value: position.quantity * item.unit_value,
            status: StockStatus::classify(position.quantity, item.minimum_stock),
        }
    }
}

/// Filter for stock listings. Both parts are case-insensitive substring matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockFilter {
    /// Matches item description or sku.
    pub item: Option<String>,
    /// Matches the position label; whitespace in the filter is ignored.
    pub position: Option<String>,
}

impl StockFilter {
    pub fn item(mut self, term: impl Into<String>) -> Self {
        self.item = Some(term.into());
        self
    }

    pub fn position(mut self, term: impl Into<String>) -> Self {
        self.position = Some(term.into());
        self
    }

    pub fn matches(&self, line: &StockLine) -> bool {
        if let Some(term) = self.item_term() {
            let in_desc = line.description.to_lowercase().contains(&term);
            let in_sku = line.sku.as_str().to_lowercase().contains(&term);
            if !in_desc && !in_sku {
                return false;
            }
        }
        if let Some(term) = self.position_term() {
            if !line.label.to_lowercase().contains(&term) {
                return false;
            }
        }
        true
    }

    /// Lowercased item term, `None` when absent or blank.
    pub fn item_term(&self) -> Option<String> {
        self.item
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }

    /// Normalized, lowercased position term, `None` when absent or blank.
    pub fn position_term(&self) -> Option<String> {
        self.position
            .as_deref()
            .map(normalize_label)
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }
}

/// Matching mode for description lookups.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptionMatch {
    Exact,
    Contains,
}

impl DescriptionMatch {
    pub fn matches(self, description: &str, text: &str) -> bool {
        let key = crate::item::description_key(text);
        let candidate = crate::item::description_key(description);
        match self {
            DescriptionMatch::Exact => candidate == key,
            DescriptionMatch::Contains => candidate.contains(&key),
        }
    }
}

/// Who last moved stock into or out of a position, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMovement {
    pub occurred_at: DateTime<Utc>,
    pub user: String,
}

/// Stock line plus its most recent movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDetail {
    pub line: StockLine,
    pub last_movement: Option<LastMovement>,
}
