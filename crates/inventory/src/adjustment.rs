use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyledger_core::{
    Actor, AdjustmentId, Entity, ItemId, LedgerError, LedgerResult, PositionId,
};

use crate::position::Position;

/// Manual count correction of one position. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub position_id: PositionId,
    /// Snapshot of the position's item and label at adjustment time.
    pub item_id: ItemId,
    pub label: String,
    pub quantity_before: f64,
    pub quantity_after: f64,
    /// `quantity_after - quantity_before`.
    pub difference: f64,
    pub occurred_at: DateTime<Utc>,
    pub user: Actor,
    pub note: String,
}

impl Entity for Adjustment {
    type Id = AdjustmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentRequest {
    pub position_id: PositionId,
    pub new_quantity: f64,
    pub user: Actor,
    pub note: String,
}

impl AdjustmentRequest {
    pub fn new(
        position_id: PositionId,
        new_quantity: f64,
        user: &str,
        note: Option<&str>,
    ) -> LedgerResult<Self> {
        if !new_quantity.is_finite() || new_quantity < 0.0 {
            return Err(LedgerError::invalid_quantity(format!(
                "counted quantity cannot be negative (got {new_quantity})"
            )));
        }
        let user = Actor::new(user)?;
        let note = match note.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => default_note(&user),
        };
        Ok(Self {
            position_id,
            new_quantity,
            user,
            note,
        })
    }

    /// Build the adjustment record against the position's current state.
    pub fn decide(
        &self,
        position: &Position,
        id: AdjustmentId,
        occurred_at: DateTime<Utc>,
    ) -> Adjustment {
        Adjustment {
            id,
            position_id: position.id,
            item_id: position.item_id,
            label: position.label.as_str().to_string(),
            quantity_before: position.quantity,
            quantity_after: self.new_quantity,
            difference: self.new_quantity - position.quantity,
            occurred_at,
            user: self.user.clone(),
            note: self.note.clone(),
        }
    }
}

pub fn default_note(user: &Actor) -> String {
    format!("manual count adjustment by {user}")
}
