//! Transfer decisions.
//!
//! A transfer is decided here against a snapshot of the origin position and
//! then executed by a store in one transaction. Nothing in this module touches
//! storage.

use serde::{Deserialize, Serialize};

use supplyledger_core::{Actor, LedgerError, LedgerResult};

use crate::item::Sku;
use crate::movement::{Department, Movement, MovementKind};
use crate::position::{Position, PositionLabel};

/// Reserved prefix that routes a destination to a consuming department.
pub const DEFAULT_DEPARTMENT_PREFIX: &str = "SETOR-";

/// Where transferred stock goes. Decided once from the raw destination text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    ToPosition(PositionLabel),
    /// Department name as typed after the prefix.
    ToDepartment(String),
}

impl Destination {
    /// `"SETOR-Picking"` (any case of the prefix) becomes a department, anything
    /// else a position label.
    pub fn parse(raw: &str, department_prefix: &str) -> LedgerResult<Self> {
        let trimmed = raw.trim();
        if let Some(rest) = strip_prefix_ignore_case(trimmed, department_prefix) {
            let name = rest.trim();
            if name.is_empty() {
                return Err(LedgerError::incomplete(
                    "department destination is missing a name",
                ));
            }
            return Ok(Destination::ToDepartment(name.to_string()));
        }
        Ok(Destination::ToPosition(PositionLabel::new(trimmed)?))
    }

    /// Label written to the movement's destination column.
    pub fn label(&self, department_prefix: &str) -> String {
        match self {
            Destination::ToPosition(label) => label.as_str().to_string(),
            Destination::ToDepartment(name) => format!("{department_prefix}{name}"),
        }
    }

    pub fn kind(&self) -> MovementKind {
        match self {
            Destination::ToPosition(_) => MovementKind::Transfer,
            Destination::ToDepartment(_) => MovementKind::Out,
        }
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() || text.len() < prefix.len() || !text.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, rest) = text.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix).then_some(rest)
}

/// A validated transfer request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub sku: Sku,
    pub origin: PositionLabel,
    pub quantity: f64,
    pub destination: Destination,
    /// Text stored as the movement's destination label.
    pub destination_label: String,
    pub user: Actor,
}

impl TransferRequest {
    pub fn new(
        sku: &str,
        origin: &str,
        quantity: f64,
        destination: &str,
        user: &str,
        department_prefix: &str,
    ) -> LedgerResult<Self> {
        let sku = Sku::new(sku)?;
        let origin = PositionLabel::new(origin)?;
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(LedgerError::invalid_quantity(format!(
                "transfer quantity must be positive (got {quantity})"
            )));
        }
        if destination.trim().is_empty() {
            return Err(LedgerError::incomplete("destination is required"));
        }
        let user = Actor::new(user)?;
        let destination = Destination::parse(destination, department_prefix)?;
        if let Destination::ToPosition(label) = &destination {
            if *label == origin {
                return Err(LedgerError::incomplete(
                    "destination must differ from the origin position",
                ));
            }
        }
        let destination_label = destination.label(department_prefix);
        Ok(Self {
            sku,
            origin,
            quantity,
            destination,
            destination_label,
            user,
        })
    }
}

/// Outcome of checking a request against the origin it would debit.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    pub quantity: f64,
    pub origin_remaining: f64,
}

impl TransferPlan {
    pub fn decide(origin: &Position, request: &TransferRequest) -> LedgerResult<Self> {
        if request.quantity > origin.quantity {
            return Err(LedgerError::insufficient(request.quantity, origin.quantity));
        }
        Ok(Self {
            quantity: request.quantity,
            origin_remaining: origin.quantity - request.quantity,
        })
    }

    /// The origin row is removed once nothing is left in it.
    pub fn drains_origin(&self) -> bool {
        self.origin_remaining <= 0.0
    }
}

/// What a completed transfer produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub movement: Movement,
    /// Origin after the debit; `None` when it was drained and deleted.
    pub origin: Option<Position>,
    pub target: TransferTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferTarget {
    Position(Position),
    Department { department: Department, created: bool },
}
