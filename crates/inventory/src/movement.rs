use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyledger_core::{
    Actor, DepartmentId, Entity, ItemId, LedgerError, LedgerResult, MovementId,
};

use crate::item::title_case;

/// Kind of a recorded movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    /// Position to position.
    Transfer,
    /// Position to a consuming department.
    Out,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Transfer => "TRANSFER",
            MovementKind::Out => "OUT",
        }
    }
}

impl core::str::FromStr for MovementKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSFER" => Ok(MovementKind::Transfer),
            "OUT" => Ok(MovementKind::Out),
            other => Err(LedgerError::invalid_id(format!(
                "MovementKind: unknown kind {other}"
            ))),
        }
    }
}

/// Immutable audit record of stock leaving one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub item_id: ItemId,
    pub department_id: Option<DepartmentId>,
    pub kind: MovementKind,
    pub quantity: f64,
    pub origin_label: String,
    pub destination_label: String,
    pub occurred_at: DateTime<Utc>,
    pub user: Actor,
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input to the movement ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovement {
    pub item_id: ItemId,
    pub department_id: Option<DepartmentId>,
    pub kind: MovementKind,
    pub quantity: f64,
    pub origin_label: String,
    pub destination_label: String,
    pub user: Actor,
}

impl NewMovement {
    pub fn validate(&self) -> LedgerResult<()> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(LedgerError::invalid_quantity(format!(
                "movement quantity must be positive (got {})",
                self.quantity
            )));
        }
        if self.kind == MovementKind::Out && self.department_id.is_none() {
            return Err(LedgerError::incomplete("OUT movement requires a department"));
        }
        Ok(())
    }

    pub fn into_movement(self, id: MovementId, occurred_at: DateTime<Utc>) -> Movement {
        Movement {
            id,
            item_id: self.item_id,
            department_id: self.department_id,
            kind: self.kind,
            quantity: self.quantity,
            origin_label: self.origin_label,
            destination_label: self.destination_label,
            occurred_at,
            user: self.user,
        }
    }
}

/// Consuming department; target of `OUT` movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

impl Department {
    /// New department with its name in canonical (title-cased) form.
    pub fn named(raw: &str) -> LedgerResult<Self> {
        let name = canonical_department_name(raw);
        if name.is_empty() {
            return Err(LedgerError::incomplete("department name cannot be empty"));
        }
        Ok(Self {
            id: DepartmentId::new(),
            name,
        })
    }

    pub fn name_key(&self) -> String {
        department_key(&self.name)
    }
}

impl Entity for Department {
    type Id = DepartmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

pub fn canonical_department_name(raw: &str) -> String {
    title_case(raw)
}

/// Case-insensitive lookup key for department names.
pub fn department_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor::new("maria").unwrap()
    }

    fn new_movement(kind: MovementKind, quantity: f64) -> NewMovement {
        NewMovement {
            item_id: ItemId::new(),
            department_id: None,
            kind,
            quantity,
            origin_label: "A01".into(),
            destination_label: "A02".into(),
            user: actor(),
        }
    }

    #[test]
    fn kind_text_round_trip() {
        for kind in [MovementKind::Transfer, MovementKind::Out] {
            assert_eq!(kind.as_str().parse::<MovementKind>().unwrap(), kind);
        }
        assert!("IN".parse::<MovementKind>().is_err());
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        for q in [0.0, -1.0, f64::INFINITY] {
            assert!(matches!(
                new_movement(MovementKind::Transfer, q).validate(),
                Err(LedgerError::InvalidQuantity(_))
            ));
        }
        assert!(new_movement(MovementKind::Transfer, 0.5).validate().is_ok());
    }

    #[test]
    fn out_requires_department() {
        assert!(matches!(
            new_movement(MovementKind::Out, 1.0).validate(),
            Err(LedgerError::IncompleteInput(_))
        ));
    }

    #[test]
    fn department_names_are_title_cased() {
        let d = Department::named("  PICKING  ").unwrap();
        assert_eq!(d.name, "Picking");
        assert_eq!(d.name_key(), "picking");
        assert!(Department::named(" ").is_err());
    }
}
