//! `supplyledger-core`: building blocks shared by every ledger crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the acting-user context and the ledger error model.

pub mod actor;
pub mod entity;
pub mod error;
pub mod id;

pub use actor::Actor;
pub use entity::Entity;
pub use error::{LedgerError, LedgerResult};
pub use id::{
    AdjustmentId, DepartmentId, ItemId, MovementId, PositionId, ReceiptId, ReceiptLineId,
    VendorId,
};
