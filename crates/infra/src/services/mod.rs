//! Application services over a [`LedgerStore`](crate::store::LedgerStore).
//!
//! Services parse and validate raw caller input, run the pure decision
//! functions from the domain crates, then hand one atomic unit of work to the
//! store.

pub mod adjustment;
pub mod catalog;
pub mod movement_ledger;
pub mod receiving;
pub mod transfer;

pub use adjustment::AdjustmentTrail;
pub use catalog::CatalogService;
pub use movement_ledger::MovementLedger;
pub use receiving::ReceivingWorkflow;
pub use transfer::TransferEngine;
