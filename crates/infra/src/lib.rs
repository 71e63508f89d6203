//! Infrastructure layer: configuration, ledger stores and application services.

pub mod config;
pub mod services;
pub mod store;

pub use config::{ConfigError, LedgerConfig};
pub use services::{
    AdjustmentTrail, CatalogService, MovementLedger, ReceivingWorkflow, TransferEngine,
};
pub use store::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore};

#[cfg(test)]
mod integration_tests;
