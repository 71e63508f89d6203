//! Ledger persistence.
//!
//! [`LedgerStore`] is the single authoritative store. Each mutating method is
//! one atomic unit: either every row it touches changes, or none does.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;

use supplyledger_core::{ItemId, LedgerResult, PositionId};
use supplyledger_inventory::{
    Adjustment, AdjustmentRequest, Department, DescriptionMatch, Item, Movement, NewItem,
    NewMovement, Position, PositionDetail, PositionLabel, QuantityChange, Receipt, ReceiptPlan,
    Sku, SkuPolicy, StockFilter, StockLine, TransferOutcome, TransferRequest,
};
use supplyledger_receiving::{CatalogAccess, NewVendor, Vendor};

#[async_trait::async_trait]
pub trait LedgerStore: CatalogAccess + Send + Sync {
    fn sku_policy(&self) -> SkuPolicy;

    // Catalog

    async fn find_item(&self, id: ItemId) -> LedgerResult<Option<Item>>;

    async fn find_item_by_sku(&self, sku: &Sku) -> LedgerResult<Option<Item>>;

    async fn find_item_by_description(
        &self,
        text: &str,
        mode: DescriptionMatch,
    ) -> LedgerResult<Option<Item>>;

    /// Items whose description or sku contains `term`, ordered by description.
    async fn search_items(&self, term: &str, limit: usize) -> LedgerResult<Vec<Item>>;

    /// Fails with `DuplicateSku` when the sku is taken.
    async fn create_item(&self, new: NewItem) -> LedgerResult<Item>;

    async fn set_minimum_stock(&self, sku: &Sku, minimum: i64) -> LedgerResult<Item>;

    /// Resolve-or-create the position and apply `change`. A result at or
    /// below zero removes the row and yields `None`.
    async fn upsert_position(
        &self,
        item_id: ItemId,
        label: &PositionLabel,
        change: QuantityChange,
    ) -> LedgerResult<Option<Position>>;

    // Positions

    async fn find_position(&self, id: PositionId) -> LedgerResult<Option<Position>>;

    async fn positions_for_item(&self, item_id: ItemId) -> LedgerResult<Vec<Position>>;

    /// Positions joined with their items, ordered by description then label.
    async fn stock(&self, filter: &StockFilter) -> LedgerResult<Vec<StockLine>>;

    async fn position_detail(&self, id: PositionId) -> LedgerResult<Option<PositionDetail>>;

    // Departments and vendors

    async fn departments(&self) -> LedgerResult<Vec<Department>>;

    /// Case-insensitive resolve-or-create. The flag is true when created.
    async fn ensure_department(&self, name: &str) -> LedgerResult<(Department, bool)>;

    /// Fails with `DuplicateTaxId` when the tax id is registered.
    async fn register_vendor(&self, new: NewVendor) -> LedgerResult<Vendor>;

    async fn search_vendors(&self, term: &str, limit: usize) -> LedgerResult<Vec<Vendor>>;

    // Logs

    async fn record_movement(&self, new: NewMovement) -> LedgerResult<Movement>;

    /// Newest first.
    async fn movements(&self, limit: usize) -> LedgerResult<Vec<Movement>>;

    /// Newest first.
    async fn adjustments(&self, limit: usize) -> LedgerResult<Vec<Adjustment>>;

    async fn find_receipt_by_document(&self, number: &str) -> LedgerResult<Option<Receipt>>;

    // Workflows

    async fn execute_transfer(&self, request: &TransferRequest) -> LedgerResult<TransferOutcome>;

    async fn execute_receipt(&self, plan: ReceiptPlan) -> LedgerResult<Receipt>;

    async fn execute_adjustment(&self, request: &AdjustmentRequest) -> LedgerResult<Adjustment>;
}
