//! Inventory ledger domain.
//!
//! Catalog items, stock positions, movements, receipts and count adjustments,
//! together with the pure decision logic for every mutating workflow. No IO
//! happens here; stores in `supplyledger-infra` execute the decisions.

pub mod adjustment;
pub mod item;
pub mod movement;
pub mod position;
pub mod receipt;
pub mod stock;
pub mod transfer;

pub use adjustment::{Adjustment, AdjustmentRequest, default_note};
pub use item::{
    DEFAULT_CATEGORY, DEFAULT_UNIT, Item, NewItem, Sku, SkuPolicy, description_key, title_case,
};
pub use movement::{
    Department, Movement, MovementKind, NewMovement, canonical_department_name, department_key,
};
pub use position::{Position, PositionLabel, QuantityChange, normalize_label};
pub use receipt::{
    ConferenceStatus, DEFAULT_DOCUMENT_KIND, Receipt, ReceiptDraft, ReceiptLine,
    ReceiptLineDraft, ReceiptPlan,
};
pub use stock::{
    DescriptionMatch, LastMovement, PositionDetail, StockFilter, StockLine, StockStatus,
};
pub use transfer::{
    DEFAULT_DEPARTMENT_PREFIX, Destination, TransferOutcome, TransferPlan, TransferRequest,
    TransferTarget,
};
