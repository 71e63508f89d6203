use std::sync::Arc;

use tracing::instrument;

use supplyledger_core::{ItemId, LedgerError, LedgerResult, PositionId};
use supplyledger_inventory::{
    Department, DescriptionMatch, Item, NewItem, Position, PositionDetail, PositionLabel,
    QuantityChange, Sku, StockFilter, StockLine,
};
use supplyledger_receiving::{CatalogAccess, NewVendor, TaxId, Vendor};

use crate::config::LedgerConfig;
use crate::store::LedgerStore;

/// Items, positions, departments and vendors.
pub struct CatalogService<S> {
    store: Arc<S>,
    search_limit: usize,
}

impl<S: LedgerStore> CatalogService<S> {
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Self {
        Self {
            store,
            search_limit: config.search_limit,
        }
    }

    pub async fn find_by_sku(&self, sku: &str) -> LedgerResult<Option<Item>> {
        let sku = Sku::new(sku)?;
        self.store.find_item_by_sku(&sku).await
    }

    pub async fn find_by_description(
        &self,
        text: &str,
        mode: DescriptionMatch,
    ) -> LedgerResult<Option<Item>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        self.store.find_item_by_description(text, mode).await
    }

    /// Up to the configured search limit. A blank term returns nothing.
    pub async fn search_items(&self, term: &str) -> LedgerResult<Vec<Item>> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.store.search_items(term, self.search_limit).await
    }

    #[instrument(skip(self, new), fields(sku = %new.sku), err)]
    pub async fn create_item(&self, new: NewItem) -> LedgerResult<Item> {
        let item = self.store.create_item(new).await?;
        tracing::info!(item_id = %item.id, "item created");
        Ok(item)
    }

    pub async fn set_minimum_stock(&self, sku: &str, minimum: i64) -> LedgerResult<Item> {
        let sku = Sku::new(sku)?;
        self.store.set_minimum_stock(&sku, minimum).await
    }

    /// Create or change the position of `sku` at `label`.
    #[instrument(skip(self), err)]
    pub async fn upsert_position(
        &self,
        sku: &str,
        label: &str,
        change: QuantityChange,
    ) -> LedgerResult<Option<Position>> {
        let label = PositionLabel::new(label)?;
        change.validate()?;
        let item = self.require_item(sku).await?;
        self.store.upsert_position(item.id, &label, change).await
    }

    pub async fn stock(&self, filter: &StockFilter) -> LedgerResult<Vec<StockLine>> {
        self.store.stock(filter).await
    }

    pub async fn positions_for_sku(&self, sku: &str) -> LedgerResult<Vec<Position>> {
        let item = self.require_item(sku).await?;
        self.store.positions_for_item(item.id).await
    }

    pub async fn positions_for_item(&self, item_id: ItemId) -> LedgerResult<Vec<Position>> {
        self.store.positions_for_item(item_id).await
    }

    pub async fn position_detail(&self, id: PositionId) -> LedgerResult<PositionDetail> {
        self.store
            .position_detail(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("position {id}")))
    }

    pub async fn next_synthetic_sku(&self) -> LedgerResult<Sku> {
        self.store.next_synthetic_sku().await
    }

    pub async fn departments(&self) -> LedgerResult<Vec<Department>> {
        self.store.departments().await
    }

    /// Register each name not yet known. Returns the departments created.
    #[instrument(skip(self, names), err)]
    pub async fn seed_departments(&self, names: &[&str]) -> LedgerResult<Vec<Department>> {
        let mut created = Vec::new();
        for name in names {
            let (department, was_created) = self.store.ensure_department(name).await?;
            if was_created {
                created.push(department);
            }
        }
        tracing::info!(created = created.len(), "departments seeded");
        Ok(created)
    }

    #[instrument(skip(self, new), fields(tax_id = %new.tax_id), err)]
    pub async fn register_vendor(&self, new: NewVendor) -> LedgerResult<Vendor> {
        self.store.register_vendor(new).await
    }

    pub async fn find_vendor_by_tax_id(&self, tax_id: &str) -> LedgerResult<Option<Vendor>> {
        let tax_id = TaxId::new(tax_id)?;
        self.store.find_vendor_by_tax_id(&tax_id).await
    }

    pub async fn search_vendors(&self, term: &str) -> LedgerResult<Vec<Vendor>> {
        self.store.search_vendors(term, self.search_limit).await
    }

    async fn require_item(&self, sku: &str) -> LedgerResult<Item> {
        let sku = Sku::new(sku)?;
        self.store
            .find_item_by_sku(&sku)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("item with sku {sku}")))
    }
}
