use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use supplyledger_core::{
    AdjustmentId, DepartmentId, Entity, ItemId, LedgerError, LedgerResult, MovementId,
    PositionId, VendorId,
};
use supplyledger_inventory::{
    Adjustment, AdjustmentRequest, Department, DescriptionMatch, Destination, Item,
    LastMovement, Movement, NewItem, NewMovement, Position, PositionDetail, PositionLabel,
    QuantityChange, Receipt, ReceiptPlan, Sku, SkuPolicy, StockFilter, StockLine,
    TransferOutcome, TransferPlan, TransferRequest, TransferTarget, department_key,
};
use supplyledger_receiving::{CatalogAccess, LookupKey, NewVendor, TaxId, Vendor};

use super::LedgerStore;

/// In-memory ledger store.
///
/// Intended for tests/dev. Every operation runs under one lock; mutating
/// operations finish all their checks before changing anything, so a failed
/// operation leaves the state untouched.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    policy: SkuPolicy,
    state: RwLock<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    items: HashMap<ItemId, Item>,
    skus: HashMap<Sku, ItemId>,
    positions: HashMap<PositionId, Position>,
    position_keys: HashMap<(ItemId, PositionLabel), PositionId>,
    departments: HashMap<DepartmentId, Department>,
    department_keys: HashMap<String, DepartmentId>,
    vendors: HashMap<VendorId, Vendor>,
    tax_ids: HashMap<TaxId, VendorId>,
    movements: Vec<Movement>,
    adjustments: Vec<Adjustment>,
    receipts: Vec<Receipt>,
}

fn insert_entity<E: Entity>(map: &mut HashMap<E::Id, E>, entity: E) {
    map.insert(entity.id().clone(), entity);
}

impl InMemoryLedgerStore {
    pub fn new(policy: SkuPolicy) -> Self {
        Self {
            policy,
            state: RwLock::new(LedgerState::default()),
        }
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| LedgerError::persistence("lock poisoned"))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| LedgerError::persistence("lock poisoned"))
    }
}

impl LedgerState {
    fn item(&self, id: ItemId) -> LedgerResult<&Item> {
        self.items
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(format!("item {id}")))
    }

    fn item_by_sku(&self, sku: &str) -> Option<&Item> {
        let id = self.skus.get(sku)?;
        self.items.get(id)
    }

    fn item_by_description(&self, text: &str, mode: DescriptionMatch) -> Option<&Item> {
        self.items
            .values()
            .filter(|i| mode.matches(&i.description, text))
            .min_by(|a, b| a.sku.cmp(&b.sku))
    }

    /// Next synthetic sku, walking past codes already in the catalog.
    fn next_synthetic(&self, policy: SkuPolicy) -> LedgerResult<Sku> {
        let mut sku = policy.next_synthetic(self.skus.keys().map(Sku::as_str))?;
        while self.skus.contains_key(&sku) {
            sku = sku.successor()?;
        }
        Ok(sku)
    }

    fn insert_item(&mut self, item: Item) {
        self.skus.insert(item.sku.clone(), item.id);
        insert_entity(&mut self.items, item);
    }

    fn position_at(&self, item_id: ItemId, label: &PositionLabel) -> Option<&Position> {
        let id = self.position_keys.get(&(item_id, label.clone()))?;
        self.positions.get(id)
    }

    /// Apply a validated change to an existing item's position.
    fn apply_change(
        &mut self,
        item_id: ItemId,
        label: &PositionLabel,
        change: QuantityChange,
    ) -> Option<Position> {
        let key = (item_id, label.clone());
        let current = self
            .position_keys
            .get(&key)
            .and_then(|id| self.positions.get(id))
            .cloned();
        let next = change.apply(current.as_ref().map_or(0.0, |p| p.quantity));
        match current {
            Some(position) if next <= 0.0 => {
                self.remove_position(position.id);
                None
            }
            None if next <= 0.0 => None,
            Some(mut position) => {
                position.quantity = next;
                insert_entity(&mut self.positions, position.clone());
                Some(position)
            }
            None => {
                let position = Position::new(item_id, label.clone(), next);
                self.position_keys.insert(key, position.id);
                insert_entity(&mut self.positions, position.clone());
                Some(position)
            }
        }
    }

    fn remove_position(&mut self, id: PositionId) {
        if let Some(position) = self.positions.remove(&id) {
            self.position_keys.remove(&(position.item_id, position.label));
        }
    }

    fn stock_line(&self, position: &Position) -> Option<StockLine> {
        let item = self.items.get(&position.item_id)?;
        Some(StockLine::join(position, item))
    }

    fn department_by_name(&self, name: &str) -> Option<&Department> {
        let id = self.department_keys.get(&department_key(name))?;
        self.departments.get(id)
    }

    fn insert_department(&mut self, department: Department) {
        self.department_keys
            .insert(department.name_key(), department.id);
        insert_entity(&mut self.departments, department);
    }

    fn ensure_department(&mut self, name: &str) -> LedgerResult<(Department, bool)> {
        if let Some(existing) = self.department_by_name(name) {
            return Ok((existing.clone(), false));
        }
        let department = Department::named(name)?;
        self.insert_department(department.clone());
        Ok((department, true))
    }

    fn record_movement(&mut self, new: NewMovement, at: DateTime<Utc>) -> LedgerResult<Movement> {
        new.validate()?;
        self.item(new.item_id)?;
        if let Some(department_id) = new.department_id {
            if !self.departments.contains_key(&department_id) {
                return Err(LedgerError::not_found(format!("department {department_id}")));
            }
        }
        let movement = new.into_movement(MovementId::new(), at);
        self.movements.push(movement.clone());
        Ok(movement)
    }

    fn transfer(&mut self, request: &TransferRequest, at: DateTime<Utc>) -> LedgerResult<TransferOutcome> {
        let item_id = self
            .item_by_sku(request.sku.as_str())
            .ok_or_else(|| LedgerError::not_found(format!("item with sku {}", request.sku)))?
            .id;
        let origin = self.position_at(item_id, &request.origin).cloned().ok_or_else(|| {
            LedgerError::not_found(format!(
                "position {} for sku {}",
                request.origin, request.sku
            ))
        })?;
        let plan = TransferPlan::decide(&origin, request)?;

        // Destination first: nothing has changed yet if it fails.
        let (target, department_id) = match &request.destination {
            Destination::ToDepartment(name) => {
                let (department, created) = match self.department_by_name(name) {
                    Some(existing) => (existing.clone(), false),
                    None => (Department::named(name)?, true),
                };
                if created {
                    self.insert_department(department.clone());
                }
                let id = department.id;
                (TransferTarget::Department { department, created }, Some(id))
            }
            Destination::ToPosition(label) => {
                let credited = self
                    .apply_change(item_id, label, QuantityChange::Delta(plan.quantity))
                    .ok_or_else(|| LedgerError::persistence("destination position not credited"))?;
                (TransferTarget::Position(credited), None)
            }
        };

        let origin_after = if plan.drains_origin() {
            self.remove_position(origin.id);
            None
        } else {
            let mut updated = origin;
            updated.quantity = plan.origin_remaining;
            insert_entity(&mut self.positions, updated.clone());
            Some(updated)
        };

        let movement = NewMovement {
            item_id,
            department_id,
            kind: request.destination.kind(),
            quantity: plan.quantity,
            origin_label: request.origin.as_str().to_string(),
            destination_label: request.destination_label.clone(),
            user: request.user.clone(),
        }
        .into_movement(MovementId::new(), at);
        self.movements.push(movement.clone());

        Ok(TransferOutcome {
            movement,
            origin: origin_after,
            target,
        })
    }

    fn receipt(&mut self, plan: ReceiptPlan) -> LedgerResult<Receipt> {
        let receipt = plan.receipt.clone();
        if !self.vendors.contains_key(&receipt.vendor_id) {
            return Err(LedgerError::not_found(format!("vendor {}", receipt.vendor_id)));
        }
        for (index, line) in receipt.lines.iter().enumerate() {
            if !self.items.contains_key(&line.item_id) {
                return Err(LedgerError::not_found(format!(
                    "line {}: item {}",
                    index + 1,
                    line.item_id
                )));
            }
        }

        for (item_id, label, quantity) in plan.credits() {
            self.apply_change(item_id, label, QuantityChange::Delta(quantity));
        }
        for (item_id, unit_value) in plan.unit_values() {
            if let Some(item) = self.items.get_mut(&item_id) {
                item.unit_value = unit_value;
            }
        }
        self.receipts.push(receipt.clone());
        Ok(receipt)
    }

    fn adjustment(&mut self, request: &AdjustmentRequest, at: DateTime<Utc>) -> LedgerResult<Adjustment> {
        let position = self
            .positions
            .get_mut(&request.position_id)
            .ok_or_else(|| LedgerError::not_found(format!("position {}", request.position_id)))?;
        let adjustment = request.decide(position, AdjustmentId::new(), at);
        position.quantity = request.new_quantity;
        self.adjustments.push(adjustment.clone());
        Ok(adjustment)
    }
}

#[async_trait::async_trait]
impl CatalogAccess for InMemoryLedgerStore {
    async fn lookup(&self, key: &LookupKey) -> LedgerResult<Option<Item>> {
        let state = self.read()?;
        Ok(match key {
            LookupKey::Sku(sku) => state.item_by_sku(sku).cloned(),
            LookupKey::Description(text) => state
                .item_by_description(text, DescriptionMatch::Exact)
                .cloned(),
        })
    }

    async fn next_synthetic_sku(&self) -> LedgerResult<Sku> {
        self.read()?.next_synthetic(self.policy)
    }

    async fn provision_items(&self, items: Vec<NewItem>) -> LedgerResult<Vec<Item>> {
        for new in &items {
            new.validate()?;
        }
        let mut state = self.write()?;
        let mut created = Vec::with_capacity(items.len());
        for new in items {
            let new = if state.skus.contains_key(&new.sku) {
                let replacement = state.next_synthetic(self.policy)?;
                tracing::warn!(taken = %new.sku, %replacement, "planned sku taken; using synthetic");
                new.with_sku(replacement)
            } else {
                new
            };
            let item = Item::from_new(ItemId::new(), new);
            state.insert_item(item.clone());
            created.push(item);
        }
        Ok(created)
    }

    async fn find_vendor_by_tax_id(&self, tax_id: &TaxId) -> LedgerResult<Option<Vendor>> {
        let state = self.read()?;
        Ok(state
            .tax_ids
            .get(tax_id)
            .and_then(|id| state.vendors.get(id))
            .cloned())
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    fn sku_policy(&self) -> SkuPolicy {
        self.policy
    }

    async fn find_item(&self, id: ItemId) -> LedgerResult<Option<Item>> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn find_item_by_sku(&self, sku: &Sku) -> LedgerResult<Option<Item>> {
        Ok(self.read()?.item_by_sku(sku.as_str()).cloned())
    }

    async fn find_item_by_description(
        &self,
        text: &str,
        mode: DescriptionMatch,
    ) -> LedgerResult<Option<Item>> {
        Ok(self.read()?.item_by_description(text, mode).cloned())
    }

    async fn search_items(&self, term: &str, limit: usize) -> LedgerResult<Vec<Item>> {
        let term = term.trim().to_lowercase();
        let state = self.read()?;
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|i| {
                i.description.to_lowercase().contains(&term)
                    || i.sku.as_str().to_lowercase().contains(&term)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.description.cmp(&b.description).then(a.sku.cmp(&b.sku)));
        items.truncate(limit);
        Ok(items)
    }

    async fn create_item(&self, new: NewItem) -> LedgerResult<Item> {
        new.validate()?;
        let mut state = self.write()?;
        if state.skus.contains_key(&new.sku) {
            return Err(LedgerError::duplicate_sku(new.sku.as_str()));
        }
        let item = Item::from_new(ItemId::new(), new);
        state.insert_item(item.clone());
        Ok(item)
    }

    async fn set_minimum_stock(&self, sku: &Sku, minimum: i64) -> LedgerResult<Item> {
        if minimum < 0 {
            return Err(LedgerError::invalid_quantity("minimum stock cannot be negative"));
        }
        let mut state = self.write()?;
        let id = *state
            .skus
            .get(sku)
            .ok_or_else(|| LedgerError::not_found(format!("item with sku {sku}")))?;
        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found(format!("item {id}")))?;
        item.minimum_stock = minimum;
        Ok(item.clone())
    }

    async fn upsert_position(
        &self,
        item_id: ItemId,
        label: &PositionLabel,
        change: QuantityChange,
    ) -> LedgerResult<Option<Position>> {
        change.validate()?;
        let mut state = self.write()?;
        state.item(item_id)?;
        Ok(state.apply_change(item_id, label, change))
    }

    async fn find_position(&self, id: PositionId) -> LedgerResult<Option<Position>> {
        Ok(self.read()?.positions.get(&id).cloned())
    }

    async fn positions_for_item(&self, item_id: ItemId) -> LedgerResult<Vec<Position>> {
        let state = self.read()?;
        let mut positions: Vec<Position> = state
            .positions
            .values()
            .filter(|p| p.item_id == item_id)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(positions)
    }

    async fn stock(&self, filter: &StockFilter) -> LedgerResult<Vec<StockLine>> {
        let state = self.read()?;
        let mut lines: Vec<StockLine> = state
            .positions
            .values()
            .filter_map(|p| state.stock_line(p))
            .filter(|l| filter.matches(l))
            .collect();
        lines.sort_by(|a, b| a.description.cmp(&b.description).then(a.label.cmp(&b.label)));
        Ok(lines)
    }

    async fn position_detail(&self, id: PositionId) -> LedgerResult<Option<PositionDetail>> {
        let state = self.read()?;
        let Some(position) = state.positions.get(&id) else {
            return Ok(None);
        };
        let Some(line) = state.stock_line(position) else {
            return Ok(None);
        };
        let label = position.label.as_str();
        let last_movement = state
            .movements
            .iter()
            .rev()
            .find(|m| {
                m.item_id == position.item_id
                    && (m.origin_label == label || m.destination_label == label)
            })
            .map(|m| LastMovement {
                occurred_at: m.occurred_at,
                user: m.user.to_string(),
            });
        Ok(Some(PositionDetail {
            line,
            last_movement,
        }))
    }

    async fn departments(&self) -> LedgerResult<Vec<Department>> {
        let mut departments: Vec<Department> =
            self.read()?.departments.values().cloned().collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn ensure_department(&self, name: &str) -> LedgerResult<(Department, bool)> {
        self.write()?.ensure_department(name)
    }

    async fn register_vendor(&self, new: NewVendor) -> LedgerResult<Vendor> {
        let mut state = self.write()?;
        if state.tax_ids.contains_key(&new.tax_id) {
            return Err(LedgerError::duplicate_tax_id(new.tax_id.as_str()));
        }
        let vendor = Vendor::from_new(VendorId::new(), new);
        state.tax_ids.insert(vendor.tax_id.clone(), vendor.id);
        insert_entity(&mut state.vendors, vendor.clone());
        Ok(vendor)
    }

    async fn search_vendors(&self, term: &str, limit: usize) -> LedgerResult<Vec<Vendor>> {
        let state = self.read()?;
        let mut vendors: Vec<Vendor> = state
            .vendors
            .values()
            .filter(|v| v.active && v.matches(term))
            .cloned()
            .collect();
        vendors.sort_by(|a, b| a.legal_name.cmp(&b.legal_name));
        vendors.truncate(limit);
        Ok(vendors)
    }

    async fn record_movement(&self, new: NewMovement) -> LedgerResult<Movement> {
        let at = Utc::now();
        self.write()?.record_movement(new, at)
    }

    async fn movements(&self, limit: usize) -> LedgerResult<Vec<Movement>> {
        Ok(self.read()?.movements.iter().rev().take(limit).cloned().collect())
    }

    async fn adjustments(&self, limit: usize) -> LedgerResult<Vec<Adjustment>> {
        Ok(self.read()?.adjustments.iter().rev().take(limit).cloned().collect())
    }

    async fn find_receipt_by_document(&self, number: &str) -> LedgerResult<Option<Receipt>> {
        let number = number.trim();
        Ok(self
            .read()?
            .receipts
            .iter()
            .rev()
            .find(|r| r.document_number == number)
            .cloned())
    }

    async fn execute_transfer(&self, request: &TransferRequest) -> LedgerResult<TransferOutcome> {
        let at = Utc::now();
        self.write()?.transfer(request, at)
    }

    async fn execute_receipt(&self, plan: ReceiptPlan) -> LedgerResult<Receipt> {
        self.write()?.receipt(plan)
    }

    async fn execute_adjustment(&self, request: &AdjustmentRequest) -> LedgerResult<Adjustment> {
        let at = Utc::now();
        self.write()?.adjustment(request, at)
    }
}
