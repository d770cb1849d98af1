use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;

use stocktrail_core::{
    BatchId, ChangeDetails, ChangeRecord, ChangedField, EntityType, Lot, LotId, LotPayload,
    PaginatedBatchGroups, Product, ProductId, group_records,
};
use stocktrail_engine::{
    NewProduct, ProductBatchContextPayload, ProductPatch, RemoteApi, RemoteError,
};

/// Reference server of record for connected-mode tests.
///
/// Mirrors the real backend's contract: it records its own audit entries
/// for every accepted mutation, recomputes derived product quantities on
/// lot changes, and returns authoritative snapshots. Grouped history is
/// served through the same grouping code the local read path uses.
#[derive(Default)]
pub struct InMemoryServer {
    products: Vec<Product>,
    history: Vec<ChangeRecord>,
    fail_next_calls: u32,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<Product>) -> Self {
        Self {
            products,
            ..Self::default()
        }
    }

    /// Make the next `n` api calls fail with `RemoteError::Unavailable`.
    pub fn fail_next_calls(&mut self, n: u32) {
        self.fail_next_calls = n;
    }

    fn take_failure(&mut self) -> Result<(), RemoteError> {
        if self.fail_next_calls > 0 {
            self.fail_next_calls -= 1;
            return Err(RemoteError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    fn record(
        &mut self,
        entity_type: EntityType,
        entity_id: String,
        details: ChangeDetails,
        batch: Option<BatchId>,
    ) {
        self.history
            .push(ChangeRecord::new(entity_type, entity_id, details, batch));
    }

    fn product_mut(&mut self, id: ProductId) -> Result<&mut Product, RemoteError> {
        self.products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RemoteError::Rejected(format!("product not found: {id}")))
    }

    fn recompute_quantity(product: &mut Product) {
        product.quantity = stocktrail_core::derive_quantity(product);
    }

    fn fetch_products(&mut self) -> Result<Vec<Product>, RemoteError> {
        self.take_failure()?;
        Ok(self.products.clone())
    }

    fn create_product(&mut self, payload: &NewProduct) -> Result<Product, RemoteError> {
        self.take_failure()?;
        if payload.name.trim().is_empty() {
            return Err(RemoteError::Rejected("product name is required".into()));
        }
        let product = Product::new(
            payload.name.trim(),
            payload.unit,
            payload.quantity.unwrap_or(0.0),
        );
        self.products.push(product.clone());
        self.record(
            EntityType::Product,
            product.id.to_string(),
            ChangeDetails::created(product.name.clone(), product.quantity),
            None,
        );
        Ok(product)
    }

    fn update_product(
        &mut self,
        id: ProductId,
        patch: &ProductPatch,
        batch: Option<BatchId>,
    ) -> Result<Product, RemoteError> {
        self.take_failure()?;
        let product = self.product_mut(id)?;

        let old_name = product.name.clone();
        let old_unit = product.unit;
        let old_quantity = product.quantity;

        if let Some(name) = &patch.name {
            product.name = name.trim().to_string();
        }
        if let Some(unit) = patch.unit {
            product.unit = unit;
        }
        if let Some(quantity) = patch.quantity {
            if !product.lots.is_empty() {
                product.name = old_name;
                product.unit = old_unit;
                return Err(RemoteError::Rejected(
                    "quantity of a lot-tracked product is derived".into(),
                ));
            }
            product.quantity = quantity;
        }
        let snapshot = product.clone();

        let mut changed_fields = Vec::new();
        if snapshot.name != old_name {
            changed_fields.push(ChangedField {
                field: "name".into(),
                old_value: old_name.clone().into(),
                new_value: snapshot.name.clone().into(),
            });
        }
        if snapshot.unit != old_unit {
            changed_fields.push(ChangedField {
                field: "unit".into(),
                old_value: old_unit.as_str().into(),
                new_value: snapshot.unit.as_str().into(),
            });
        }
        if !changed_fields.is_empty() {
            self.record(
                EntityType::Product,
                id.to_string(),
                ChangeDetails::product_details_updated(snapshot.name.clone(), changed_fields),
                batch,
            );
        }
        if snapshot.quantity != old_quantity {
            self.record(
                EntityType::Product,
                id.to_string(),
                ChangeDetails::quantity_adjusted(
                    snapshot.name.clone(),
                    old_quantity,
                    snapshot.quantity,
                ),
                batch,
            );
        }
        Ok(snapshot)
    }

    fn delete_product(&mut self, id: ProductId, batch: Option<BatchId>) -> Result<(), RemoteError> {
        self.take_failure()?;
        let idx = self
            .products
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| RemoteError::Rejected(format!("product not found: {id}")))?;
        let removed = self.products.remove(idx);
        self.record(
            EntityType::Product,
            id.to_string(),
            ChangeDetails::deleted(removed.name.clone(), stocktrail_core::derive_quantity(&removed)),
            batch,
        );
        Ok(())
    }

    fn create_lot(
        &mut self,
        product_id: ProductId,
        payload: &LotPayload,
        batch: Option<BatchId>,
    ) -> Result<Lot, RemoteError> {
        self.take_failure()?;
        payload
            .validate()
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;
        let product = self.product_mut(product_id)?;
        let lot = Lot::new(product_id, payload);
        product.lots.push(lot.clone());
        Self::recompute_quantity(product);
        self.record(
            EntityType::Lot,
            lot.id.to_string(),
            ChangeDetails::lot_created(
                lot.id.to_string(),
                product_id.to_string(),
                lot.quantity,
                lot.expiry_date,
            ),
            batch,
        );
        Ok(lot)
    }

    fn update_lot(
        &mut self,
        lot_id: LotId,
        payload: &LotPayload,
        batch: Option<BatchId>,
    ) -> Result<Lot, RemoteError> {
        self.take_failure()?;
        payload
            .validate()
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;

        let mut updated: Option<(Lot, Lot, ProductId)> = None;
        for product in &mut self.products {
            if let Some(pos) = product.lot_index(lot_id) {
                let old = product.lots[pos].clone();
                let lot = &mut product.lots[pos];
                lot.quantity = payload.quantity;
                lot.expiry_date = payload.expiry_date;
                lot.updated_at = Utc::now();
                let new = lot.clone();
                Self::recompute_quantity(product);
                updated = Some((old, new, product.id));
                break;
            }
        }
        let (old, new, product_id) =
            updated.ok_or_else(|| RemoteError::Rejected(format!("lot not found: {lot_id}")))?;

        let expiry_changed = new.expiry_date != old.expiry_date;
        self.record(
            EntityType::Lot,
            lot_id.to_string(),
            ChangeDetails::lot_updated(
                lot_id.to_string(),
                product_id.to_string(),
                old.quantity,
                new.quantity,
                expiry_changed.then_some(old.expiry_date),
                expiry_changed.then_some(new.expiry_date),
            ),
            batch,
        );
        Ok(new)
    }

    fn delete_lot(&mut self, lot_id: LotId, batch: Option<BatchId>) -> Result<(), RemoteError> {
        self.take_failure()?;
        let mut removed: Option<(Lot, ProductId)> = None;
        for product in &mut self.products {
            if let Some(pos) = product.lot_index(lot_id) {
                let lot = product.lots.remove(pos);
                Self::recompute_quantity(product);
                removed = Some((lot, product.id));
                break;
            }
        }
        let (lot, product_id) =
            removed.ok_or_else(|| RemoteError::Rejected(format!("lot not found: {lot_id}")))?;
        self.record(
            EntityType::Lot,
            lot_id.to_string(),
            ChangeDetails::lot_deleted(
                lot_id.to_string(),
                product_id.to_string(),
                lot.quantity,
                lot.expiry_date,
            ),
            batch,
        );
        Ok(())
    }

    fn record_product_batch_context(
        &mut self,
        payload: &ProductBatchContextPayload,
        batch: BatchId,
    ) -> Result<(), RemoteError> {
        self.take_failure()?;
        self.record(
            EntityType::ProductBatchContext,
            payload.product_id.to_string(),
            ChangeDetails::product_batch_context(
                payload.product_id.to_string(),
                payload.product_name_snapshot.clone(),
                payload.quantity_before_batch,
                payload.quantity_after_batch,
            ),
            Some(batch),
        );
        Ok(())
    }

    fn fetch_batch_groups(
        &mut self,
        page: usize,
        page_size: usize,
    ) -> Result<PaginatedBatchGroups, RemoteError> {
        self.take_failure()?;
        Ok(group_records(&self.history, page, page_size))
    }
}

/// Cloneable handle to a shared [`InMemoryServer`], so a test can keep
/// inspecting and steering the server after handing it to a session.
/// Single-threaded by design, matching the cooperative model.
#[derive(Clone, Default)]
pub struct ServerHandle(Rc<RefCell<InMemoryServer>>);

impl ServerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<Product>) -> Self {
        Self(Rc::new(RefCell::new(InMemoryServer::with_products(
            products,
        ))))
    }

    pub fn fail_next_calls(&self, n: u32) {
        self.0.borrow_mut().fail_next_calls(n);
    }

    pub fn products(&self) -> Vec<Product> {
        self.0.borrow().products.clone()
    }

    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.0.borrow().products.iter().find(|p| p.id == id).cloned()
    }

    pub fn history_records(&self) -> Vec<ChangeRecord> {
        self.0.borrow().history.clone()
    }
}

impl RemoteApi for ServerHandle {
    fn fetch_products(&mut self) -> Result<Vec<Product>, RemoteError> {
        self.0.borrow_mut().fetch_products()
    }

    fn create_product(&mut self, payload: &NewProduct) -> Result<Product, RemoteError> {
        self.0.borrow_mut().create_product(payload)
    }

    fn update_product(
        &mut self,
        id: ProductId,
        patch: &ProductPatch,
        batch: Option<BatchId>,
    ) -> Result<Product, RemoteError> {
        self.0.borrow_mut().update_product(id, patch, batch)
    }

    fn delete_product(
        &mut self,
        id: ProductId,
        batch: Option<BatchId>,
    ) -> Result<(), RemoteError> {
        self.0.borrow_mut().delete_product(id, batch)
    }

    fn create_lot(
        &mut self,
        product_id: ProductId,
        payload: &LotPayload,
        batch: Option<BatchId>,
    ) -> Result<Lot, RemoteError> {
        self.0.borrow_mut().create_lot(product_id, payload, batch)
    }

    fn update_lot(
        &mut self,
        lot_id: LotId,
        payload: &LotPayload,
        batch: Option<BatchId>,
    ) -> Result<Lot, RemoteError> {
        self.0.borrow_mut().update_lot(lot_id, payload, batch)
    }

    fn delete_lot(&mut self, lot_id: LotId, batch: Option<BatchId>) -> Result<(), RemoteError> {
        self.0.borrow_mut().delete_lot(lot_id, batch)
    }

    fn record_product_batch_context(
        &mut self,
        payload: &ProductBatchContextPayload,
        batch: BatchId,
    ) -> Result<(), RemoteError> {
        self.0.borrow_mut().record_product_batch_context(payload, batch)
    }

    fn fetch_batch_groups(
        &mut self,
        page: usize,
        page_size: usize,
    ) -> Result<PaginatedBatchGroups, RemoteError> {
        self.0.borrow_mut().fetch_batch_groups(page, page_size)
    }
}
