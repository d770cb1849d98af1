use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use stocktrail_core::{
    BatchId, ChangeDetails, ChangeRecord, ChangedField, EntityType, Lot, LotId, LotPayload,
    OperatingMode, PaginatedBatchGroups, Product, ProductId, Unit, derive_quantity,
    group_records,
};
use stocktrail_storage::{Mirror, SqliteMirror, StoredState};

use crate::demo;
use crate::error::EngineError;
use crate::history::HistoryLog;
use crate::remote::{NewProduct, ProductBatchContextPayload, ProductPatch, RemoteApi};

/// Partial edit of a product's descriptive fields.
#[derive(Debug, Clone, Default)]
pub struct ProductDetailsUpdate {
    pub name: Option<String>,
    pub unit: Option<Unit>,
}

/// One user session over the inventory: the mutation executor, its audit
/// log, and the read model for batched history.
///
/// Mode is fixed at construction. Connected sessions confirm every
/// optimistic change against the remote server of record and adopt the
/// server's snapshot on success; local sessions are self-contained and
/// write through the mirror after every mutation. All methods take
/// `&mut self`, so mutations are strictly serialized — a second mutation
/// cannot begin until the in-flight one has committed or rolled back.
pub struct Session {
    mode: OperatingMode,
    mirror: SqliteMirror,
    remote: Option<Box<dyn RemoteApi>>,
    products: Vec<Product>,
    history: HistoryLog,
}

impl Session {
    /// Open a local sandbox session. The first entry with no stored state
    /// seeds the fixed demo set and persists it immediately, so seeding
    /// happens exactly once per mirror.
    pub fn local(mirror: SqliteMirror) -> Result<Self, EngineError> {
        let mut session = Self {
            mode: OperatingMode::Local,
            mirror,
            remote: None,
            products: Vec::new(),
            history: HistoryLog::new(),
        };
        match session.mirror.load(OperatingMode::Local)? {
            Some(state) => {
                session.products = state.products;
                session.history = HistoryLog::from_records(state.history);
            }
            None => {
                debug!("seeding local sandbox with demo data");
                session.products = demo::demo_products();
                session.persist()?;
            }
        }
        Ok(session)
    }

    /// Open a connected session against a server of record. The initial
    /// product list comes from the server; the mirror serves only as a
    /// best-effort cache in this mode.
    pub fn connected(
        mirror: SqliteMirror,
        mut remote: Box<dyn RemoteApi>,
    ) -> Result<Self, EngineError> {
        let products = remote.fetch_products()?;
        let mut session = Self {
            mode: OperatingMode::Connected,
            mirror,
            remote: Some(remote),
            products,
            history: HistoryLog::new(),
        };
        session.persist()?;
        Ok(session)
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn history_records(&self) -> &[ChangeRecord] {
        self.history.records()
    }

    // ========================================================================
    // Product mutations
    // ========================================================================

    pub fn add_product(
        &mut self,
        name: &str,
        unit: Unit,
        quantity: f64,
    ) -> Result<ProductId, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("product name is required".into()));
        }
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(EngineError::Validation(format!(
                "product quantity must be non-negative, got {quantity}"
            )));
        }

        // Optimistic create; replaced by the server's snapshot on confirm.
        self.products.push(Product::new(name, unit, quantity));
        let idx = self.products.len() - 1;

        if let Some(remote) = self.remote.as_mut() {
            let payload = NewProduct {
                name: name.to_string(),
                unit,
                quantity: Some(quantity),
            };
            match remote.create_product(&payload) {
                Ok(created) => self.products[idx] = created,
                Err(e) => {
                    self.products.pop();
                    warn!(product = name, error = %e, "product creation rolled back");
                    self.persist()?;
                    return Err(e.into());
                }
            }
        }

        let product = &self.products[idx];
        let id = product.id;
        let details = ChangeDetails::created(product.name.clone(), product.quantity);
        self.history
            .record(EntityType::Product, id.to_string(), details, None);
        self.persist()?;
        debug!(product = %id, "product created");
        Ok(id)
    }

    pub fn update_product_details(
        &mut self,
        id: ProductId,
        update: ProductDetailsUpdate,
        batch: Option<BatchId>,
    ) -> Result<(), EngineError> {
        if update.name.is_none() && update.unit.is_none() {
            return Err(EngineError::Validation(
                "no product fields to update".into(),
            ));
        }
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(EngineError::Validation("product name is required".into()));
            }
        }
        let idx = self.product_index(id)?;
        let old_name = self.products[idx].name.clone();
        let old_unit = self.products[idx].unit;

        {
            let product = &mut self.products[idx];
            if let Some(name) = &update.name {
                product.name = name.trim().to_string();
            }
            if let Some(unit) = update.unit {
                product.unit = unit;
            }
        }

        if let Some(remote) = self.remote.as_mut() {
            let patch = ProductPatch {
                name: update.name.clone(),
                unit: update.unit,
                quantity: None,
            };
            match remote.update_product(id, &patch, batch) {
                Ok(snapshot) => self.products[idx] = snapshot,
                Err(e) => {
                    let product = &mut self.products[idx];
                    product.name = old_name;
                    product.unit = old_unit;
                    warn!(product = %id, error = %e, "product detail update rolled back");
                    self.persist()?;
                    return Err(e.into());
                }
            }
        }

        let product = &self.products[idx];
        let mut changed_fields = Vec::new();
        if product.name != old_name {
            changed_fields.push(ChangedField {
                field: "name".into(),
                old_value: json!(old_name),
                new_value: json!(product.name),
            });
        }
        if product.unit != old_unit {
            changed_fields.push(ChangedField {
                field: "unit".into(),
                old_value: json!(old_unit.as_str()),
                new_value: json!(product.unit.as_str()),
            });
        }
        if changed_fields.is_empty() {
            // Committed but changed nothing; nothing worth auditing.
            return self.persist();
        }
        let details = ChangeDetails::product_details_updated(product.name.clone(), changed_fields);
        self.history
            .record(EntityType::Product, id.to_string(), details, batch);
        self.persist()
    }

    /// Adjust the scalar quantity of a product without lots. Products with
    /// lots derive their quantity; a direct write to it is a caller error.
    pub fn update_product_quantity(
        &mut self,
        id: ProductId,
        new_quantity: f64,
        batch: Option<BatchId>,
    ) -> Result<(), EngineError> {
        if !new_quantity.is_finite() || new_quantity < 0.0 {
            return Err(EngineError::Validation(format!(
                "product quantity must be non-negative, got {new_quantity}"
            )));
        }
        let idx = self.product_index(id)?;
        if !self.products[idx].lots.is_empty() {
            return Err(EngineError::Validation(
                "quantity is derived from lots and cannot be set directly".into(),
            ));
        }

        let old_quantity = self.products[idx].quantity;
        if new_quantity == old_quantity {
            return Ok(());
        }
        self.products[idx].quantity = new_quantity;

        if let Some(remote) = self.remote.as_mut() {
            let patch = ProductPatch {
                name: None,
                unit: None,
                quantity: Some(new_quantity),
            };
            match remote.update_product(id, &patch, batch) {
                Ok(snapshot) => self.products[idx] = snapshot,
                Err(e) => {
                    self.products[idx].quantity = old_quantity;
                    warn!(product = %id, error = %e, "quantity update rolled back");
                    self.persist()?;
                    return Err(e.into());
                }
            }
        }

        let product = &self.products[idx];
        let details =
            ChangeDetails::quantity_adjusted(product.name.clone(), old_quantity, product.quantity);
        self.history
            .record(EntityType::Product, id.to_string(), details, batch);
        self.persist()
    }

    /// Remove a product and, with it, all of its lots. On remote failure
    /// the product is re-inserted at its original index, not appended.
    pub fn remove_product(
        &mut self,
        id: ProductId,
        batch: Option<BatchId>,
    ) -> Result<(), EngineError> {
        let idx = self.product_index(id)?;
        let removed = self.products.remove(idx);

        if let Some(remote) = self.remote.as_mut() {
            if let Err(e) = remote.delete_product(id, batch) {
                self.products.insert(idx, removed);
                warn!(product = %id, error = %e, "product removal rolled back");
                self.persist()?;
                return Err(e.into());
            }
        }

        let details = ChangeDetails::deleted(removed.name.clone(), derive_quantity(&removed));
        self.history
            .record(EntityType::Product, id.to_string(), details, batch);
        self.persist()
    }

    // ========================================================================
    // Lot mutations
    // ========================================================================

    pub fn create_lot(
        &mut self,
        product_id: ProductId,
        payload: LotPayload,
        batch: Option<BatchId>,
    ) -> Result<LotId, EngineError> {
        payload.validate()?;
        let idx = self.product_index(product_id)?;

        let optimistic = Lot::new(product_id, &payload);
        let optimistic_id = optimistic.id;
        self.products[idx].lots.push(optimistic);
        self.rederive(idx);

        if let Some(remote) = self.remote.as_mut() {
            match remote.create_lot(product_id, &payload, batch) {
                Ok(created) => {
                    // The server's lot (with its own id) replaces the guess.
                    if let Some(pos) = self.products[idx].lot_index(optimistic_id) {
                        self.products[idx].lots[pos] = created;
                    }
                    self.rederive(idx);
                }
                Err(e) => {
                    self.products[idx].lots.retain(|l| l.id != optimistic_id);
                    self.rederive(idx);
                    warn!(product = %product_id, error = %e, "lot creation rolled back");
                    self.persist()?;
                    return Err(e.into());
                }
            }
        }

        let product = &self.products[idx];
        let lot = product
            .lots
            .last()
            .ok_or_else(|| EngineError::LotNotFound(optimistic_id.to_string()))?;
        let lot_id = lot.id;
        let details = ChangeDetails::lot_created(
            lot_id.to_string(),
            product_id.to_string(),
            lot.quantity,
            lot.expiry_date,
        );
        self.history
            .record(EntityType::Lot, lot_id.to_string(), details, batch);
        self.persist()?;
        Ok(lot_id)
    }

    pub fn update_lot(
        &mut self,
        product_id: ProductId,
        lot_id: LotId,
        payload: LotPayload,
        batch: Option<BatchId>,
    ) -> Result<(), EngineError> {
        payload.validate()?;
        let idx = self.product_index(product_id)?;
        let pos = self.products[idx]
            .lot_index(lot_id)
            .ok_or_else(|| EngineError::LotNotFound(lot_id.to_string()))?;
        let old = self.products[idx].lots[pos].clone();

        {
            let lot = &mut self.products[idx].lots[pos];
            lot.quantity = payload.quantity;
            lot.expiry_date = payload.expiry_date;
            lot.updated_at = Utc::now();
        }
        self.rederive(idx);

        if let Some(remote) = self.remote.as_mut() {
            match remote.update_lot(lot_id, &payload, batch) {
                Ok(snapshot) => {
                    self.products[idx].lots[pos] = snapshot;
                    self.rederive(idx);
                }
                Err(e) => {
                    self.products[idx].lots[pos] = old;
                    self.rederive(idx);
                    warn!(lot = %lot_id, error = %e, "lot update rolled back");
                    self.persist()?;
                    return Err(e.into());
                }
            }
        }

        let lot = &self.products[idx].lots[pos];
        let expiry_changed = lot.expiry_date != old.expiry_date;
        let details = ChangeDetails::lot_updated(
            lot_id.to_string(),
            product_id.to_string(),
            old.quantity,
            lot.quantity,
            expiry_changed.then_some(old.expiry_date),
            expiry_changed.then_some(lot.expiry_date),
        );
        self.history
            .record(EntityType::Lot, lot_id.to_string(), details, batch);
        self.persist()
    }

    /// Delete a lot. On remote failure the lot is re-inserted at its
    /// original index to preserve list ordering.
    pub fn delete_lot(
        &mut self,
        product_id: ProductId,
        lot_id: LotId,
        batch: Option<BatchId>,
    ) -> Result<(), EngineError> {
        let idx = self.product_index(product_id)?;
        let pos = self.products[idx]
            .lot_index(lot_id)
            .ok_or_else(|| EngineError::LotNotFound(lot_id.to_string()))?;
        let removed = self.products[idx].lots.remove(pos);
        self.rederive(idx);

        if let Some(remote) = self.remote.as_mut() {
            if let Err(e) = remote.delete_lot(lot_id, batch) {
                self.products[idx].lots.insert(pos, removed);
                self.rederive(idx);
                warn!(lot = %lot_id, error = %e, "lot deletion rolled back");
                self.persist()?;
                return Err(e.into());
            }
        }

        let details = ChangeDetails::lot_deleted(
            lot_id.to_string(),
            product_id.to_string(),
            removed.quantity,
            removed.expiry_date,
        );
        self.history
            .record(EntityType::Lot, lot_id.to_string(), details, batch);
        self.persist()
    }

    // ========================================================================
    // Batch context and history reads
    // ========================================================================

    /// Record the per-product quantity snapshot for a batch that touched
    /// this product's lots. `quantity_before_batch` is captured by the
    /// caller before issuing the batch; the after value is derived from the
    /// product's current state.
    pub fn record_product_batch_context(
        &mut self,
        product_id: ProductId,
        quantity_before_batch: f64,
        batch: BatchId,
    ) -> Result<(), EngineError> {
        let idx = self.product_index(product_id)?;
        let product = &self.products[idx];
        let payload = ProductBatchContextPayload {
            product_id,
            product_name_snapshot: product.name.clone(),
            quantity_before_batch,
            quantity_after_batch: derive_quantity(product),
        };

        if let Some(remote) = self.remote.as_mut() {
            remote.record_product_batch_context(&payload, batch)?;
        }

        let details = ChangeDetails::product_batch_context(
            payload.product_id.to_string(),
            payload.product_name_snapshot,
            payload.quantity_before_batch,
            payload.quantity_after_batch,
        );
        self.history.record(
            EntityType::ProductBatchContext,
            product_id.to_string(),
            details,
            Some(batch),
        );
        self.persist()
    }

    /// Paginated batch groups, served from whichever side is authoritative
    /// for this session's mode. Both paths produce the same shape; a page
    /// past the end falls back to the nearest valid page.
    pub fn batch_groups(
        &mut self,
        page: usize,
        page_size: usize,
    ) -> Result<PaginatedBatchGroups, EngineError> {
        let page = page.max(1);
        let page_size = page_size.max(1);

        match self.remote.as_mut() {
            None => Ok(group_records(self.history.records(), page, page_size)),
            Some(remote) => {
                let result = remote.fetch_batch_groups(page, page_size)?;
                if result.groups.is_empty() && result.page > 1 {
                    // The last batch of the requested page may have just
                    // disappeared; retry against the corrected total.
                    let fallback = result.total_pages.min(result.page - 1).max(1);
                    return Ok(remote.fetch_batch_groups(fallback, page_size)?);
                }
                Ok(result)
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn product_index(&self, id: ProductId) -> Result<usize, EngineError> {
        self.products
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| EngineError::ProductNotFound(id.to_string()))
    }

    fn rederive(&mut self, idx: usize) {
        let product = &mut self.products[idx];
        product.quantity = derive_quantity(product);
    }

    /// Write-through after every committed or rolled-back mutation. Local
    /// mode requires durability; connected mode caches best-effort.
    fn persist(&mut self) -> Result<(), EngineError> {
        let state = StoredState {
            products: self.products.clone(),
            history: self.history.records().to_vec(),
        };
        match self.mode {
            OperatingMode::Local => self
                .mirror
                .save(OperatingMode::Local, &state)
                .map_err(Into::into),
            OperatingMode::Connected => {
                if let Err(e) = self.mirror.save(OperatingMode::Connected, &state) {
                    warn!(error = %e, "best-effort cache write failed");
                }
                Ok(())
            }
        }
    }
}
