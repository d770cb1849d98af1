use serde::{Deserialize, Serialize};
use thiserror::Error;

use stocktrail_core::{
    BatchId, Lot, LotId, LotPayload, PaginatedBatchGroups, Product, ProductId, Unit,
};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("remote rejected request: {0}")]
    Rejected(String),
}

/// Creation payload for a product. Standalone creation carries no batch id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub unit: Unit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
}

/// Partial update of product fields. Only set fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
}

/// Per-product quantity snapshot sent once per affected product per batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBatchContextPayload {
    pub product_id: ProductId,
    pub product_name_snapshot: String,
    pub quantity_before_batch: f64,
    pub quantity_after_batch: f64,
}

/// The server of record, as seen by a connected session.
///
/// One method per endpoint of the excluded routing/auth layer. The batch id
/// is an out-of-band correlation token (a request header on the wire): the
/// client propagates it verbatim and never interprets it. Successful
/// mutations return the server's authoritative snapshot, which overwrites
/// the session's optimistic guess.
pub trait RemoteApi {
    fn fetch_products(&mut self) -> Result<Vec<Product>, RemoteError>;

    fn create_product(&mut self, payload: &NewProduct) -> Result<Product, RemoteError>;

    fn update_product(
        &mut self,
        id: ProductId,
        patch: &ProductPatch,
        batch: Option<BatchId>,
    ) -> Result<Product, RemoteError>;

    fn delete_product(&mut self, id: ProductId, batch: Option<BatchId>)
    -> Result<(), RemoteError>;

    fn create_lot(
        &mut self,
        product_id: ProductId,
        payload: &LotPayload,
        batch: Option<BatchId>,
    ) -> Result<Lot, RemoteError>;

    fn update_lot(
        &mut self,
        lot_id: LotId,
        payload: &LotPayload,
        batch: Option<BatchId>,
    ) -> Result<Lot, RemoteError>;

    fn delete_lot(&mut self, lot_id: LotId, batch: Option<BatchId>) -> Result<(), RemoteError>;

    fn record_product_batch_context(
        &mut self,
        payload: &ProductBatchContextPayload,
        batch: BatchId,
    ) -> Result<(), RemoteError>;

    fn fetch_batch_groups(
        &mut self,
        page: usize,
        page_size: usize,
    ) -> Result<PaginatedBatchGroups, RemoteError>;
}
