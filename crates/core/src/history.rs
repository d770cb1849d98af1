use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::ids::{BatchId, RecordId};

/// Kind of entity an audit record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "product")]
    Product,
    #[serde(rename = "lote")]
    Lot,
    #[serde(rename = "product_batch_context")]
    ProductBatchContext,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Lot => "lote",
            Self::ProductBatchContext => "product_batch_context",
        }
    }
}

/// A single field edit inside a `product_details_updated` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedField {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Closed tagged union over the action kinds an audit record can describe.
///
/// The `action` tag is required and drives downstream formatting. Extra
/// fields on a known action are carried opaquely in `extra`; a record with
/// an action this build does not know survives verbatim as `Raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeDetails {
    Known(KnownDetails),
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum KnownDetails {
    /// A product came into existence.
    Created {
        #[serde(rename = "productName")]
        product_name: String,
        quantity: f64,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// A product was removed entirely, along with its lots.
    Deleted {
        #[serde(rename = "productName")]
        product_name: String,
        #[serde(rename = "quantityBefore")]
        quantity_before: f64,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Scalar quantity increased on a lot-less product.
    Add {
        #[serde(rename = "productName")]
        product_name: String,
        #[serde(rename = "quantityChanged")]
        quantity_changed: f64,
        #[serde(rename = "quantityBefore")]
        quantity_before: f64,
        #[serde(rename = "quantityAfter")]
        quantity_after: f64,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Scalar quantity decreased on a lot-less product.
    Remove {
        #[serde(rename = "productName")]
        product_name: String,
        #[serde(rename = "quantityChanged")]
        quantity_changed: f64,
        #[serde(rename = "quantityBefore")]
        quantity_before: f64,
        #[serde(rename = "quantityAfter")]
        quantity_after: f64,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    ProductDetailsUpdated {
        #[serde(rename = "productName")]
        product_name: String,
        #[serde(rename = "changedFields")]
        changed_fields: Vec<ChangedField>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    LoteCreated {
        #[serde(rename = "loteId")]
        lote_id: String,
        #[serde(rename = "productId")]
        product_id: String,
        quantity: f64,
        #[serde(rename = "expiryDate")]
        expiry_date: NaiveDate,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    LoteUpdated {
        #[serde(rename = "loteId")]
        lote_id: String,
        #[serde(rename = "productId")]
        product_id: String,
        #[serde(rename = "quantityBefore")]
        quantity_before: f64,
        #[serde(rename = "quantityAfter")]
        quantity_after: f64,
        #[serde(rename = "quantityChanged", skip_serializing_if = "Option::is_none")]
        quantity_changed: Option<f64>,
        #[serde(rename = "expiryDateOld", skip_serializing_if = "Option::is_none")]
        expiry_date_old: Option<NaiveDate>,
        #[serde(rename = "expiryDateNew", skip_serializing_if = "Option::is_none")]
        expiry_date_new: Option<NaiveDate>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    LoteDeleted {
        #[serde(rename = "loteId")]
        lote_id: String,
        #[serde(rename = "productId")]
        product_id: String,
        #[serde(rename = "quantityBefore")]
        quantity_before: f64,
        #[serde(rename = "expiryDate")]
        expiry_date: NaiveDate,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Per-product quantity snapshot recorded once per affected product per
    /// batch, so readers can summarize a batch without re-deriving totals
    /// from the individual lot records.
    ProductBatchContext {
        #[serde(rename = "productId")]
        product_id: String,
        #[serde(rename = "productNameSnapshot")]
        product_name_snapshot: String,
        #[serde(rename = "quantityBeforeBatch")]
        quantity_before_batch: f64,
        #[serde(rename = "quantityAfterBatch")]
        quantity_after_batch: f64,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl ChangeDetails {
    pub fn created(product_name: impl Into<String>, quantity: f64) -> Self {
        Self::Known(KnownDetails::Created {
            product_name: product_name.into(),
            quantity,
            extra: Map::new(),
        })
    }

    pub fn deleted(product_name: impl Into<String>, quantity_before: f64) -> Self {
        Self::Known(KnownDetails::Deleted {
            product_name: product_name.into(),
            quantity_before,
            extra: Map::new(),
        })
    }

    /// `add` when the quantity went up, `remove` when it went down.
    pub fn quantity_adjusted(
        product_name: impl Into<String>,
        quantity_before: f64,
        quantity_after: f64,
    ) -> Self {
        let product_name = product_name.into();
        if quantity_after >= quantity_before {
            Self::Known(KnownDetails::Add {
                product_name,
                quantity_changed: quantity_after - quantity_before,
                quantity_before,
                quantity_after,
                extra: Map::new(),
            })
        } else {
            Self::Known(KnownDetails::Remove {
                product_name,
                quantity_changed: quantity_before - quantity_after,
                quantity_before,
                quantity_after,
                extra: Map::new(),
            })
        }
    }

    pub fn product_details_updated(
        product_name: impl Into<String>,
        changed_fields: Vec<ChangedField>,
    ) -> Self {
        Self::Known(KnownDetails::ProductDetailsUpdated {
            product_name: product_name.into(),
            changed_fields,
            extra: Map::new(),
        })
    }

    pub fn lot_created(
        lote_id: impl Into<String>,
        product_id: impl Into<String>,
        quantity: f64,
        expiry_date: NaiveDate,
    ) -> Self {
        Self::Known(KnownDetails::LoteCreated {
            lote_id: lote_id.into(),
            product_id: product_id.into(),
            quantity,
            expiry_date,
            extra: Map::new(),
        })
    }

    pub fn lot_updated(
        lote_id: impl Into<String>,
        product_id: impl Into<String>,
        quantity_before: f64,
        quantity_after: f64,
        expiry_date_old: Option<NaiveDate>,
        expiry_date_new: Option<NaiveDate>,
    ) -> Self {
        let quantity_changed = if quantity_after != quantity_before {
            Some(quantity_after - quantity_before)
        } else {
            None
        };
        Self::Known(KnownDetails::LoteUpdated {
            lote_id: lote_id.into(),
            product_id: product_id.into(),
            quantity_before,
            quantity_after,
            quantity_changed,
            expiry_date_old,
            expiry_date_new,
            extra: Map::new(),
        })
    }

    pub fn lot_deleted(
        lote_id: impl Into<String>,
        product_id: impl Into<String>,
        quantity_before: f64,
        expiry_date: NaiveDate,
    ) -> Self {
        Self::Known(KnownDetails::LoteDeleted {
            lote_id: lote_id.into(),
            product_id: product_id.into(),
            quantity_before,
            expiry_date,
            extra: Map::new(),
        })
    }

    pub fn product_batch_context(
        product_id: impl Into<String>,
        product_name_snapshot: impl Into<String>,
        quantity_before_batch: f64,
        quantity_after_batch: f64,
    ) -> Self {
        Self::Known(KnownDetails::ProductBatchContext {
            product_id: product_id.into(),
            product_name_snapshot: product_name_snapshot.into(),
            quantity_before_batch,
            quantity_after_batch,
            extra: Map::new(),
        })
    }

    /// The action tag, when present. `Raw` details without an `action`
    /// string have none.
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Known(known) => Some(known.action()),
            Self::Raw(value) => value.get("action").and_then(Value::as_str),
        }
    }
}

impl KnownDetails {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Deleted { .. } => "deleted",
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::ProductDetailsUpdated { .. } => "product_details_updated",
            Self::LoteCreated { .. } => "lote_created",
            Self::LoteUpdated { .. } => "lote_updated",
            Self::LoteDeleted { .. } => "lote_deleted",
            Self::ProductBatchContext { .. } => "product_batch_context",
        }
    }
}

/// One accepted mutation. Append-only: never mutated or deleted once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: RecordId,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub details: ChangeDetails,
    pub batch_id: BatchId,
    pub created_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// The batch id is received verbatim from the caller; a record created
    /// outside any operation batch becomes its own one-record batch.
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        details: ChangeDetails,
        batch_id: Option<BatchId>,
    ) -> Self {
        let id = RecordId::new();
        Self {
            id,
            entity_type,
            entity_id: entity_id.into(),
            details,
            batch_id: batch_id.unwrap_or_else(|| BatchId::from_record(id)),
            created_at: Utc::now(),
        }
    }
}

/// Aggregated quantity movement of one product within one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBatchSummary {
    pub product_id: String,
    pub product_name: String,
    pub total_quantity_before_batch: f64,
    pub total_quantity_after_batch: f64,
    pub net_quantity_change_in_batch: f64,
}

/// All records sharing one batch id, with a per-product summary.
/// Computed on read; never stored as an independent entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGroup {
    pub batch_id: BatchId,
    /// Timestamp of the earliest record in the batch; groups order by it.
    pub created_at: DateTime<Utc>,
    pub records: Vec<ChangeRecord>,
    pub record_count: usize,
    pub product_summaries: BTreeMap<String, ProductBatchSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedBatchGroups {
    pub groups: Vec<BatchGroup>,
    pub total_batches: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

pub fn total_pages(total_batches: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    (total_batches.div_ceil(page_size)).max(1)
}

/// Group a flat record list into paginated batch groups.
///
/// This is the single implementation behind both read paths: the local-mode
/// reader runs it over the mirrored flat list, and the reference server runs
/// it over its own record table, so the two paths produce structurally
/// identical output by construction.
///
/// Groups are ordered by earliest record timestamp, newest first. A page
/// beyond the last populated one falls back to the nearest valid page, with
/// `page` corrected in the result.
pub fn group_records(
    records: &[ChangeRecord],
    page: usize,
    page_size: usize,
) -> PaginatedBatchGroups {
    let page_size = page_size.max(1);

    let mut order: Vec<BatchId> = Vec::new();
    let mut by_batch: BTreeMap<BatchId, Vec<ChangeRecord>> = BTreeMap::new();
    for record in records {
        if !by_batch.contains_key(&record.batch_id) {
            order.push(record.batch_id);
        }
        by_batch
            .entry(record.batch_id)
            .or_default()
            .push(record.clone());
    }

    let mut groups: Vec<BatchGroup> = order
        .into_iter()
        .filter_map(|batch_id| {
            let members = by_batch.remove(&batch_id)?;
            let created_at = members.iter().map(|r| r.created_at).min()?;
            let record_count = members.len();
            let product_summaries = summarize(&members);
            Some(BatchGroup {
                batch_id,
                created_at,
                records: members,
                record_count,
                product_summaries,
            })
        })
        .collect();

    groups.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.batch_id.cmp(&a.batch_id))
    });

    let total_batches = groups.len();
    let total_pages = total_pages(total_batches, page_size);
    let page = page.clamp(1, total_pages);

    let start = (page - 1) * page_size;
    let end = (start + page_size).min(groups.len());
    let groups = if start < groups.len() {
        groups[start..end].to_vec()
    } else {
        Vec::new()
    };

    PaginatedBatchGroups {
        groups,
        total_batches,
        page,
        page_size,
        total_pages,
    }
}

/// Build per-product summaries for one batch, preferring the dedicated
/// `product_batch_context` snapshots and falling back to what the individual
/// product records reveal. Lot records alone cannot reconstruct a product
/// total, so products touched only by lots and missing a context snapshot
/// get no summary.
fn summarize(members: &[ChangeRecord]) -> BTreeMap<String, ProductBatchSummary> {
    let mut summaries = BTreeMap::new();

    for record in members {
        if let ChangeDetails::Known(KnownDetails::ProductBatchContext {
            product_id,
            product_name_snapshot,
            quantity_before_batch,
            quantity_after_batch,
            ..
        }) = &record.details
        {
            summaries.insert(
                product_id.clone(),
                ProductBatchSummary {
                    product_id: product_id.clone(),
                    product_name: product_name_snapshot.clone(),
                    total_quantity_before_batch: *quantity_before_batch,
                    total_quantity_after_batch: *quantity_after_batch,
                    net_quantity_change_in_batch: quantity_after_batch - quantity_before_batch,
                },
            );
        }
    }

    for record in members {
        if record.entity_type != EntityType::Product
            || summaries.contains_key(&record.entity_id)
        {
            continue;
        }
        let inferred = match &record.details {
            ChangeDetails::Known(KnownDetails::Created {
                product_name,
                quantity,
                ..
            }) => Some((product_name.clone(), 0.0, *quantity)),
            ChangeDetails::Known(KnownDetails::Deleted {
                product_name,
                quantity_before,
                ..
            }) => Some((product_name.clone(), *quantity_before, 0.0)),
            ChangeDetails::Known(
                KnownDetails::Add {
                    product_name,
                    quantity_before,
                    quantity_after,
                    ..
                }
                | KnownDetails::Remove {
                    product_name,
                    quantity_before,
                    quantity_after,
                    ..
                },
            ) => Some((product_name.clone(), *quantity_before, *quantity_after)),
            _ => None,
        };
        if let Some((name, before, after)) = inferred {
            summaries.insert(
                record.entity_id.clone(),
                ProductBatchSummary {
                    product_id: record.entity_id.clone(),
                    product_name: name,
                    total_quantity_before_batch: before,
                    total_quantity_after_batch: after,
                    net_quantity_change_in_batch: after - before,
                },
            );
        }
    }

    summaries
}
