use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::ids::{LotId, ProductId};

/// Unit of measure for a product quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "L")]
    Liters,
    #[serde(rename = "kg")]
    Kilograms,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Liters => "L",
            Self::Kilograms => "kg",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "L" => Ok(Self::Liters),
            "kg" => Ok(Self::Kilograms),
            _ => Err(CoreError::InvalidData(format!("unknown unit: {s}"))),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dated sub-quantity of a product with its own expiry date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub id: LotId,
    pub product_id: ProductId,
    pub quantity: f64,
    pub expiry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lot {
    pub fn new(product_id: ProductId, payload: &LotPayload) -> Self {
        let now = Utc::now();
        Self {
            id: LotId::new(),
            product_id,
            quantity: payload.quantity,
            expiry_date: payload.expiry_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Caller-supplied fields for creating or updating a lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotPayload {
    pub quantity: f64,
    pub expiry_date: NaiveDate,
}

impl LotPayload {
    /// Zero or negative quantities are rejected here, at mutation time.
    /// They are never silently filtered by quantity derivation.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(CoreError::InvalidData(format!(
                "lot quantity must be positive, got {}",
                self.quantity
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub unit: Unit,
    pub quantity: f64,
    #[serde(default)]
    pub lots: Vec<Lot>,
}

impl Product {
    pub fn new(name: impl Into<String>, unit: Unit, quantity: f64) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            unit,
            quantity,
            lots: Vec::new(),
        }
    }

    pub fn lot_index(&self, lot_id: LotId) -> Option<usize> {
        self.lots.iter().position(|l| l.id == lot_id)
    }
}

/// Effective quantity of a product.
///
/// If the product has lots, the quantity is derived as the sum of lot
/// quantities and the stored scalar is ignored; otherwise the stored scalar
/// is authoritative. Pure, order-independent, and shared by the optimistic
/// mutation path and every display path so the two never disagree.
pub fn derive_quantity(product: &Product) -> f64 {
    if product.lots.is_empty() {
        product.quantity
    } else {
        product.lots.iter().map(|l| l.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(product_id: ProductId, quantity: f64) -> Lot {
        Lot::new(
            product_id,
            &LotPayload {
                quantity,
                expiry_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            },
        )
    }

    #[test]
    fn scalar_is_authoritative_without_lots() {
        let product = Product::new("Detergent", Unit::Liters, 80.0);
        assert_eq!(derive_quantity(&product), 80.0);
    }

    #[test]
    fn lots_override_stored_scalar() {
        let mut product = Product::new("Chlorine", Unit::Liters, 999.0);
        product.lots.push(lot(product.id, 50.0));
        product.lots.push(lot(product.id, 70.0));
        assert_eq!(derive_quantity(&product), 120.0);
    }

    #[test]
    fn derivation_is_order_independent() {
        let mut a = Product::new("A", Unit::Kilograms, 0.0);
        a.lots.push(lot(a.id, 1.5));
        a.lots.push(lot(a.id, 2.25));
        a.lots.push(lot(a.id, 3.0));
        let forward = derive_quantity(&a);
        a.lots.reverse();
        assert_eq!(forward, derive_quantity(&a));
    }

    #[test]
    fn lot_payload_rejects_non_positive_quantity() {
        let date = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let payload = LotPayload {
                quantity: bad,
                expiry_date: date,
            };
            assert!(payload.validate().is_err(), "expected rejection of {bad}");
        }
    }

    #[test]
    fn unit_parse_roundtrip() {
        for unit in [Unit::Liters, Unit::Kilograms] {
            assert_eq!(Unit::parse(unit.as_str()).unwrap(), unit);
        }
        assert!(Unit::parse("oz").is_err());
    }
}
