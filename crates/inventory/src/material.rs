//! Material catalog entries.

use chrono::{DateTime, Utc};
use common::{MaterialId, MaterialTypeId, SupplierId};
use doc_store::Document;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialCategory {
    Metal,
    Plastic,
    Insulation,
    Other,
}

impl MaterialCategory {
    /// Prefix of generated material codes.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            MaterialCategory::Metal => "MTL",
            MaterialCategory::Plastic => "PLS",
            MaterialCategory::Insulation => "INS",
            MaterialCategory::Other => "OTH",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialCategory::Metal => "metal",
            MaterialCategory::Plastic => "plastic",
            MaterialCategory::Insulation => "insulation",
            MaterialCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for MaterialCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats the `sequence`-th code of a category, e.g. `MTL-00001`.
pub fn material_code(category: MaterialCategory, sequence: usize) -> String {
    format!("{}-{sequence:05}", category.code_prefix())
}

/// Costing projection over a material's active lots.
///
/// Always derived from lot state; never edited by hand.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub total_weight: Decimal,
    pub total_length: Decimal,
    pub avg_price_per_kg: Decimal,
    pub avg_price_per_km: Decimal,
    pub last_price_per_kg: Decimal,
    pub last_price_per_km: Decimal,
    pub last_purchase_date: Option<DateTime<Utc>>,
    pub active_lots: usize,
    pub computed_at: Option<DateTime<Utc>>,
}

impl InventorySnapshot {
    /// Value of the stock at average price.
    pub fn value(&self) -> Decimal {
        self.total_weight * self.avg_price_per_kg
    }
}

/// Recycled scrap held outside the lot ledger as a single averaged bucket.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReprocessInventory {
    pub total_weight: Decimal,
    pub price_per_kg: Decimal,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ReprocessInventory {
    /// Adds scrap, re-pricing the bucket at the weighted average.
    pub fn add(&mut self, weight: Decimal, price_per_kg: Decimal) -> Result<()> {
        if weight <= Decimal::ZERO {
            return Err(InventoryError::validation(
                "reprocess weight must be positive",
            ));
        }
        if price_per_kg < Decimal::ZERO {
            return Err(InventoryError::validation(
                "reprocess price must not be negative",
            ));
        }

        let total = self.total_weight + weight;
        self.price_per_kg =
            (self.total_weight * self.price_per_kg + weight * price_per_kg) / total;
        self.total_weight = total;
        self.last_updated = Some(Utc::now());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub material_code: String,
    pub material_type_id: MaterialTypeId,
    pub name: String,
    pub category: MaterialCategory,
    #[serde(default)]
    pub inventory: InventorySnapshot,
    #[serde(default)]
    pub reorder_level: Decimal,
    #[serde(default)]
    pub reprocess: ReprocessInventory,
    #[serde(default)]
    pub preferred_suppliers: Vec<SupplierId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Material {
    type Id = MaterialId;
    const COLLECTION: &'static str = "materials";

    fn id(&self) -> MaterialId {
        self.id
    }
}

impl Material {
    pub fn is_low_stock(&self) -> bool {
        self.inventory.total_weight < self.reorder_level
    }

    /// Adds a supplier to the preferred list. Returns false if already listed.
    pub fn link_supplier(&mut self, supplier_id: SupplierId) -> bool {
        if self.preferred_suppliers.contains(&supplier_id) {
            return false;
        }
        self.preferred_suppliers.push(supplier_id);
        true
    }
}

/// Input for creating a material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaterial {
    pub material_type_id: MaterialTypeId,
    pub name: String,
    pub category: MaterialCategory,
    #[serde(default)]
    pub reorder_level: Decimal,
    #[serde(default)]
    pub preferred_suppliers: Vec<SupplierId>,
}

impl NewMaterial {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(InventoryError::validation("material name is required"));
        }
        if self.reorder_level < Decimal::ZERO {
            return Err(InventoryError::validation(
                "reorder level must not be negative",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialFilter {
    pub category: Option<MaterialCategory>,
    pub low_stock: Option<bool>,
    pub is_active: Option<bool>,
}
