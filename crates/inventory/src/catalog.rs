//! Material catalog: creation, lookup, reprocess stock and summaries.

use std::collections::BTreeMap;

use chrono::Utc;
use common::{MaterialId, SupplierId};
use doc_store::{DocumentQuery, DocumentStore, DocumentStoreExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::costing::CostingEngine;
use crate::error::{InventoryError, Result};
use crate::material::{Material, MaterialCategory, MaterialFilter, NewMaterial, material_code};
use crate::quantity::round_report;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: MaterialCategory,
    pub count: usize,
    pub total_weight: Decimal,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_materials: usize,
    pub total_value: Decimal,
    pub low_stock_count: usize,
    pub by_category: Vec<CategorySummary>,
}

#[derive(Clone)]
pub struct MaterialCatalog<S> {
    store: S,
    costing: CostingEngine<S>,
}

impl<S: DocumentStore + Clone> MaterialCatalog<S> {
    pub fn new(store: S, costing: CostingEngine<S>) -> Self {
        Self { store, costing }
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_material(&self, input: NewMaterial) -> Result<Material> {
        input.validate()?;

        let in_category = self
            .store
            .count::<Material>(DocumentQuery::new().eq("category", input.category.as_str()))
            .await?;

        let now = Utc::now();
        let material = Material {
            id: MaterialId::new(),
            material_code: material_code(input.category, in_category + 1),
            material_type_id: input.material_type_id,
            name: input.name.trim().to_string(),
            category: input.category,
            inventory: Default::default(),
            reorder_level: input.reorder_level,
            reprocess: Default::default(),
            preferred_suppliers: input.preferred_suppliers,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&material).await?;

        info!(material_code = %material.material_code, "material created");
        Ok(material)
    }

    /// Loads a material with an up-to-date inventory snapshot.
    pub async fn get_material(&self, material_id: MaterialId) -> Result<Material> {
        let mut material = self.store.get_required::<Material>(material_id).await?.document;
        material.inventory = self.costing.inventory_snapshot(material_id).await?;
        Ok(material)
    }

    pub async fn list_materials(&self, filter: &MaterialFilter) -> Result<Vec<Material>> {
        let mut query = DocumentQuery::new();
        if let Some(category) = filter.category {
            query = query.eq("category", category.as_str());
        }
        if let Some(active) = filter.is_active {
            query = query.eq("is_active", active);
        }

        let mut materials = Vec::new();
        for versioned in self.store.find::<Material>(query).await? {
            let mut material = versioned.document;
            material.inventory = self.costing.inventory_snapshot(material.id).await?;
            if filter
                .low_stock
                .is_none_or(|low| material.is_low_stock() == low)
            {
                materials.push(material);
            }
        }
        Ok(materials)
    }

    /// Adds recycled scrap to the material's reprocess bucket.
    #[tracing::instrument(skip(self))]
    pub async fn add_reprocess(
        &self,
        material_id: MaterialId,
        weight: Decimal,
        price_per_kg: Decimal,
    ) -> Result<Material> {
        let modified = self
            .store
            .modify::<Material, InventoryError, _>(
                material_id,
                self.costing.ledger().max_retries(),
                |material| {
                    let mut updated = material.clone();
                    updated.reprocess.add(weight, price_per_kg)?;
                    updated.updated_at = Utc::now();
                    Ok(updated)
                },
            )
            .await?;

        info!(
            total_weight = %modified.after.reprocess.total_weight,
            price_per_kg = %modified.after.reprocess.price_per_kg,
            "reprocess stock added"
        );
        Ok(modified.after)
    }

    /// Records `supplier_id` as a preferred supplier of the material.
    pub async fn link_supplier(
        &self,
        material_id: MaterialId,
        supplier_id: SupplierId,
    ) -> Result<Material> {
        let modified = self
            .store
            .modify::<Material, InventoryError, _>(
                material_id,
                self.costing.ledger().max_retries(),
                |material| {
                    let mut updated = material.clone();
                    if updated.link_supplier(supplier_id) {
                        updated.updated_at = Utc::now();
                    }
                    Ok(updated)
                },
            )
            .await?;
        Ok(modified.after)
    }

    /// Stock value and low-stock counts across the catalog.
    pub async fn inventory_summary(&self) -> Result<InventorySummary> {
        let materials = self.list_materials(&MaterialFilter::default()).await?;

        let mut by_category: BTreeMap<MaterialCategory, CategorySummary> = BTreeMap::new();
        let mut total_value = Decimal::ZERO;
        let mut low_stock_count = 0;

        for material in &materials {
            let value = material.inventory.value();
            total_value += value;
            if material.is_low_stock() {
                low_stock_count += 1;
            }

            let entry = by_category
                .entry(material.category)
                .or_insert_with(|| CategorySummary {
                    category: material.category,
                    count: 0,
                    total_weight: Decimal::ZERO,
                    total_value: Decimal::ZERO,
                });
            entry.count += 1;
            entry.total_weight += material.inventory.total_weight;
            entry.total_value += value;
        }

        Ok(InventorySummary {
            total_materials: materials.len(),
            total_value: round_report(total_value),
            low_stock_count,
            by_category: by_category
                .into_values()
                .map(|mut c| {
                    c.total_weight = round_report(c.total_weight);
                    c.total_value = round_report(c.total_value);
                    c
                })
                .collect(),
        })
    }
}
