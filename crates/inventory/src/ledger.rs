//! Lot Ledger: the record of every procurement lot.

use chrono::Utc;
use common::{LotId, MaterialId};
use doc_store::{DocumentQuery, DocumentStore, DocumentStoreExt, Modified};
use tracing::info;

use crate::costing::SnapshotCache;
use crate::error::{InventoryError, Result};
use crate::lot::{
    LotDelta, LotFilter, MaterialLot, NewLot, lifo_order, lot_number, lot_number_prefix,
};
use crate::material::Material;

/// Default number of re-reads after a version conflict.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Owns lot documents and every change to their quantities.
///
/// Each write invalidates the material's cached inventory snapshot.
#[derive(Clone)]
pub struct LotLedger<S> {
    store: S,
    cache: SnapshotCache,
    max_retries: u32,
}

impl<S: DocumentStore + Clone> LotLedger<S> {
    pub fn new(store: S, cache: SnapshotCache) -> Self {
        Self {
            store,
            cache,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Records a new lot with its full quantity unreserved.
    #[tracing::instrument(skip(self, new_lot), fields(material_id = %new_lot.material_id))]
    pub async fn create_lot(&self, new_lot: NewLot) -> Result<MaterialLot> {
        new_lot.validate()?;
        if !self.store.exists::<Material>(new_lot.material_id).await? {
            return Err(InventoryError::not_found("Material", new_lot.material_id));
        }
        let Some(storage) = new_lot.storage else {
            return Err(InventoryError::validation("storage location is required"));
        };

        let now = Utc::now();
        let today = now.date_naive();
        let issued_today = self
            .store
            .count::<MaterialLot>(
                DocumentQuery::new().starts_with("lot_number", lot_number_prefix(today)),
            )
            .await?;

        let mut pricing = new_lot.pricing;
        pricing.total_cost = Some(pricing.total_for(new_lot.initial_quantity.weight));

        let lot = MaterialLot {
            id: LotId::new(),
            lot_number: lot_number(today, issued_today + 1),
            material_id: new_lot.material_id,
            supplier_id: new_lot.supplier_id,
            purchase_date: new_lot.purchase_date.unwrap_or(now),
            initial_quantity: new_lot.initial_quantity,
            remaining_quantity: new_lot.initial_quantity,
            allocated_quantity: Default::default(),
            pricing,
            storage,
            provenance: new_lot.provenance,
            is_active: true,
            is_fully_consumed: new_lot.initial_quantity.weight.is_zero(),
            created_at: now,
            updated_at: now,
        };

        self.store.insert(&lot).await?;
        self.cache.invalidate(lot.material_id).await;

        info!(lot_id = %lot.id, lot_number = %lot.lot_number, "lot created");
        Ok(lot)
    }

    /// Usable lots of a material in LIFO order.
    pub async fn list_active_lots(&self, material_id: MaterialId) -> Result<Vec<MaterialLot>> {
        let query = DocumentQuery::new()
            .eq("material_id", material_id.to_string())
            .eq("is_active", true)
            .eq("is_fully_consumed", false);
        let mut lots: Vec<MaterialLot> = self
            .store
            .find::<MaterialLot>(query)
            .await?
            .into_iter()
            .map(|v| v.document)
            .collect();
        lots.sort_by(lifo_order);
        Ok(lots)
    }

    pub async fn get_lot(&self, lot_id: LotId) -> Result<MaterialLot> {
        Ok(self.store.get_required::<MaterialLot>(lot_id).await?.document)
    }

    /// Lots matching `filter`, in LIFO order.
    pub async fn list_lots(&self, filter: &LotFilter) -> Result<Vec<MaterialLot>> {
        let mut query = DocumentQuery::new();
        if let Some(material_id) = filter.material_id {
            query = query.eq("material_id", material_id.to_string());
        }
        if let Some(supplier_id) = filter.supplier_id {
            query = query.eq("supplier_id", supplier_id.to_string());
        }

        let mut lots: Vec<MaterialLot> = self
            .store
            .find::<MaterialLot>(query)
            .await?
            .into_iter()
            .map(|v| v.document)
            .filter(|lot| filter.matches(lot))
            .collect();
        lots.sort_by(lifo_order);
        Ok(lots)
    }

    /// Applies a fixed change to a lot's weights.
    pub async fn apply_delta(&self, lot_id: LotId, delta: LotDelta) -> Result<MaterialLot> {
        Ok(self.apply_delta_with(lot_id, |_| delta).await?.after)
    }

    /// Applies a change computed from the lot's current state.
    ///
    /// `delta_for` may be called more than once if a concurrent write forces
    /// a re-read; the returned [`Modified`] shows what was actually written.
    pub async fn apply_delta_with<F>(
        &self,
        lot_id: LotId,
        delta_for: F,
    ) -> Result<Modified<MaterialLot>>
    where
        F: Fn(&MaterialLot) -> LotDelta + Send + Sync,
    {
        let modified = self
            .store
            .modify::<MaterialLot, InventoryError, _>(lot_id, self.max_retries, |lot| {
                lot.with_delta(&delta_for(lot))
            })
            .await?;
        self.cache.invalidate(modified.after.material_id).await;
        Ok(modified)
    }

    /// Deactivates a lot so it no longer takes part in allocation or costing.
    #[tracing::instrument(skip(self))]
    pub async fn retire_lot(&self, lot_id: LotId) -> Result<MaterialLot> {
        let modified = self
            .store
            .modify::<MaterialLot, InventoryError, _>(lot_id, self.max_retries, |lot| {
                if lot.allocated_quantity.weight > rust_decimal::Decimal::ZERO {
                    return Err(InventoryError::StateConflict(format!(
                        "lot {} still has {} kg allocated",
                        lot.lot_number, lot.allocated_quantity.weight
                    )));
                }
                let mut retired = lot.clone();
                retired.is_active = false;
                retired.updated_at = Utc::now();
                Ok(retired)
            })
            .await?;
        self.cache.invalidate(modified.after.material_id).await;

        info!(lot_number = %modified.after.lot_number, "lot retired");
        Ok(modified.after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lot::{Pricing, Provenance, Storage, StorageLocation};
    use crate::material::{MaterialCategory, NewMaterial};
    use crate::quantity::Quantity;
    use common::{MaterialTypeId, SupplierId};
    use doc_store::InMemoryDocumentStore;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup() -> (LotLedger<InMemoryDocumentStore>, MaterialId) {
        let store = InMemoryDocumentStore::new();
        let catalog = crate::catalog::MaterialCatalog::new(
            store.clone(),
            crate::costing::CostingEngine::new(LotLedger::new(
                store.clone(),
                SnapshotCache::default(),
            )),
        );
        let material = catalog
            .create_material(NewMaterial {
                material_type_id: MaterialTypeId::new(),
                name: "Copper rod".to_string(),
                category: MaterialCategory::Metal,
                reorder_level: Decimal::ZERO,
                preferred_suppliers: vec![],
            })
            .await
            .unwrap();
        (LotLedger::new(store, SnapshotCache::default()), material.id)
    }

    fn new_lot(material_id: MaterialId, weight: &str) -> NewLot {
        NewLot {
            material_id,
            supplier_id: SupplierId::new(),
            purchase_date: None,
            initial_quantity: Quantity::of_weight(dec(weight)),
            pricing: Pricing::per_kg(dec("10")),
            storage: Some(Storage::at(StorageLocation::Drum)),
            provenance: Provenance::default(),
        }
    }

    #[tokio::test]
    async fn create_lot_starts_unreserved() {
        let (ledger, material_id) = setup().await;
        let lot = ledger.create_lot(new_lot(material_id, "50")).await.unwrap();

        assert_eq!(lot.remaining_quantity, lot.initial_quantity);
        assert_eq!(lot.allocated_quantity.weight, Decimal::ZERO);
        assert_eq!(lot.pricing.total_cost, Some(dec("500")));
        assert!(lot.is_active);
        assert!(!lot.is_fully_consumed);
    }

    #[tokio::test]
    async fn lot_numbers_increment_per_day() {
        let (ledger, material_id) = setup().await;
        let first = ledger.create_lot(new_lot(material_id, "1")).await.unwrap();
        let second = ledger.create_lot(new_lot(material_id, "1")).await.unwrap();

        let prefix = lot_number_prefix(Utc::now().date_naive());
        assert_eq!(first.lot_number, format!("{prefix}0001"));
        assert_eq!(second.lot_number, format!("{prefix}0002"));
    }

    #[tokio::test]
    async fn create_lot_for_unknown_material_fails() {
        let (ledger, _) = setup().await;
        let result = ledger.create_lot(new_lot(MaterialId::new(), "5")).await;
        assert!(matches!(result, Err(InventoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn create_lot_rejects_negative_weight() {
        let (ledger, material_id) = setup().await;
        let result = ledger.create_lot(new_lot(material_id, "-5")).await;
        assert!(matches!(result, Err(InventoryError::Validation(_))));
    }

    #[tokio::test]
    async fn get_missing_lot_is_not_found() {
        let (ledger, _) = setup().await;
        let result = ledger.get_lot(LotId::new()).await;
        assert!(matches!(result, Err(InventoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn apply_delta_never_writes_invalid_state() {
        let (ledger, material_id) = setup().await;
        let lot = ledger.create_lot(new_lot(material_id, "10")).await.unwrap();

        let result = ledger.apply_delta(lot.id, LotDelta::reserve(dec("11"))).await;
        assert!(matches!(result, Err(InventoryError::Invariant(_))));

        let stored = ledger.get_lot(lot.id).await.unwrap();
        assert_eq!(stored.allocated_quantity.weight, Decimal::ZERO);
    }

    #[tokio::test]
    async fn fully_consumed_lots_leave_the_active_list() {
        let (ledger, material_id) = setup().await;
        let lot = ledger.create_lot(new_lot(material_id, "10")).await.unwrap();
        ledger.create_lot(new_lot(material_id, "5")).await.unwrap();

        let consumed = ledger
            .apply_delta(lot.id, LotDelta::consume(dec("10")))
            .await
            .unwrap();
        assert!(consumed.is_fully_consumed);

        let active = ledger.list_active_lots(material_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, lot.id);

        let consumed_only = ledger
            .list_lots(&LotFilter {
                is_fully_consumed: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(consumed_only.len(), 1);
    }

    #[tokio::test]
    async fn retire_requires_no_allocation() {
        let (ledger, material_id) = setup().await;
        let lot = ledger.create_lot(new_lot(material_id, "10")).await.unwrap();
        ledger
            .apply_delta(lot.id, LotDelta::reserve(dec("2")))
            .await
            .unwrap();

        let blocked = ledger.retire_lot(lot.id).await;
        assert!(matches!(blocked, Err(InventoryError::StateConflict(_))));

        ledger
            .apply_delta(lot.id, LotDelta::release(dec("2")))
            .await
            .unwrap();
        let retired = ledger.retire_lot(lot.id).await.unwrap();
        assert!(!retired.is_active);
        assert!(ledger.list_active_lots(material_id).await.unwrap().is_empty());
    }
}
