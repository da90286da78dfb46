//! Costing Engine: weighted-average and last-purchase pricing per material.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::MaterialId;
use doc_store::{DocumentStore, DocumentStoreExt};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{InventoryError, Result};
use crate::ledger::LotLedger;
use crate::lot::MaterialLot;
use crate::material::{InventorySnapshot, Material};

#[derive(Default)]
struct CacheEntry {
    generation: u64,
    snapshot: Option<InventorySnapshot>,
}

/// Memoized snapshots keyed by material.
///
/// Every invalidation bumps the material's generation. A snapshot is only
/// stored if no invalidation happened since the generation it was computed
/// from, so a recompute that raced a lot write cannot cache stale totals.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    entries: Arc<RwLock<HashMap<MaterialId, CacheEntry>>>,
}

impl SnapshotCache {
    pub async fn get(&self, material_id: MaterialId) -> Option<InventorySnapshot> {
        self.entries
            .read()
            .await
            .get(&material_id)
            .and_then(|entry| entry.snapshot.clone())
    }

    /// Read before loading lots; pass the value to [`put`](Self::put).
    pub async fn generation(&self, material_id: MaterialId) -> u64 {
        self.entries
            .read()
            .await
            .get(&material_id)
            .map_or(0, |entry| entry.generation)
    }

    /// Stores `snapshot` if the material is still at `generation`.
    /// Returns false when a lot write got in between.
    pub async fn put(
        &self,
        material_id: MaterialId,
        generation: u64,
        snapshot: InventorySnapshot,
    ) -> bool {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(material_id).or_default();
        if entry.generation != generation {
            return false;
        }
        entry.snapshot = Some(snapshot);
        true
    }

    pub async fn invalidate(&self, material_id: MaterialId) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(material_id).or_default();
        entry.generation += 1;
        entry.snapshot = None;
    }
}

/// Projects a snapshot from a material's usable lots.
///
/// `computed_at` is left unset; the caller stamps it.
pub fn compute_snapshot(lots: &[MaterialLot]) -> InventorySnapshot {
    let mut total_weight = Decimal::ZERO;
    let mut weighted_kg = Decimal::ZERO;
    let mut total_length = Decimal::ZERO;
    let mut weighted_km = Decimal::ZERO;

    for lot in lots {
        let weight = lot.remaining_quantity.weight;
        total_weight += weight;
        weighted_kg += weight * lot.pricing.price_per_kg;

        let length = lot.remaining_quantity.length;
        if length > Decimal::ZERO
            && let Some(price_per_km) = lot.pricing.price_per_km
        {
            total_length += length;
            weighted_km += length * price_per_km;
        }
    }

    let latest = lots.iter().max_by_key(|lot| lot.purchase_date);

    InventorySnapshot {
        total_weight,
        total_length,
        avg_price_per_kg: if total_weight > Decimal::ZERO {
            weighted_kg / total_weight
        } else {
            Decimal::ZERO
        },
        avg_price_per_km: if total_length > Decimal::ZERO {
            weighted_km / total_length
        } else {
            Decimal::ZERO
        },
        last_price_per_kg: latest.map_or(Decimal::ZERO, |lot| lot.pricing.price_per_kg),
        last_price_per_km: latest
            .and_then(|lot| lot.pricing.price_per_km)
            .unwrap_or(Decimal::ZERO),
        last_purchase_date: latest.map(|lot| lot.purchase_date),
        active_lots: lots.len(),
        computed_at: None,
    }
}

/// Derives inventory snapshots from live lot state.
#[derive(Clone)]
pub struct CostingEngine<S> {
    ledger: LotLedger<S>,
    cache: SnapshotCache,
}

impl<S: DocumentStore + Clone> CostingEngine<S> {
    /// Creates an engine sharing the ledger's snapshot cache.
    pub fn new(ledger: LotLedger<S>) -> Self {
        let cache = ledger.cache().clone();
        Self { ledger, cache }
    }

    pub fn ledger(&self) -> &LotLedger<S> {
        &self.ledger
    }

    /// Recomputes the snapshot from lots and writes it into the material.
    ///
    /// If a lot of the material is written while this runs, the projection
    /// is redone so neither the cache nor the material keeps older totals.
    #[tracing::instrument(skip(self))]
    pub async fn recompute_material_inventory(
        &self,
        material_id: MaterialId,
    ) -> Result<InventorySnapshot> {
        let mut attempt = 0;
        loop {
            let generation = self.cache.generation(material_id).await;
            let snapshot = self.project(material_id).await?;

            if self.cache.put(material_id, generation, snapshot.clone()).await {
                debug!(
                    total_weight = %snapshot.total_weight,
                    active_lots = snapshot.active_lots,
                    "inventory recomputed"
                );
                return Ok(snapshot);
            }
            if attempt >= self.ledger.max_retries() {
                // left uncached; the next read recomputes
                debug!(attempt, "lots kept changing during recompute");
                return Ok(snapshot);
            }
            attempt += 1;
        }
    }

    /// Computes a snapshot from the active lots and stores it on the material.
    async fn project(&self, material_id: MaterialId) -> Result<InventorySnapshot> {
        let lots = self.ledger.list_active_lots(material_id).await?;
        let mut snapshot = compute_snapshot(&lots);
        snapshot.computed_at = Some(Utc::now());

        self.ledger
            .store()
            .modify::<Material, InventoryError, _>(
                material_id,
                self.ledger.max_retries(),
                |material| {
                    let mut updated = material.clone();
                    updated.inventory = snapshot.clone();
                    updated.updated_at = Utc::now();
                    Ok(updated)
                },
            )
            .await?;
        Ok(snapshot)
    }

    /// Returns the memoized snapshot, recomputing it on a miss.
    pub async fn inventory_snapshot(&self, material_id: MaterialId) -> Result<InventorySnapshot> {
        if let Some(snapshot) = self.cache.get(material_id).await {
            return Ok(snapshot);
        }
        self.recompute_material_inventory(material_id).await
    }
}
