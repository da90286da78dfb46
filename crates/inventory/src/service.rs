use common::LotId;
use doc_store::DocumentStore;

use crate::allocation::AllocationEngine;
use crate::availability::AvailabilityChecker;
use crate::catalog::MaterialCatalog;
use crate::costing::{CostingEngine, SnapshotCache};
use crate::error::Result;
use crate::ledger::{DEFAULT_MAX_RETRIES, LotLedger};
use crate::lifo::LifoPlanner;
use crate::locks::MaterialLocks;
use crate::lot::{MaterialLot, NewLot};
use crate::purchase_order::PurchaseOrders;

#[derive(Debug, Clone, Copy)]
pub struct InventoryConfig {
    /// Re-reads allowed after a version conflict before giving up.
    pub max_retries: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Wires the inventory components over one store.
///
/// Every component shares the same snapshot cache and material locks.
#[derive(Clone)]
pub struct InventoryService<S> {
    store: S,
    ledger: LotLedger<S>,
    costing: CostingEngine<S>,
    allocation: AllocationEngine<S>,
    availability: AvailabilityChecker<S>,
    lifo: LifoPlanner<S>,
    catalog: MaterialCatalog<S>,
    purchase_orders: PurchaseOrders<S>,
}

impl<S: DocumentStore + Clone> InventoryService<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, InventoryConfig::default())
    }

    pub fn with_config(store: S, config: InventoryConfig) -> Self {
        let cache = SnapshotCache::default();
        let locks = MaterialLocks::new();

        let ledger = LotLedger::new(store.clone(), cache).with_max_retries(config.max_retries);
        let costing = CostingEngine::new(ledger.clone());
        let allocation = AllocationEngine::new(ledger.clone(), costing.clone(), locks.clone());
        let availability = AvailabilityChecker::new(ledger.clone());
        let lifo = LifoPlanner::new(ledger.clone(), costing.clone(), locks);
        let catalog = MaterialCatalog::new(store.clone(), costing.clone());
        let purchase_orders = PurchaseOrders::new(ledger.clone(), costing.clone(), catalog.clone());

        Self {
            store,
            ledger,
            costing,
            allocation,
            availability,
            lifo,
            catalog,
            purchase_orders,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &LotLedger<S> {
        &self.ledger
    }

    pub fn costing(&self) -> &CostingEngine<S> {
        &self.costing
    }

    pub fn allocation(&self) -> &AllocationEngine<S> {
        &self.allocation
    }

    pub fn availability(&self) -> &AvailabilityChecker<S> {
        &self.availability
    }

    pub fn lifo(&self) -> &LifoPlanner<S> {
        &self.lifo
    }

    pub fn catalog(&self) -> &MaterialCatalog<S> {
        &self.catalog
    }

    pub fn purchase_orders(&self) -> &PurchaseOrders<S> {
        &self.purchase_orders
    }

    /// Records a lot and refreshes its material's inventory snapshot.
    pub async fn create_lot(&self, new_lot: NewLot) -> Result<MaterialLot> {
        let lot = self.ledger.create_lot(new_lot).await?;
        self.costing
            .recompute_material_inventory(lot.material_id)
            .await?;
        Ok(lot)
    }

    /// Retires a lot and refreshes its material's inventory snapshot.
    pub async fn retire_lot(&self, lot_id: LotId) -> Result<MaterialLot> {
        let lot = self.ledger.retire_lot(lot_id).await?;
        self.costing
            .recompute_material_inventory(lot.material_id)
            .await?;
        Ok(lot)
    }
}
