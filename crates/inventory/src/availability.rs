//! Material Availability Checker.

use common::MaterialId;
use doc_store::DocumentStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};
use crate::ledger::LotLedger;
use crate::material::{Material, MaterialCategory};

/// How much of a material is needed. Weight in kilograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: MaterialId,
    #[serde(default)]
    pub required_weight: Decimal,
}

impl MaterialRequirement {
    pub fn new(material_id: MaterialId, required_weight: Decimal) -> Self {
        Self {
            material_id,
            required_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialAvailability {
    pub material_id: MaterialId,
    pub material_name: String,
    pub category: Option<MaterialCategory>,
    pub required_weight: Decimal,
    pub total_remaining: Decimal,
    pub total_allocated: Decimal,
    pub total_available: Decimal,
    pub lot_count: usize,
    pub is_available: bool,
    pub is_sufficient: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub materials: Vec<MaterialAvailability>,
    pub all_available: bool,
    pub all_sufficient: bool,
}

/// Read-only view of free stock. Takes no material locks, so the figures
/// are a best-effort snapshot under concurrent allocation.
#[derive(Clone)]
pub struct AvailabilityChecker<S> {
    ledger: LotLedger<S>,
}

impl<S: DocumentStore + Clone> AvailabilityChecker<S> {
    pub fn new(ledger: LotLedger<S>) -> Self {
        Self { ledger }
    }

    #[tracing::instrument(skip(self, requirements), fields(count = requirements.len()))]
    pub async fn check_availability(
        &self,
        requirements: &[MaterialRequirement],
    ) -> Result<AvailabilityReport> {
        if requirements.is_empty() {
            return Err(InventoryError::validation(
                "at least one material requirement is needed",
            ));
        }

        let mut materials = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            materials.push(self.check_one(requirement).await?);
        }

        Ok(AvailabilityReport {
            all_available: materials.iter().all(|m| m.is_available),
            all_sufficient: materials.iter().all(|m| m.is_sufficient),
            materials,
        })
    }

    async fn check_one(&self, requirement: &MaterialRequirement) -> Result<MaterialAvailability> {
        let lots = self.ledger.list_active_lots(requirement.material_id).await?;
        let total_remaining: Decimal = lots.iter().map(|l| l.remaining_quantity.weight).sum();
        let total_allocated: Decimal = lots.iter().map(|l| l.allocated_quantity.weight).sum();
        let total_available = total_remaining - total_allocated;

        let material = self
            .ledger
            .store()
            .get::<Material>(requirement.material_id)
            .await?
            .map(|v| v.document);

        let required = requirement.required_weight;
        let is_available = total_available > Decimal::ZERO;
        let is_sufficient = if required > Decimal::ZERO {
            total_available >= required
        } else {
            is_available
        };

        Ok(MaterialAvailability {
            material_id: requirement.material_id,
            material_name: material
                .as_ref()
                .map_or_else(|| "Unknown".to_string(), |m| m.name.clone()),
            category: material.map(|m| m.category),
            required_weight: required,
            total_remaining,
            total_allocated,
            total_available,
            lot_count: lots.len(),
            is_available,
            is_sufficient,
        })
    }
}
