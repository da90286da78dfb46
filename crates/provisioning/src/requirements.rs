//! Material requirements of a quotation, as supplied by the calculator.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use common::{MaterialId, QuotationId};
use inventory::MaterialRequirement;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProvisioningError, Result};

/// A requirement as produced by the material calculator. Weights may arrive
/// as numbers, strings or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRequirement {
    pub material_id: String,
    #[serde(default)]
    pub required_weight: Option<Value>,
    #[serde(default)]
    pub material_name: Option<String>,
}

impl RawRequirement {
    pub fn new(material_id: MaterialId, required_weight: Decimal) -> Self {
        Self {
            material_id: material_id.to_string(),
            required_weight: Some(Value::String(required_weight.to_string())),
            material_name: None,
        }
    }
}

fn parse_weight(value: Option<&Value>) -> Result<Decimal> {
    match value {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map_err(|_| ProvisioningError::validation(format!("invalid weight {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Decimal::ZERO),
        Some(Value::String(s)) => Decimal::from_str(s.trim())
            .map_err(|_| ProvisioningError::validation(format!("invalid weight {s:?}"))),
        Some(other) => Err(ProvisioningError::validation(format!(
            "invalid weight {other}"
        ))),
    }
}

/// Turns calculator output into strict requirements.
///
/// Entries for the same material are summed, keeping the order each material
/// first appeared in. Materials whose total is not positive are dropped.
pub fn normalize(raw: &[RawRequirement]) -> Result<Vec<MaterialRequirement>> {
    let mut order: Vec<MaterialId> = Vec::new();
    let mut totals: HashMap<MaterialId, Decimal> = HashMap::new();

    for entry in raw {
        let material_id = MaterialId::from_str(entry.material_id.trim()).map_err(|_| {
            ProvisioningError::validation(format!("invalid material id {:?}", entry.material_id))
        })?;
        let weight = parse_weight(entry.required_weight.as_ref())?;

        match totals.get_mut(&material_id) {
            Some(total) => *total += weight,
            None => {
                order.push(material_id);
                totals.insert(material_id, weight);
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|material_id| {
            let total = totals.get(&material_id).copied().unwrap_or_default();
            (total > Decimal::ZERO).then(|| MaterialRequirement::new(material_id, total))
        })
        .collect())
}

/// Supplies the material requirements of a quotation.
///
/// [`Quotations`](crate::Quotations) reads them from the stored quotation.
#[async_trait]
pub trait RequirementSource: Send + Sync {
    async fn requirements_for(&self, quotation_id: QuotationId) -> Result<Vec<RawRequirement>>;
}
