//! Procurement lots and their quantity arithmetic.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use common::{LotId, MaterialId, SupplierId};
use doc_store::Document;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};
use crate::quantity::Quantity;

/// Where a lot is physically kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    Sac,
    Drum,
    Bobbin,
    Rack,
    Warehouse,
}

impl StorageLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageLocation::Sac => "sac",
            StorageLocation::Drum => "drum",
            StorageLocation::Bobbin => "bobbin",
            StorageLocation::Rack => "rack",
            StorageLocation::Warehouse => "warehouse",
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    pub location: StorageLocation,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default = "one")]
    pub container_count: u32,
}

impl Storage {
    pub fn at(location: StorageLocation) -> Self {
        Self {
            location,
            details: None,
            container_count: 1,
        }
    }
}

fn default_currency() -> String {
    "INR".to_string()
}

/// Purchase pricing of a lot.
///
/// `total_cost` defaults to `initial weight × price_per_kg` when not given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub price_per_kg: Decimal,
    #[serde(default)]
    pub price_per_km: Option<Decimal>,
    #[serde(default)]
    pub total_cost: Option<Decimal>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Pricing {
    pub fn per_kg(price_per_kg: Decimal) -> Self {
        Self {
            price_per_kg,
            price_per_km: None,
            total_cost: None,
            currency: default_currency(),
        }
    }

    pub fn with_price_per_km(mut self, price_per_km: Decimal) -> Self {
        self.price_per_km = Some(price_per_km);
        self
    }

    /// Total cost of `weight` kilograms at this price, unless stated explicitly.
    pub fn total_for(&self, weight: Decimal) -> Decimal {
        self.total_cost.unwrap_or(weight * self.price_per_kg)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let negative = self.price_per_kg < Decimal::ZERO
            || self.price_per_km.is_some_and(|p| p < Decimal::ZERO)
            || self.total_cost.is_some_and(|c| c < Decimal::ZERO);
        if negative {
            return Err(InventoryError::validation("prices must not be negative"));
        }
        Ok(())
    }
}

/// Paperwork a lot arrived with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default)]
    pub po_number: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub grn_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One dated procurement batch of a single material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialLot {
    pub id: LotId,
    pub lot_number: String,
    pub material_id: MaterialId,
    pub supplier_id: SupplierId,
    pub purchase_date: DateTime<Utc>,
    pub initial_quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub allocated_quantity: Quantity,
    pub pricing: Pricing,
    pub storage: Storage,
    #[serde(default)]
    pub provenance: Provenance,
    pub is_active: bool,
    pub is_fully_consumed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for MaterialLot {
    type Id = LotId;
    const COLLECTION: &'static str = "material_lots";

    fn id(&self) -> LotId {
        self.id
    }
}

impl MaterialLot {
    /// Weight that is neither consumed nor reserved.
    pub fn available_weight(&self) -> Decimal {
        self.remaining_quantity.weight - self.allocated_quantity.weight
    }

    /// Whether the lot takes part in allocation and costing.
    pub fn is_usable(&self) -> bool {
        self.is_active && !self.is_fully_consumed
    }

    /// Returns a copy of the lot with `delta` applied.
    ///
    /// Fails with `Invariant` if the result would have negative quantities
    /// or more allocated than remaining weight.
    pub fn with_delta(&self, delta: &LotDelta) -> Result<MaterialLot> {
        let remaining = self.remaining_quantity.weight + delta.remaining_delta;
        let allocated = self.allocated_quantity.weight + delta.allocated_delta;

        if remaining < Decimal::ZERO {
            return Err(InventoryError::Invariant(format!(
                "lot {} remaining weight would become {remaining}",
                self.lot_number
            )));
        }
        if allocated < Decimal::ZERO {
            return Err(InventoryError::Invariant(format!(
                "lot {} allocated weight would become {allocated}",
                self.lot_number
            )));
        }
        if allocated > remaining {
            return Err(InventoryError::Invariant(format!(
                "lot {} would have {allocated} kg allocated of {remaining} kg remaining",
                self.lot_number
            )));
        }

        let mut lot = self.clone();
        lot.remaining_quantity.weight = remaining;
        lot.allocated_quantity.weight = allocated;

        if delta.rescale_length && self.initial_quantity.weight > Decimal::ZERO {
            lot.remaining_quantity.length =
                self.initial_quantity.length * remaining / self.initial_quantity.weight;
        }

        lot.is_fully_consumed = remaining.is_zero();
        lot.updated_at = Utc::now();
        Ok(lot)
    }
}

/// LIFO ordering: most recent purchase first, later-created lot first on ties.
pub fn lifo_order(a: &MaterialLot, b: &MaterialLot) -> Ordering {
    b.purchase_date
        .cmp(&a.purchase_date)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Signed change to a lot's remaining and allocated weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LotDelta {
    pub remaining_delta: Decimal,
    pub allocated_delta: Decimal,
    /// Recompute remaining length in proportion to remaining weight.
    #[serde(default)]
    pub rescale_length: bool,
}

impl LotDelta {
    pub fn new(remaining_delta: Decimal, allocated_delta: Decimal) -> Self {
        Self {
            remaining_delta,
            allocated_delta,
            rescale_length: false,
        }
    }

    /// Reserve `weight` kilograms.
    pub fn reserve(weight: Decimal) -> Self {
        Self::new(Decimal::ZERO, weight)
    }

    /// Release `weight` kilograms of reservation.
    pub fn release(weight: Decimal) -> Self {
        Self::new(Decimal::ZERO, -weight)
    }

    /// Consume `weight` kilograms of unreserved stock.
    pub fn consume(weight: Decimal) -> Self {
        Self::new(-weight, Decimal::ZERO)
    }

    pub fn with_length_rescale(mut self) -> Self {
        self.rescale_length = true;
        self
    }
}

/// Input for creating a lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLot {
    pub material_id: MaterialId,
    pub supplier_id: SupplierId,
    /// Defaults to the time of creation.
    #[serde(default)]
    pub purchase_date: Option<DateTime<Utc>>,
    pub initial_quantity: Quantity,
    pub pricing: Pricing,
    #[serde(default)]
    pub storage: Option<Storage>,
    #[serde(default)]
    pub provenance: Provenance,
}

impl NewLot {
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.initial_quantity.is_non_negative() {
            return Err(InventoryError::validation(
                "initial quantity must not be negative",
            ));
        }
        self.pricing.validate()?;
        match &self.storage {
            None => Err(InventoryError::validation("storage location is required")),
            Some(storage) if storage.container_count == 0 => Err(InventoryError::validation(
                "container count must be at least 1",
            )),
            Some(_) => Ok(()),
        }
    }
}

/// Criteria for listing lots. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotFilter {
    pub material_id: Option<MaterialId>,
    pub supplier_id: Option<SupplierId>,
    pub is_fully_consumed: Option<bool>,
    pub is_active: Option<bool>,
    pub purchased_from: Option<DateTime<Utc>>,
    pub purchased_to: Option<DateTime<Utc>>,
}

impl LotFilter {
    pub fn matches(&self, lot: &MaterialLot) -> bool {
        self.material_id.is_none_or(|id| lot.material_id == id)
            && self.supplier_id.is_none_or(|id| lot.supplier_id == id)
            && self
                .is_fully_consumed
                .is_none_or(|flag| lot.is_fully_consumed == flag)
            && self.is_active.is_none_or(|flag| lot.is_active == flag)
            && self.purchased_from.is_none_or(|from| lot.purchase_date >= from)
            && self.purchased_to.is_none_or(|to| lot.purchase_date <= to)
    }
}

/// Prefix shared by all lot numbers issued on `date`.
pub fn lot_number_prefix(date: NaiveDate) -> String {
    format!("LOT-{}-", date.format("%Y%m%d"))
}

/// Formats the `sequence`-th lot number of `date`, e.g. `LOT-20240105-0003`.
pub fn lot_number(date: NaiveDate, sequence: usize) -> String {
    format!("{}{sequence:04}", lot_number_prefix(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn lot(weight: &str, allocated: &str) -> MaterialLot {
        let now = Utc::now();
        MaterialLot {
            id: LotId::new(),
            lot_number: "LOT-20240101-0001".to_string(),
            material_id: MaterialId::new(),
            supplier_id: SupplierId::new(),
            purchase_date: now,
            initial_quantity: Quantity::new(dec("100"), dec("2000")),
            remaining_quantity: Quantity::new(dec(weight), dec("2000")),
            allocated_quantity: Quantity::of_weight(dec(allocated)),
            pricing: Pricing::per_kg(dec("750")),
            storage: Storage::at(StorageLocation::Drum),
            provenance: Provenance::default(),
            is_active: true,
            is_fully_consumed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn available_weight_excludes_reservations() {
        assert_eq!(lot("100", "30").available_weight(), dec("70"));
    }

    #[test]
    fn delta_updates_weights_and_consumed_flag() {
        let updated = lot("100", "30")
            .with_delta(&LotDelta::new(dec("-100"), dec("-30")))
            .unwrap();
        assert_eq!(updated.remaining_quantity.weight, Decimal::ZERO);
        assert_eq!(updated.allocated_quantity.weight, Decimal::ZERO);
        assert!(updated.is_fully_consumed);
    }

    #[test]
    fn over_allocation_is_an_invariant_violation() {
        let result = lot("100", "30").with_delta(&LotDelta::reserve(dec("70.01")));
        assert!(matches!(result, Err(InventoryError::Invariant(_))));
    }

    #[test]
    fn negative_quantities_are_invariant_violations() {
        assert!(matches!(
            lot("10", "0").with_delta(&LotDelta::consume(dec("11"))),
            Err(InventoryError::Invariant(_))
        ));
        assert!(matches!(
            lot("10", "2").with_delta(&LotDelta::release(dec("3"))),
            Err(InventoryError::Invariant(_))
        ));
    }

    #[test]
    fn consuming_allocated_stock_keeps_allocation_within_remaining() {
        let result = lot("50", "40").with_delta(&LotDelta::consume(dec("20")));
        assert!(matches!(result, Err(InventoryError::Invariant(_))));
    }

    #[test]
    fn length_rescales_with_weight() {
        let updated = lot("100", "0")
            .with_delta(&LotDelta::consume(dec("25")).with_length_rescale())
            .unwrap();
        assert_eq!(updated.remaining_quantity.length, dec("1500"));

        let untouched = lot("100", "0")
            .with_delta(&LotDelta::consume(dec("25")))
            .unwrap();
        assert_eq!(untouched.remaining_quantity.length, dec("2000"));
    }

    #[test]
    fn lifo_orders_newest_purchase_first_then_newest_creation() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut older = lot("10", "0");
        older.purchase_date = base;
        let mut newer = lot("10", "0");
        newer.purchase_date = base + Duration::days(1);
        let mut tie = lot("10", "0");
        tie.purchase_date = base;
        tie.created_at = older.created_at + Duration::seconds(5);

        let mut lots = vec![older.clone(), newer.clone(), tie.clone()];
        lots.sort_by(lifo_order);
        let ids: Vec<_> = lots.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![newer.id, tie.id, older.id]);
    }

    #[test]
    fn lot_numbers_are_dated_and_padded() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(lot_number(date, 3), "LOT-20240105-0003");
        assert_eq!(lot_number_prefix(date), "LOT-20240105-");
    }

    #[test]
    fn new_lot_requires_storage_and_non_negative_figures() {
        let mut new_lot = NewLot {
            material_id: MaterialId::new(),
            supplier_id: SupplierId::new(),
            purchase_date: None,
            initial_quantity: Quantity::of_weight(dec("10")),
            pricing: Pricing::per_kg(dec("5")),
            storage: None,
            provenance: Provenance::default(),
        };
        assert!(matches!(
            new_lot.validate(),
            Err(InventoryError::Validation(_))
        ));

        new_lot.storage = Some(Storage::at(StorageLocation::Rack));
        assert!(new_lot.validate().is_ok());

        new_lot.pricing.price_per_kg = dec("-1");
        assert!(new_lot.validate().is_err());

        new_lot.pricing.price_per_kg = dec("1");
        new_lot.initial_quantity.length = dec("-1");
        assert!(new_lot.validate().is_err());
    }

    #[test]
    fn filter_matches_on_every_set_field() {
        let lot = lot("10", "0");
        let filter = LotFilter {
            material_id: Some(lot.material_id),
            is_fully_consumed: Some(false),
            ..Default::default()
        };
        assert!(filter.matches(&lot));

        let other_supplier = LotFilter {
            supplier_id: Some(SupplierId::new()),
            ..Default::default()
        };
        assert!(!other_supplier.matches(&lot));
    }
}
