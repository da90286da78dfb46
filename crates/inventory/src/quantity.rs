use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places used for reported figures.
pub const REPORT_DP: u32 = 4;

/// A physical amount of material: weight in kilograms, length in metres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Quantity {
    pub weight: Decimal,
    #[serde(default)]
    pub length: Decimal,
}

impl Quantity {
    pub fn new(weight: Decimal, length: Decimal) -> Self {
        Self { weight, length }
    }

    /// A weight-only quantity.
    pub fn of_weight(weight: Decimal) -> Self {
        Self {
            weight,
            length: Decimal::ZERO,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_non_negative(&self) -> bool {
        self.weight >= Decimal::ZERO && self.length >= Decimal::ZERO
    }
}

/// Rounds a reported figure.
pub fn round_report(value: Decimal) -> Decimal {
    value.round_dp(REPORT_DP).normalize()
}
