use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ValuationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Cny,
    Usd,
    Hkd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Cny => "CNY",
            Currency::Usd => "USD",
            Currency::Hkd => "HKD",
        }
    }
}

/// Multiplier a provider applied to its figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitScale {
    One,
    Thousand,
    /// 万
    TenThousand,
    Million,
    /// 亿
    HundredMillion,
    Billion,
}

impl UnitScale {
    pub fn factor(&self) -> f64 {
        match self {
            UnitScale::One => 1.0,
            UnitScale::Thousand => 1e3,
            UnitScale::TenThousand => 1e4,
            UnitScale::Million => 1e6,
            UnitScale::HundredMillion => 1e8,
            UnitScale::Billion => 1e9,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UnitScale::One => "units",
            UnitScale::Thousand => "thousands",
            UnitScale::TenThousand => "ten-thousands",
            UnitScale::Million => "millions",
            UnitScale::HundredMillion => "hundred-millions",
            UnitScale::Billion => "billions",
        }
    }
}

/// Currency plus scale. Two amounts are only comparable when their tags are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitTag {
    pub currency: Currency,
    pub scale: UnitScale,
}

impl UnitTag {
    pub const fn new(currency: Currency, scale: UnitScale) -> Self {
        Self { currency, scale }
    }

    /// The tag every amount is converted to at the normalization boundary.
    pub const fn canonical(currency: Currency) -> Self {
        Self {
            currency,
            scale: UnitScale::One,
        }
    }

    pub fn is_canonical(&self) -> bool {
        self.scale == UnitScale::One
    }

    pub fn ensure_matches(&self, other: &UnitTag) -> Result<(), ValuationError> {
        if self == other {
            Ok(())
        } else {
            Err(ValuationError::UnitMismatch {
                expected: *self,
                found: *other,
            })
        }
    }
}

impl fmt::Display for UnitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.currency.code(), self.scale.label())
    }
}

/// A monetary amount that always travels with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: f64,
    pub unit: UnitTag,
}

impl Money {
    pub fn new(amount: f64, unit: UnitTag) -> Self {
        Self { amount, unit }
    }

    pub fn canonical(amount: f64, currency: Currency) -> Self {
        Self::new(amount, UnitTag::canonical(currency))
    }

    /// Rescale to the canonical unit of the same currency.
    pub fn to_canonical(self) -> Self {
        if self.unit.is_canonical() {
            return self;
        }
        Self {
            amount: self.amount * self.unit.scale.factor(),
            unit: UnitTag::canonical(self.unit.currency),
        }
    }

    pub fn checked_add(self, other: Money) -> Result<Money, ValuationError> {
        self.unit.ensure_matches(&other.unit)?;
        Ok(Money::new(self.amount + other.amount, self.unit))
    }

    pub fn checked_sub(self, other: Money) -> Result<Money, ValuationError> {
        self.unit.ensure_matches(&other.unit)?;
        Ok(Money::new(self.amount - other.amount, self.unit))
    }

    /// `(self - base) / base`, refusing to compare amounts in different units.
    pub fn relative_to(&self, base: &Money) -> Result<f64, ValuationError> {
        base.unit.ensure_matches(&self.unit)?;
        if base.amount == 0.0 {
            return Err(ValuationError::InvalidInput(
                "cannot compute a relative gap against a zero base".to_string(),
            ));
        }
        Ok((self.amount - base.amount) / base.amount)
    }

    /// Finite and strictly above zero
    pub fn is_positive(&self) -> bool {
        self.amount.is_finite() && self.amount > 0.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hundred_million_converts_to_yuan() {
        let mcap = Money::new(3003.62, UnitTag::new(Currency::Cny, UnitScale::HundredMillion));
        let canonical = mcap.to_canonical();

        assert_eq!(canonical.unit, UnitTag::canonical(Currency::Cny));
        assert_relative_eq!(canonical.amount, 300_362_000_000.0, max_relative = 1e-12);
    }

    #[test]
    fn test_canonical_conversion_is_idempotent() {
        let m = Money::canonical(42.0, Currency::Usd);
        assert_eq!(m.to_canonical(), m);
    }

    #[test]
    fn test_mismatched_units_refuse_arithmetic() {
        let yuan = Money::canonical(1.0e8, Currency::Cny);
        let yi = Money::new(1.0, UnitTag::new(Currency::Cny, UnitScale::HundredMillion));

        let err = yuan.checked_sub(yi).unwrap_err();
        assert!(matches!(err, ValuationError::UnitMismatch { .. }));
        assert!(yuan.relative_to(&yi).is_err());
    }

    #[test]
    fn test_relative_gap() {
        let value = Money::canonical(82_270_445_418.74, Currency::Cny);
        let mcap = Money::canonical(300_362_000_000.0, Currency::Cny);

        let gap = value.relative_to(&mcap).unwrap();
        assert_relative_eq!(gap, -0.7261, epsilon = 1e-4);
    }

    #[test]
    fn test_zero_base_is_rejected() {
        let value = Money::canonical(1.0, Currency::Cny);
        let zero = Money::canonical(0.0, Currency::Cny);
        assert!(matches!(
            value.relative_to(&zero),
            Err(ValuationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_positive_excludes_zero_and_non_finite() {
        assert!(Money::canonical(1.0, Currency::Cny).is_positive());
        assert!(!Money::canonical(0.0, Currency::Cny).is_positive());
        assert!(!Money::canonical(f64::NAN, Currency::Cny).is_positive());
        assert!(!Money::canonical(f64::INFINITY, Currency::Cny).is_positive());
    }

    #[test]
    fn test_unit_tag_display() {
        let tag = UnitTag::new(Currency::Cny, UnitScale::TenThousand);
        assert_eq!(tag.to_string(), "CNY (ten-thousands)");
    }
}
