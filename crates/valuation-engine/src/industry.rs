use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use valuation_core::{DiscountBasis, Industry, IndustryProfile, RevenueParameters, ValuationError};

static BUILTIN: LazyLock<Arc<IndustryTable>> = LazyLock::new(|| Arc::new(IndustryTable::builtin()));

/// Read-only lookup from industry to risk parameters.
///
/// Built once at startup and shared; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct IndustryTable {
    profiles: HashMap<Industry, IndustryProfile>,
    default: IndustryProfile,
}

#[allow(clippy::too_many_arguments)]
fn profile(
    industry_id: Industry,
    beta: f64,
    required_return: f64,
    margin_of_safety: f64,
    maintenance_capex_ratio: f64,
    terminal_growth_rate: f64,
    owner_earnings_discount: DiscountBasis,
    normalize_earnings: bool,
) -> IndustryProfile {
    IndustryProfile {
        industry_id,
        beta,
        required_return,
        margin_of_safety,
        maintenance_capex_ratio,
        terminal_growth_rate,
        owner_earnings_discount,
        normalize_earnings,
        revenue: revenue_parameters(industry_id),
    }
}

/// Price-to-sales multiples sit below mature-market levels; technology and
/// healthcare take longer-dated but richer margins.
fn revenue_parameters(industry: Industry) -> RevenueParameters {
    let price_to_sales = match industry {
        Industry::Technology => 6.5,
        Industry::Healthcare => 5.0,
        Industry::Services => 3.5,
        Industry::Consumer | Industry::Unclassified => 2.5,
        Industry::Manufacturing => 2.0,
        Industry::Finance | Industry::RealEstate => 1.5,
        Industry::Utilities | Industry::HeavyIndustry => 1.2,
    };
    let (years_to_profitability, target_profit_margin) = match industry {
        Industry::Technology => (2, 0.15),
        Industry::Healthcare => (4, 0.20),
        _ => (3, 0.10),
    };
    RevenueParameters {
        price_to_sales,
        years_to_profitability,
        target_profit_margin,
    }
}

impl IndustryTable {
    /// Process-wide table with the built-in parameters.
    pub fn global() -> Arc<IndustryTable> {
        Arc::clone(&BUILTIN)
    }

    pub fn builtin() -> Self {
        use DiscountBasis::{RequiredReturn, Wacc};
        use Industry::*;

        // Capital-intensive industries discount owner earnings at WACC so that
        // their leverage shows up in the rate; capital-light ones use the
        // required return on equity.
        let profiles = [
            profile(Utilities, 0.6, 0.085, 0.12, 0.7, 0.030, Wacc, false),
            profile(HeavyIndustry, 0.9, 0.13, 0.25, 0.6, 0.020, Wacc, true),
            profile(Technology, 1.3, 0.15, 0.20, 0.3, 0.035, RequiredReturn, false),
            profile(Finance, 0.8, 0.11, 0.20, 0.4, 0.025, RequiredReturn, false),
            profile(Consumer, 0.9, 0.11, 0.18, 0.5, 0.030, RequiredReturn, false),
            profile(Healthcare, 1.0, 0.13, 0.20, 0.4, 0.035, RequiredReturn, false),
            profile(RealEstate, 1.1, 0.14, 0.30, 0.5, 0.020, Wacc, true),
            profile(Manufacturing, 1.0, 0.12, 0.22, 0.6, 0.025, Wacc, true),
            profile(Services, 1.0, 0.13, 0.20, 0.4, 0.025, RequiredReturn, false),
        ];

        Self {
            profiles: profiles.into_iter().map(|p| (p.industry_id, p)).collect(),
            default: profile(Unclassified, 1.0, 0.10, 0.15, 0.5, 0.025, RequiredReturn, false),
        }
    }

    /// Built-in table with some profiles replaced by a JSON array of
    /// `IndustryProfile` objects.
    pub fn with_overrides_json(json: &str) -> Result<Self, ValuationError> {
        let overrides: Vec<IndustryProfile> = serde_json::from_str(json)
            .map_err(|e| ValuationError::Config(format!("invalid industry overrides: {}", e)))?;

        let mut table = Self::builtin();
        for p in overrides {
            validate_profile(&p)?;
            tracing::info!("Overriding industry profile for {}", p.industry_id);
            match p.industry_id {
                Industry::Unclassified => table.default = p,
                industry => {
                    table.profiles.insert(industry, p);
                }
            }
        }
        Ok(table)
    }

    pub fn profile(&self, industry: Industry) -> &IndustryProfile {
        match industry {
            Industry::Unclassified => &self.default,
            other => self.profiles.get(&other).unwrap_or(&self.default),
        }
    }

    /// Classify a free-form industry name and return its profile.
    pub fn resolve(&self, industry_name: &str) -> &IndustryProfile {
        self.profile(Industry::classify(industry_name))
    }
}

fn validate_profile(p: &IndustryProfile) -> Result<(), ValuationError> {
    let in_unit = |v: f64| (0.0..1.0).contains(&v);
    if !(p.beta.is_finite() && p.beta > 0.0) {
        return Err(ValuationError::Config(format!("{}: beta must be positive", p.industry_id)));
    }
    if !in_unit(p.margin_of_safety) {
        return Err(ValuationError::Config(format!(
            "{}: margin_of_safety must be in [0, 1)",
            p.industry_id
        )));
    }
    if !(0.0..=1.0).contains(&p.maintenance_capex_ratio) {
        return Err(ValuationError::Config(format!(
            "{}: maintenance_capex_ratio must be in [0, 1]",
            p.industry_id
        )));
    }
    if !(p.revenue.price_to_sales.is_finite() && p.revenue.price_to_sales > 0.0) {
        return Err(ValuationError::Config(format!(
            "{}: price_to_sales must be positive",
            p.industry_id
        )));
    }
    if !(p.revenue.target_profit_margin > 0.0 && p.revenue.target_profit_margin < 1.0) {
        return Err(ValuationError::Config(format!(
            "{}: target_profit_margin must be in (0, 1)",
            p.industry_id
        )));
    }
    if p.required_return <= p.terminal_growth_rate {
        return Err(ValuationError::Config(format!(
            "{}: required_return must exceed terminal_growth_rate",
            p.industry_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_industry_has_a_profile() {
        let table = IndustryTable::builtin();
        for industry in Industry::ALL {
            let p = table.profile(industry);
            assert_eq!(p.industry_id, industry);
            assert!(validate_profile(p).is_ok(), "{} profile invalid", industry);
        }
    }

    #[test]
    fn test_unclassified_uses_default_profile() {
        let table = IndustryTable::builtin();
        let p = table.resolve("综合");
        assert_eq!(p.industry_id, Industry::Unclassified);
        assert_eq!(p.required_return, 0.10);
        assert_eq!(p.margin_of_safety, 0.15);
    }

    #[test]
    fn test_resolve_by_name() {
        let table = IndustryTable::builtin();
        let p = table.resolve("电力、热力生产和供应业");
        assert_eq!(p.industry_id, Industry::Utilities);
        assert_eq!(p.beta, 0.6);
        assert_eq!(p.owner_earnings_discount, DiscountBasis::Wacc);
    }

    #[test]
    fn test_revenue_parameters_per_industry() {
        let table = IndustryTable::builtin();
        let tech = &table.profile(Industry::Technology).revenue;
        assert_eq!(tech.price_to_sales, 6.5);
        assert_eq!(tech.years_to_profitability, 2);
        assert_eq!(tech.target_profit_margin, 0.15);

        let health = &table.profile(Industry::Healthcare).revenue;
        assert_eq!(health.years_to_profitability, 4);
        assert_eq!(table.profile(Industry::Unclassified).revenue.price_to_sales, 2.5);
        assert_eq!(table.profile(Industry::Utilities).revenue.price_to_sales, 1.2);
    }

    #[test]
    fn test_override_with_zero_price_to_sales_rejected() {
        let json = r#"[{
            "industry_id": "services",
            "beta": 1.0,
            "required_return": 0.12,
            "margin_of_safety": 0.2,
            "maintenance_capex_ratio": 0.4,
            "terminal_growth_rate": 0.025,
            "owner_earnings_discount": "required_return",
            "revenue": {"price_to_sales": 0.0, "years_to_profitability": 3, "target_profit_margin": 0.1}
        }]"#;
        assert!(IndustryTable::with_overrides_json(json).is_err());
    }

    #[test]
    fn test_global_table_is_shared() {
        let a = IndustryTable::global();
        let b = IndustryTable::global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_overrides_replace_profiles() {
        let json = r#"[{
            "industry_id": "finance",
            "beta": 0.7,
            "required_return": 0.12,
            "margin_of_safety": 0.25,
            "maintenance_capex_ratio": 0.4,
            "terminal_growth_rate": 0.02,
            "owner_earnings_discount": "wacc"
        }]"#;

        let table = IndustryTable::with_overrides_json(json).unwrap();
        let p = table.profile(Industry::Finance);
        assert_eq!(p.beta, 0.7);
        assert_eq!(p.owner_earnings_discount, DiscountBasis::Wacc);
        assert!(!p.normalize_earnings);
        assert_eq!(p.revenue, RevenueParameters::default());
        // untouched entries keep built-in values
        assert_eq!(table.profile(Industry::Technology).beta, 1.3);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let json = r#"[{
            "industry_id": "technology",
            "beta": 1.2,
            "required_return": 0.03,
            "margin_of_safety": 0.2,
            "maintenance_capex_ratio": 0.3,
            "terminal_growth_rate": 0.04,
            "owner_earnings_discount": "required_return"
        }]"#;

        let err = IndustryTable::with_overrides_json(json).unwrap_err();
        assert!(matches!(err, ValuationError::Config(_)));
        assert!(IndustryTable::with_overrides_json("not json").is_err());
    }
}
