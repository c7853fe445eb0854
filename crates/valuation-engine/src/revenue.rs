use valuation_core::{
    FinancialHistory, GrowthCompanyReason, GrowthEstimate, Industry, ModelKind, ModelStatus,
    ModelValuation, ValuationNote,
};

use crate::config::EngineConfig;
use crate::model::{IntrinsicValueModel, ModelInputs, ModelOutcome};

/// Revenue-based valuation for companies whose cash flows say nothing yet.
///
/// Blends an industry price-to-sales multiple with the present value of the
/// profits the company is assumed to reach. Loss-making companies turn
/// profitable after the industry's `years_to_profitability` at its target
/// margin; profitable ones start from their current margin.
#[derive(Debug, Clone)]
pub struct RevenueModel {
    discount_rate: f64,
    terminal_growth: f64,
    profit_years: u32,
    default_growth: f64,
    min_growth: f64,
    max_growth: f64,
}

/// Profit path feeding the discounted part of the revenue model
#[derive(Debug, Clone, Copy, PartialEq)]
struct ProfitPath {
    years_to_profitability: u32,
    base_income: f64,
    growth: f64,
    price_to_sales_weight: f64,
}

impl RevenueModel {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            discount_rate: config.revenue_discount_rate,
            terminal_growth: config.revenue_terminal_growth,
            profit_years: config.revenue_profit_years,
            default_growth: config.default_revenue_growth,
            min_growth: config.min_growth,
            max_growth: config.max_growth,
        }
    }

    fn revenue_growth(&self, growth: &GrowthEstimate) -> f64 {
        growth
            .revenue_growth
            .unwrap_or(self.default_growth)
            .clamp(self.min_growth, self.max_growth)
    }

    fn profit_path(&self, revenue: f64, net_income: f64, growth: f64, target_margin: f64, years: u32) -> ProfitPath {
        if net_income <= 0.0 {
            let future_revenue = revenue * (1.0 + growth).powi(years as i32);
            return ProfitPath {
                years_to_profitability: years,
                base_income: future_revenue * target_margin,
                growth: growth * 0.5,
                price_to_sales_weight: 0.5,
            };
        }

        let margin = net_income / revenue;
        // high growth decays toward a sustainable rate
        let decayed = if growth > 0.30 {
            0.20
        } else if growth > 0.20 {
            0.15
        } else {
            (growth * 0.6).min(0.08)
        };
        let effective_margin = if margin < 0.05 && growth > 0.20 {
            (margin * 1.5).max(target_margin * 0.8)
        } else {
            (margin * 1.2).min(target_margin)
        };
        ProfitPath {
            years_to_profitability: 0,
            base_income: revenue * effective_margin,
            growth: decayed,
            price_to_sales_weight: if growth > 0.20 { 0.5 } else { 0.7 },
        }
    }

    /// Present value of `profit_years` of growing profit starting after
    /// `years_to_profitability`, plus a Gordon perpetuity.
    fn profit_value(&self, path: &ProfitPath) -> f64 {
        let r = self.discount_rate;
        let offset = path.years_to_profitability as i32;
        let n = self.profit_years as i32;

        let explicit: f64 = (1..=n)
            .map(|year| path.base_income * (1.0 + path.growth).powi(year) / (1.0 + r).powi(offset + year))
            .sum();
        let final_income = path.base_income * (1.0 + path.growth).powi(n);
        let terminal = final_income * (1.0 + self.terminal_growth) / (r - self.terminal_growth);
        explicit + terminal / (1.0 + r).powi(offset + n)
    }
}

impl IntrinsicValueModel for RevenueModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Revenue
    }

    fn value(&self, inputs: &ModelInputs<'_>) -> ModelOutcome {
        let latest = inputs.history.latest();
        let revenue = latest.operating_revenue;

        if revenue <= 0.0 || !revenue.is_finite() {
            tracing::debug!("Operating revenue {:.2} is not positive; revenue value is 0", revenue);
            return ModelOutcome {
                valuation: ModelValuation::inapplicable(ModelKind::Revenue, revenue, self.discount_rate),
                notes: vec![ValuationNote::RevenueInapplicable {
                    operating_revenue: revenue,
                }],
                rate_guarded: false,
            };
        }

        let params = &inputs.profile.revenue;
        let growth = self.revenue_growth(inputs.growth);
        let price_to_sales_value = revenue * params.price_to_sales;

        let path = self.profit_path(
            revenue,
            latest.net_income,
            growth,
            params.target_profit_margin,
            params.years_to_profitability,
        );
        let profitability_value = self.profit_value(&path);
        let w = path.price_to_sales_weight;
        let value = w * price_to_sales_value + (1.0 - w) * profitability_value;

        tracing::debug!(
            "Revenue value {:.2} (P/S {:.2}x -> {:.2}, profitability -> {:.2})",
            value,
            params.price_to_sales,
            price_to_sales_value,
            profitability_value
        );

        ModelOutcome {
            valuation: ModelValuation {
                model: ModelKind::Revenue,
                status: ModelStatus::Applied,
                baseline: revenue,
                discount_rate: self.discount_rate,
                gross_value: value,
                value,
                breakdown: None,
                gap: None,
                signal: None,
            },
            notes: vec![ValuationNote::RevenueBasedValuation {
                price_to_sales: params.price_to_sales,
                price_to_sales_value,
                profitability_value,
                years_to_profitability: path.years_to_profitability,
            }],
            rate_guarded: false,
        }
    }
}

/// Classify a company as a growth company from its latest figures and the
/// estimated revenue and operating profit growth.
pub fn growth_company_reason(
    history: &FinancialHistory,
    growth: &GrowthEstimate,
    industry: Industry,
) -> Option<GrowthCompanyReason> {
    let latest = history.latest();
    let revenue = latest.operating_revenue;
    let revenue_growth = growth.revenue_growth?;
    if revenue <= 0.0 {
        return None;
    }
    let net_margin = latest.net_income / revenue;

    if latest.net_income <= 0.0 && revenue_growth > 0.05 {
        return Some(GrowthCompanyReason::LossMakingWithRevenueGrowth);
    }
    if revenue_growth > 0.20 {
        return Some(GrowthCompanyReason::HighRevenueGrowth);
    }
    let growth_industry = matches!(
        industry,
        Industry::Technology | Industry::Healthcare | Industry::Services
    );
    if growth_industry && revenue_growth > 0.15 && net_margin < 0.10 {
        return Some(GrowthCompanyReason::GrowthIndustryLowMargin);
    }
    if latest.capital_expenditure / revenue > 0.15 && revenue_growth > 0.10 {
        return Some(GrowthCompanyReason::HeavyInvestment);
    }
    if revenue_growth > 0.15 {
        if let Some(profit_growth) = growth.operating_profit_growth {
            if profit_growth < revenue_growth * 0.5 {
                return Some(GrowthCompanyReason::EarningsLagRevenue);
            }
        }
    }
    None
}
