use valuation_core::{
    BetaSource, CapitalStructureSource, DiscountRate, FinancialHistory, FinancialPeriod,
    IndustryProfile, MarketSnapshot, ValuationError,
};

use crate::config::EngineConfig;

/// CAPM cost of equity blended with after-tax cost of debt
#[derive(Debug, Clone)]
pub struct DiscountRateCalculator {
    risk_free_rate: f64,
    market_risk_premium: f64,
    default_cost_of_debt: f64,
    default_tax_rate: f64,
    tax_band: (f64, f64),
    wacc_band: (f64, f64),
}

impl DiscountRateCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            risk_free_rate: config.risk_free_rate,
            market_risk_premium: config.market_risk_premium,
            default_cost_of_debt: config.default_cost_of_debt,
            default_tax_rate: config.default_tax_rate,
            tax_band: (config.min_tax_rate, config.max_tax_rate),
            wacc_band: (config.min_wacc, config.max_wacc),
        }
    }

    pub fn cost_of_equity(&self, beta: f64) -> f64 {
        self.risk_free_rate + beta * self.market_risk_premium
    }

    /// Effective tax rate implied by the latest period, or the default when
    /// the period has no usable profit figures.
    pub fn estimate_tax_rate(&self, period: &FinancialPeriod) -> f64 {
        if period.operating_profit > 0.0 && period.net_income > 0.0 {
            (1.0 - period.net_income / period.operating_profit).clamp(self.tax_band.0, self.tax_band.1)
        } else {
            self.default_tax_rate
        }
    }

    pub fn compute(
        &self,
        history: &FinancialHistory,
        market: &MarketSnapshot,
        profile: &IndustryProfile,
    ) -> Result<DiscountRate, ValuationError> {
        let (beta, beta_source) = match market.beta.filter(|b| b.is_finite() && *b > 0.0) {
            Some(b) => (b, BetaSource::Company),
            None => (profile.beta, BetaSource::Industry),
        };
        let cost_of_equity = self.cost_of_equity(beta);

        let pre_tax_cost_of_debt = market
            .cost_of_debt
            .filter(|r| r.is_finite() && *r >= 0.0)
            .unwrap_or(self.default_cost_of_debt);
        let tax_rate = market
            .tax_rate
            .filter(|t| (0.0..1.0).contains(t))
            .unwrap_or_else(|| self.estimate_tax_rate(history.latest()));
        let after_tax_cost_of_debt = pre_tax_cost_of_debt * (1.0 - tax_rate);

        let (equity_weight, debt_weight, capital_structure) =
            match (market.market_capitalization, market.total_debt) {
                (Some(equity), Some(debt)) if equity.amount > 0.0 && debt.amount >= 0.0 => {
                    let total = equity.checked_add(debt)?;
                    (
                        equity.amount / total.amount,
                        debt.amount / total.amount,
                        CapitalStructureSource::Reported,
                    )
                }
                _ => {
                    tracing::warn!("No usable debt data; weighting capital structure as 100% equity");
                    (1.0, 0.0, CapitalStructureSource::AssumedAllEquity)
                }
            };

        let raw = equity_weight * cost_of_equity + debt_weight * after_tax_cost_of_debt;
        let wacc = raw.clamp(self.wacc_band.0, self.wacc_band.1);

        tracing::debug!(
            "WACC {:.4} (raw {:.4}): Re={:.4} beta={:.2} Rd={:.4} tax={:.2} E/V={:.2}",
            wacc,
            raw,
            cost_of_equity,
            beta,
            after_tax_cost_of_debt,
            tax_rate,
            equity_weight
        );

        Ok(DiscountRate {
            risk_free_rate: self.risk_free_rate,
            market_risk_premium: self.market_risk_premium,
            beta,
            beta_source,
            cost_of_equity,
            pre_tax_cost_of_debt,
            tax_rate,
            after_tax_cost_of_debt,
            equity_weight,
            debt_weight,
            capital_structure,
            wacc,
        })
    }
}
