use statrs::statistics::{Data, Median};
use valuation_core::{
    DiscountBasis, FinancialHistory, FinancialPeriod, Industry, IndustryProfile, ModelKind,
    ModelStatus, ModelValuation, ValuationNote,
};

use crate::config::EngineConfig;
use crate::model::{IntrinsicValueModel, ModelInputs, ModelOutcome};
use crate::projection::Projector;

// Periods considered when normalizing cyclical earnings
const NORMALIZATION_PERIODS: usize = 5;

/// Components of one period's owner earnings
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerEarnings {
    pub net_income: f64,
    pub depreciation_and_amortization: f64,
    pub maintenance_capex: f64,
    pub working_capital_change: f64,
    /// Raw change before smoothing, if smoothing applied
    pub smoothed_from: Option<f64>,
    pub owner_earnings: f64,
}

/// Net income + D&A - maintenance capex - change in working capital,
/// projected like the DCF and cut by the industry margin of safety.
#[derive(Debug, Clone)]
pub struct OwnerEarningsModel {
    projector: Projector,
    smoothing_threshold: f64,
    discount_override: Option<DiscountBasis>,
}

impl OwnerEarningsModel {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            projector: Projector::new(config),
            smoothing_threshold: config.working_capital_smoothing_threshold,
            discount_override: config.owner_earnings_discount_override,
        }
    }

    pub fn discount_basis(&self, profile: &IndustryProfile) -> DiscountBasis {
        self.discount_override.unwrap_or(profile.owner_earnings_discount)
    }

    pub fn owner_earnings(
        &self,
        current: &FinancialPeriod,
        previous: Option<&FinancialPeriod>,
        profile: &IndustryProfile,
    ) -> OwnerEarnings {
        let maintenance_capex = current.capital_expenditure * profile.maintenance_capex_ratio;

        let raw_change = previous
            .map(|p| current.working_capital - p.working_capital)
            .unwrap_or(0.0);

        // A swing larger than half of net income is usually a one-off
        // (receivable timing, prepayments) rather than a recurring need.
        let mut smoothed_from = None;
        let mut working_capital_change = raw_change;
        if raw_change.abs() > self.smoothing_threshold * current.net_income.abs() {
            let pct = if profile.industry_id == Industry::Utilities { 0.03 } else { 0.02 };
            let cap = (current.operating_revenue * pct).abs();
            if raw_change.abs() > cap {
                working_capital_change = cap.copysign(raw_change);
                smoothed_from = Some(raw_change);
            }
        }

        let owner_earnings = current.net_income + current.depreciation_and_amortization
            - maintenance_capex
            - working_capital_change;

        OwnerEarnings {
            net_income: current.net_income,
            depreciation_and_amortization: current.depreciation_and_amortization,
            maintenance_capex,
            working_capital_change,
            smoothed_from,
            owner_earnings,
        }
    }

    /// Median of positive owner earnings over recent periods, for industries
    /// whose single-year earnings swing with the cycle.
    fn normalized_baseline(&self, history: &FinancialHistory, profile: &IndustryProfile) -> Option<(f64, usize)> {
        let periods = history.periods();
        if !profile.normalize_earnings || periods.len() < 3 {
            return None;
        }

        let positives: Vec<f64> = periods
            .windows(2)
            .take(NORMALIZATION_PERIODS)
            .map(|pair| self.owner_earnings(&pair[0], Some(&pair[1]), profile).owner_earnings)
            .filter(|oe| *oe > 0.0)
            .collect();

        if positives.len() < 2 {
            return None;
        }
        let count = positives.len();
        Some((Data::new(positives).median(), count))
    }
}

impl IntrinsicValueModel for OwnerEarningsModel {
    fn kind(&self) -> ModelKind {
        ModelKind::OwnerEarnings
    }

    fn value(&self, inputs: &ModelInputs<'_>) -> ModelOutcome {
        let profile = inputs.profile;
        let mut notes = Vec::new();

        let latest = self.owner_earnings(inputs.history.latest(), inputs.history.previous(), profile);
        if inputs.history.previous().is_none() {
            notes.push(ValuationNote::WorkingCapitalDeltaUnavailable);
        }
        if let Some(raw) = latest.smoothed_from {
            tracing::debug!(
                "Working capital change {:.2} smoothed to {:.2}",
                raw,
                latest.working_capital_change
            );
            notes.push(ValuationNote::WorkingCapitalSmoothed {
                raw_delta: raw,
                smoothed_delta: latest.working_capital_change,
            });
        }

        let baseline = match self.normalized_baseline(inputs.history, profile) {
            Some((median, periods)) => {
                notes.push(ValuationNote::NormalizedOwnerEarnings { periods, median });
                median
            }
            None => latest.owner_earnings,
        };

        let rate = match self.discount_basis(profile) {
            DiscountBasis::RequiredReturn => profile.required_return,
            DiscountBasis::Wacc => inputs.discount_rate.wacc,
        };

        if baseline <= 0.0 || !baseline.is_finite() {
            tracing::debug!("Owner earnings {:.2} not positive; model does not apply", baseline);
            notes.push(ValuationNote::OwnerEarningsInapplicable {
                owner_earnings: baseline,
            });
            return ModelOutcome {
                valuation: ModelValuation::inapplicable(ModelKind::OwnerEarnings, baseline, rate),
                notes,
                rate_guarded: false,
            };
        }

        let projection = self.projector.project(
            inputs.mode,
            baseline,
            inputs.growth.high_growth_rate,
            profile.terminal_growth_rate,
            rate,
        );
        if let Some(guard) = projection.rate_guard {
            notes.push(ValuationNote::RateGuardApplied {
                model: ModelKind::OwnerEarnings,
                rate: guard.rate,
                substituted: guard.substituted,
            });
        }

        let gross_value = projection.breakdown.total_present_value;
        let value = gross_value * (1.0 - profile.margin_of_safety);
        tracing::debug!(
            "Owner earnings {:.2} -> value {:.2} after {:.0}% margin of safety",
            baseline,
            value,
            profile.margin_of_safety * 100.0
        );

        ModelOutcome {
            valuation: ModelValuation {
                model: ModelKind::OwnerEarnings,
                status: ModelStatus::Applied,
                baseline,
                discount_rate: projection.breakdown.discount_rate,
                gross_value,
                value,
                breakdown: Some(projection.breakdown),
                gap: None,
                signal: None,
            },
            notes,
            rate_guarded: projection.rate_guard.is_some(),
        }
    }
}
