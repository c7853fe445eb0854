use serde::{Deserialize, Serialize};
use valuation_core::{ProjectionMode, ValuationError};

use crate::aggregator::{validate_units, ValuationEngine, ValuationRequest};
use crate::growth::GrowthEstimator;
use crate::projection::Projector;
use crate::wacc::DiscountRateCalculator;

const SHIFTS: [f64; 5] = [-0.02, -0.01, 0.0, 0.01, 0.02];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPoint {
    pub wacc_shift: f64,
    pub growth_shift: f64,
    /// Rate the cell was discounted at, after any minimum-spread substitution
    pub discount_rate: f64,
    /// The shifted WACC sat too close to terminal growth
    pub rate_guarded: bool,
    pub high_growth_rate: f64,
    pub value: f64,
}

/// DCF value over a grid of WACC and growth shifts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityGrid {
    pub base_value: f64,
    pub points: Vec<SensitivityPoint>,
}

impl SensitivityGrid {
    pub fn range(&self) -> (f64, f64) {
        self.points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.value), hi.max(p.value))
        })
    }

    pub fn point(&self, wacc_shift: f64, growth_shift: f64) -> Option<&SensitivityPoint> {
        self.points.iter().find(|p| {
            (p.wacc_shift - wacc_shift).abs() < 1e-9 && (p.growth_shift - growth_shift).abs() < 1e-9
        })
    }
}

impl ValuationEngine {
    /// Recompute the DCF with WACC and high growth shifted by up to two
    /// points each way. Shifted growth stays inside the configured band.
    pub fn dcf_sensitivity(&self, request: &ValuationRequest) -> Result<SensitivityGrid, ValuationError> {
        let config = self.config();
        let history = &request.history;
        validate_units(history, &request.market)?;
        let profile = self.industries().profile(request.industry);

        let growth = GrowthEstimator::new(config).estimate(history);
        let rate = DiscountRateCalculator::new(config).compute(history, &request.market, profile)?;
        let projector = Projector::new(config);
        let mode = if history.len() < 2 {
            ProjectionMode::SingleStageFallback
        } else {
            ProjectionMode::ThreeStage
        };

        let baseline = history.latest().free_cash_flow;
        // (value, rate used, guarded)
        let value_at = |wacc: f64, g: f64| {
            if baseline <= 0.0 {
                return (0.0, wacc, false);
            }
            let projection = projector.project(mode, baseline, g, profile.terminal_growth_rate, wacc);
            let guarded = projection.rate_guard.is_some();
            (
                projection.breakdown.total_present_value,
                projection.breakdown.discount_rate,
                guarded,
            )
        };

        let mut points = Vec::with_capacity(SHIFTS.len() * SHIFTS.len());
        for wacc_shift in SHIFTS {
            for growth_shift in SHIFTS {
                let high_growth_rate =
                    (growth.high_growth_rate + growth_shift).clamp(config.min_growth, config.max_growth);
                let (value, discount_rate, rate_guarded) = value_at(rate.wacc + wacc_shift, high_growth_rate);
                if rate_guarded {
                    tracing::debug!(
                        "Sensitivity cell ({:+.2}, {:+.2}) discounted at guarded rate {:.4}",
                        wacc_shift,
                        growth_shift,
                        discount_rate
                    );
                }
                points.push(SensitivityPoint {
                    wacc_shift,
                    growth_shift,
                    discount_rate,
                    rate_guarded,
                    high_growth_rate,
                    value,
                });
            }
        }

        Ok(SensitivityGrid {
            base_value: value_at(rate.wacc, growth.high_growth_rate).0,
            points,
        })
    }
}
