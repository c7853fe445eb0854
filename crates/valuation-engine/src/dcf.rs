use valuation_core::{ModelKind, ModelStatus, ModelValuation, ValuationNote};

use crate::config::EngineConfig;
use crate::model::{IntrinsicValueModel, ModelInputs, ModelOutcome};
use crate::projection::Projector;

/// Free-cash-flow DCF discounted at WACC
#[derive(Debug, Clone)]
pub struct DcfModel {
    projector: Projector,
}

impl DcfModel {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            projector: Projector::new(config),
        }
    }
}

impl IntrinsicValueModel for DcfModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Dcf
    }

    fn value(&self, inputs: &ModelInputs<'_>) -> ModelOutcome {
        let baseline = inputs.history.latest().free_cash_flow;
        let wacc = inputs.discount_rate.wacc;

        // Not an error: the method simply does not apply to cash-burning companies
        if baseline <= 0.0 || !baseline.is_finite() {
            tracing::debug!("Baseline FCF {:.2} is not positive; DCF value is 0", baseline);
            return ModelOutcome {
                valuation: ModelValuation::inapplicable(ModelKind::Dcf, baseline, wacc),
                notes: vec![ValuationNote::DcfInapplicable {
                    baseline_free_cash_flow: baseline,
                }],
                rate_guarded: false,
            };
        }

        let projection = self.projector.project(
            inputs.mode,
            baseline,
            inputs.growth.high_growth_rate,
            inputs.profile.terminal_growth_rate,
            wacc,
        );

        let mut notes = Vec::new();
        if let Some(guard) = projection.rate_guard {
            notes.push(ValuationNote::RateGuardApplied {
                model: ModelKind::Dcf,
                rate: guard.rate,
                substituted: guard.substituted,
            });
        }

        let value = projection.breakdown.total_present_value;
        tracing::debug!(
            "DCF value {:.2} (stage1 {:.2}, stage2 {:.2}, terminal {:.2})",
            value,
            projection.breakdown.stage1_present_value,
            projection.breakdown.stage2_present_value,
            projection.breakdown.terminal_present_value
        );

        ModelOutcome {
            valuation: ModelValuation {
                model: ModelKind::Dcf,
                status: ModelStatus::Applied,
                baseline,
                discount_rate: projection.breakdown.discount_rate,
                gross_value: value,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::industry::IndustryTable;
    use crate::wacc::DiscountRateCalculator;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use valuation_core::{
        Currency, DiscountRate, FinancialHistory, FinancialPeriod, GrowthEstimate, GrowthSource,
        Industry, MarketSnapshot, ProjectionMode, UnitTag,
    };

    fn history(fcf: f64) -> FinancialHistory {
        FinancialHistory::new(
            UnitTag::canonical(Currency::Cny),
            vec![FinancialPeriod {
                period_end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
                net_income: 800.0,
                operating_revenue: 10_000.0,
                operating_profit: 1_000.0,
                depreciation_and_amortization: 200.0,
                capital_expenditure: 300.0,
                free_cash_flow: fcf,
                working_capital: 1_500.0,
            }],
        )
        .unwrap()
    }

    fn growth(rate: f64) -> GrowthEstimate {
        GrowthEstimate {
            high_growth_rate: rate,
            free_cash_flow_growth: None,
            revenue_growth: None,
            operating_profit_growth: None,
            source: GrowthSource::Default,
            periods_used: 1,
            unclamped_rate: rate,
        }
    }

    fn rate(h: &FinancialHistory, wacc: f64) -> DiscountRate {
        let table = IndustryTable::builtin();
        let mut r = DiscountRateCalculator::new(&EngineConfig::default())
            .compute(h, &MarketSnapshot::default(), table.profile(Industry::Unclassified))
            .unwrap();
        r.wacc = wacc;
        r
    }

    #[test]
    fn test_non_positive_fcf_is_exactly_zero() {
        let model = DcfModel::new(&EngineConfig::default());
        let table = IndustryTable::builtin();
        let profile = table.profile(Industry::Technology);

        for fcf in [-500.0, -0.01, 0.0] {
            let h = history(fcf);
            for g in [-0.2, 0.0, 0.15, 0.4] {
                for wacc in [0.03, 0.08, 0.2] {
                    let r = rate(&h, wacc);
                    let gr = growth(g);
                    let out = model.value(&ModelInputs {
                        history: &h,
                        growth: &gr,
                        profile,
                        discount_rate: &r,
                        mode: ProjectionMode::ThreeStage,
                    });
                    assert_eq!(out.valuation.value, 0.0);
                    assert_eq!(out.valuation.status, ModelStatus::Inapplicable);
                    assert!(out.valuation.breakdown.is_none());
                    assert!(!out.rate_guarded);
                }
            }
        }
    }

    #[test]
    fn test_positive_fcf_projects_three_stages() {
        let model = DcfModel::new(&EngineConfig::default());
        let table = IndustryTable::builtin();
        let h = history(1_000.0);
        let r = rate(&h, 0.09);
        let gr = growth(0.12);

        let out = model.value(&ModelInputs {
            history: &h,
            growth: &gr,
            profile: table.profile(Industry::Unclassified),
            discount_rate: &r,
            mode: ProjectionMode::ThreeStage,
        });

        assert!(out.valuation.is_applied());
        let b = out.valuation.breakdown.as_ref().unwrap();
        assert_eq!(b.years.len(), 10);
        assert_relative_eq!(out.valuation.value, b.total_present_value);
        assert_eq!(out.valuation.value, out.valuation.gross_value);
        assert!(out.valuation.value > 1_000.0 * 10.0);
        assert!(out.notes.is_empty());
    }

    #[test]
    fn test_rate_guard_is_reported() {
        let model = DcfModel::new(&EngineConfig::default());
        let table = IndustryTable::builtin();
        let profile = table.profile(Industry::Unclassified);
        let h = history(1_000.0);
        let r = rate(&h, profile.terminal_growth_rate + 0.001);
        let gr = growth(0.05);

        let out = model.value(&ModelInputs {
            history: &h,
            growth: &gr,
            profile,
            discount_rate: &r,
            mode: ProjectionMode::ThreeStage,
        });

        assert!(out.rate_guarded);
        assert!(matches!(
            out.notes.as_slice(),
            [ValuationNote::RateGuardApplied { model: ModelKind::Dcf, .. }]
        ));
    }
}
