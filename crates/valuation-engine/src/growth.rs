use statrs::statistics::{Data, Median, Statistics};
use valuation_core::{FinancialHistory, FinancialPeriod, GrowthEstimate, GrowthSource};

use crate::config::{EngineConfig, GrowthAggregation};

// Observations outside these bands are treated as one-off noise
const FCF_OUTLIER_BAND: (f64, f64) = (-0.5, 1.0);
const REVENUE_OUTLIER_BAND: (f64, f64) = (-0.3, 0.5);

// Blend weights when free cash flow is positive
const REVENUE_WEIGHT: f64 = 0.4;
const OPERATING_PROFIT_WEIGHT: f64 = 0.3;
const FCF_WEIGHT: f64 = 0.3;

/// Derives the stage-1 growth rate from recent history
#[derive(Debug, Clone)]
pub struct GrowthEstimator {
    window: usize,
    min_growth: f64,
    max_growth: f64,
    default_growth: f64,
    aggregation: GrowthAggregation,
}

impl GrowthEstimator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window: config.growth_window,
            min_growth: config.min_growth,
            max_growth: config.max_growth,
            default_growth: config.default_growth,
            aggregation: config.growth_aggregation,
        }
    }

    pub fn estimate(&self, history: &FinancialHistory) -> GrowthEstimate {
        let periods = history.recent(self.window);

        let fcf = self.aggregate(observations(periods, |p| p.free_cash_flow, Some(FCF_OUTLIER_BAND)));
        let revenue = self.aggregate(observations(periods, |p| p.operating_revenue, Some(REVENUE_OUTLIER_BAND)));
        let operating_profit = self.aggregate(observations(periods, |p| p.operating_profit, None));

        let (raw, source) = if history.latest().free_cash_flow > 0.0 {
            let parts = [
                (revenue, REVENUE_WEIGHT),
                (operating_profit, OPERATING_PROFIT_WEIGHT),
                (fcf, FCF_WEIGHT),
            ];
            let weight: f64 = parts.iter().filter(|(g, _)| g.is_some()).map(|(_, w)| w).sum();
            if weight > 0.0 {
                let blended = parts
                    .iter()
                    .filter_map(|(g, w)| g.map(|g| g * w))
                    .sum::<f64>()
                    / weight;
                (blended, GrowthSource::Blended)
            } else {
                (self.default_growth, GrowthSource::Default)
            }
        } else {
            match revenue {
                Some(g) => {
                    tracing::debug!("Latest FCF non-positive, using revenue growth {:.4} as proxy", g);
                    (g, GrowthSource::RevenueProxy)
                }
                None => (self.default_growth, GrowthSource::Default),
            }
        };

        let high_growth_rate = raw.clamp(self.min_growth, self.max_growth);
        if high_growth_rate != raw {
            tracing::debug!(
                "Growth {:.4} clamped to [{:.2}, {:.2}]",
                raw,
                self.min_growth,
                self.max_growth
            );
        }

        GrowthEstimate {
            high_growth_rate,
            free_cash_flow_growth: fcf,
            revenue_growth: revenue,
            operating_profit_growth: operating_profit,
            source,
            periods_used: periods.len(),
            unclamped_rate: raw,
        }
    }

    fn aggregate(&self, values: Vec<f64>) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self.aggregation {
            GrowthAggregation::Mean => values.mean(),
            GrowthAggregation::Median => Data::new(values).median(),
        })
    }
}

/// Period-over-period growth, newest pair first. Pairs whose older value is
/// not positive carry no meaningful rate and are skipped.
fn observations(
    periods: &[FinancialPeriod],
    field: impl Fn(&FinancialPeriod) -> f64,
    band: Option<(f64, f64)>,
) -> Vec<f64> {
    periods
        .windows(2)
        .filter_map(|pair| {
            let (newer, older) = (field(&pair[0]), field(&pair[1]));
            if older <= 0.0 {
                return None;
            }
            let g = (newer - older) / older;
            match band {
                Some((lo, hi)) if g <= lo || g >= hi => None,
                _ => Some(g),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use valuation_core::{Currency, UnitTag};

    fn period(year: i32, revenue: f64, op: f64, fcf: f64) -> FinancialPeriod {
        FinancialPeriod {
            period_end_date: NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
            net_income: op * 0.8,
            operating_revenue: revenue,
            operating_profit: op,
            depreciation_and_amortization: 0.0,
            capital_expenditure: 0.0,
            free_cash_flow: fcf,
            working_capital: 0.0,
        }
    }

    fn history(periods: Vec<FinancialPeriod>) -> FinancialHistory {
        FinancialHistory::new(UnitTag::canonical(Currency::Cny), periods).unwrap()
    }

    fn estimator() -> GrowthEstimator {
        GrowthEstimator::new(&EngineConfig::default())
    }

    #[test]
    fn test_blended_growth() {
        // revenue +10%, operating profit +20%, fcf +5%
        let h = history(vec![
            period(2023, 110.0, 12.0, 10.5),
            period(2022, 100.0, 10.0, 10.0),
        ]);

        let est = estimator().estimate(&h);

        assert_eq!(est.source, GrowthSource::Blended);
        assert_relative_eq!(est.revenue_growth.unwrap(), 0.10, epsilon = 1e-12);
        assert_relative_eq!(est.operating_profit_growth.unwrap(), 0.20, epsilon = 1e-12);
        assert_relative_eq!(est.free_cash_flow_growth.unwrap(), 0.05, epsilon = 1e-12);
        // 0.4 * 0.10 + 0.3 * 0.20 + 0.3 * 0.05
        assert_relative_eq!(est.high_growth_rate, 0.115, epsilon = 1e-12);
        assert!(!est.was_clamped());
    }

    #[test]
    fn test_mean_over_window() {
        let h = history(vec![
            period(2023, 121.0, 10.0, 10.0),
            period(2022, 110.0, 10.0, 10.0),
            period(2021, 100.0, 10.0, 10.0),
        ]);

        let est = estimator().estimate(&h);
        assert_relative_eq!(est.revenue_growth.unwrap(), 0.10, epsilon = 1e-12);
        assert_eq!(est.periods_used, 3);
    }

    #[test]
    fn test_revenue_proxy_when_latest_fcf_non_positive() {
        let h = history(vec![
            period(2023, 120.0, 12.0, -500.0),
            period(2022, 100.0, 10.0, 50.0),
        ]);

        let est = estimator().estimate(&h);

        assert_eq!(est.source, GrowthSource::RevenueProxy);
        assert_relative_eq!(est.high_growth_rate, 0.20, epsilon = 1e-12);
    }

    #[test]
    fn test_growth_clamped_to_band() {
        // operating profit tripled; revenue growth within the outlier band
        let h = history(vec![
            period(2023, 145.0, 300.0, 190.0),
            period(2022, 100.0, 100.0, 100.0),
        ]);

        let est = estimator().estimate(&h);

        assert!(est.unclamped_rate > 0.40);
        assert_relative_eq!(est.high_growth_rate, 0.40);
        assert!(est.was_clamped());
    }

    #[test]
    fn test_negative_growth_clamped_to_floor() {
        let h = history(vec![
            period(2023, 60.0, 10.0, -1.0),
            period(2022, 100.0, 10.0, 10.0),
        ]);
        // revenue fell 40%: discarded as outlier, so the default is used
        let est = estimator().estimate(&h);
        assert_eq!(est.source, GrowthSource::Default);

        let config = EngineConfig {
            min_growth: -0.05,
            ..EngineConfig::default()
        };
        let h = history(vec![
            period(2023, 80.0, 10.0, -1.0),
            period(2022, 100.0, 10.0, 10.0),
        ]);
        let est = GrowthEstimator::new(&config).estimate(&h);
        assert_eq!(est.source, GrowthSource::RevenueProxy);
        assert_relative_eq!(est.high_growth_rate, -0.05);
    }

    #[test]
    fn test_single_period_uses_default() {
        let h = history(vec![period(2023, 100.0, 10.0, 10.0)]);
        let est = estimator().estimate(&h);

        assert_eq!(est.source, GrowthSource::Default);
        assert_relative_eq!(est.high_growth_rate, 0.05);
        assert!(est.revenue_growth.is_none());
    }

    #[test]
    fn test_window_limits_periods() {
        let periods: Vec<_> = (0..12)
            .map(|i| period(2023 - i, 100.0 + i as f64, 10.0, 10.0))
            .collect();
        let est = estimator().estimate(&history(periods));
        assert_eq!(est.periods_used, 8);
    }

    #[test]
    fn test_median_aggregation() {
        let config = EngineConfig {
            growth_aggregation: GrowthAggregation::Median,
            ..EngineConfig::default()
        };
        // revenue growth observations: +40%, +5%, +10%
        let h = history(vec![
            period(2023, 161.7, 10.0, 10.0),
            period(2022, 115.5, 10.0, 10.0),
            period(2021, 110.0, 10.0, 10.0),
            period(2020, 100.0, 10.0, 10.0),
        ]);

        let est = GrowthEstimator::new(&config).estimate(&h);
        assert_relative_eq!(est.revenue_growth.unwrap(), 0.10, epsilon = 1e-9);
    }

    #[test]
    fn test_observations_skip_non_positive_base() {
        let periods = vec![
            period(2023, 100.0, 10.0, 10.0),
            period(2022, 100.0, 10.0, -5.0),
            period(2021, 100.0, 10.0, 5.0),
        ];
        let obs = observations(&periods, |p| p.free_cash_flow, None);
        // 2023 vs 2022 skipped (negative base); 2022 vs 2021 = -200%
        assert_eq!(obs.len(), 1);
        assert_relative_eq!(obs[0], -2.0);
    }
}
