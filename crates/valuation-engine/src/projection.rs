use valuation_core::{ProjectionMode, ProjectionStage, StageBreakdown, YearProjection};

use crate::config::EngineConfig;

/// Recorded when the discount rate sat too close to terminal growth and a
/// minimum spread was substituted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateGuard {
    pub rate: f64,
    pub substituted: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub breakdown: StageBreakdown,
    pub rate_guard: Option<RateGuard>,
}

/// Growth-then-perpetuity projection shared by the cash-flow models.
///
/// Three-stage mode: `high_growth_years` at the high rate, then
/// `transition_years` with growth moving linearly to the terminal rate,
/// then a Gordon-growth perpetuity on the last projected flow.
/// Single-stage mode keeps the high rate for the whole horizon.
#[derive(Debug, Clone)]
pub struct Projector {
    high_growth_years: u32,
    transition_years: u32,
    epsilon: f64,
    min_spread: f64,
}

impl Projector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            high_growth_years: config.high_growth_years,
            transition_years: config.transition_years,
            epsilon: config.rate_guard_epsilon,
            min_spread: config.min_rate_spread,
        }
    }

    pub fn horizon(&self) -> u32 {
        self.high_growth_years + self.transition_years
    }

    /// Growth applied in `year` (1-based).
    pub fn growth_for_year(&self, mode: ProjectionMode, year: u32, high: f64, terminal: f64) -> (ProjectionStage, f64) {
        if mode == ProjectionMode::SingleStageFallback || year <= self.high_growth_years {
            return (ProjectionStage::HighGrowth, high);
        }
        let w = (year - self.high_growth_years) as f64 / self.transition_years as f64;
        (ProjectionStage::Transition, high * (1.0 - w) + terminal * w)
    }

    /// Fires when the spread is within `epsilon` or below the minimum spread.
    /// The substituted rate never falls below the input, so value stays
    /// non-increasing in the rate across the guarded band.
    fn guard(&self, rate: f64, terminal: f64) -> (f64, Option<RateGuard>) {
        let floor = terminal + self.min_spread;
        if rate - terminal > self.epsilon && rate >= floor {
            return (rate, None);
        }
        let substituted = rate.max(floor);
        tracing::warn!(
            "Discount rate {:.4} within {:.4} of terminal growth {:.4}; using {:.4}",
            rate,
            self.epsilon,
            terminal,
            substituted
        );
        (substituted, Some(RateGuard { rate, substituted }))
    }

    pub fn project(
        &self,
        mode: ProjectionMode,
        baseline: f64,
        high_growth: f64,
        terminal_growth: f64,
        rate: f64,
    ) -> Projection {
        let (rate, rate_guard) = self.guard(rate, terminal_growth);

        let mut years = Vec::with_capacity(self.horizon() as usize);
        let mut cash_flow = baseline;
        let mut stage1 = 0.0;
        let mut stage2 = 0.0;

        for year in 1..=self.horizon() {
            let (stage, growth_rate) = self.growth_for_year(mode, year, high_growth, terminal_growth);
            cash_flow *= 1.0 + growth_rate;
            let discount_factor = 1.0 / (1.0 + rate).powi(year as i32);
            let present_value = cash_flow * discount_factor;

            match stage {
                ProjectionStage::HighGrowth => stage1 += present_value,
                ProjectionStage::Transition => stage2 += present_value,
            }
            years.push(YearProjection {
                year,
                stage,
                growth_rate,
                cash_flow,
                discount_factor,
                present_value,
            });
        }

        let terminal_value = cash_flow * (1.0 + terminal_growth) / (rate - terminal_growth);
        let terminal_present_value = terminal_value / (1.0 + rate).powi(self.horizon() as i32);

        Projection {
            breakdown: StageBreakdown {
                mode,
                baseline,
                discount_rate: rate,
                terminal_growth_rate: terminal_growth,
                years,
                stage1_present_value: stage1,
                stage2_present_value: stage2,
                terminal_value,
                terminal_present_value,
                total_present_value: stage1 + stage2 + terminal_present_value,
            },
            rate_guard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn projector() -> Projector {
        Projector::new(&EngineConfig::default())
    }

    #[test]
    fn test_stage_continuity() {
        let p = projector().project(ProjectionMode::ThreeStage, 100.0, 0.25, 0.03, 0.10);
        let b = &p.breakdown;

        let stage1: Vec<_> = b.stage_years(ProjectionStage::HighGrowth).collect();
        let stage2: Vec<_> = b.stage_years(ProjectionStage::Transition).collect();
        assert_eq!(stage1.len(), 5);
        assert_eq!(stage2.len(), 5);

        // stage 1 ends at the high rate, which is where the linear decay starts
        assert_eq!(stage1.last().unwrap().growth_rate, 0.25);
        let step = (0.03 - 0.25) / 5.0;
        for (j, y) in stage2.iter().enumerate() {
            assert_relative_eq!(y.growth_rate, 0.25 + step * (j + 1) as f64, epsilon = 1e-12);
        }
        // and stage 2 ends exactly at terminal growth
        assert_eq!(stage2.last().unwrap().growth_rate, 0.03);
    }

    #[test]
    fn test_components_sum_to_total() {
        let b = projector()
            .project(ProjectionMode::ThreeStage, 100.0, 0.15, 0.025, 0.09)
            .breakdown;
        let sum: f64 = b.years.iter().map(|y| y.present_value).sum();

        assert_relative_eq!(sum, b.stage1_present_value + b.stage2_present_value, epsilon = 1e-9);
        assert_relative_eq!(
            b.total_present_value,
            sum + b.terminal_present_value,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_terminal_value_formula() {
        let b = projector()
            .project(ProjectionMode::ThreeStage, 100.0, 0.0, 0.0, 0.10)
            .breakdown;

        // flat flows: terminal = 100 / 0.10, discounted 10 years
        assert_relative_eq!(b.terminal_value, 1000.0, epsilon = 1e-9);
        assert_relative_eq!(b.terminal_present_value, 1000.0 / 1.1f64.powi(10), epsilon = 1e-9);
        // perpetuity of 100 at 10% is worth 1000 in total
        assert_relative_eq!(b.total_present_value, 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_value_strictly_decreases_with_rate() {
        let proj = projector();
        let mut previous = f64::INFINITY;
        for bp in 0..30 {
            let rate = 0.06 + bp as f64 * 0.005;
            let value = proj
                .project(ProjectionMode::ThreeStage, 100.0, 0.12, 0.03, rate)
                .breakdown
                .total_present_value;
            assert!(value < previous, "value {} at rate {} not below {}", value, rate, previous);
            previous = value;
        }
    }

    #[test]
    fn test_rate_guard_substitutes_min_spread() {
        let p = projector().project(ProjectionMode::ThreeStage, 100.0, 0.10, 0.03, 0.032);

        let guard = p.rate_guard.expect("guard should fire");
        assert_eq!(guard.rate, 0.032);
        assert_relative_eq!(guard.substituted, 0.04, epsilon = 1e-12);
        assert_relative_eq!(p.breakdown.discount_rate, 0.04, epsilon = 1e-12);
        assert!(p.breakdown.total_present_value.is_finite());
    }

    #[test]
    fn test_value_never_rises_through_guard_band() {
        let proj = projector();
        let value_at = |rate: f64| {
            proj.project(ProjectionMode::ThreeStage, 100.0, 0.10, 0.03, rate)
                .breakdown
                .total_present_value
        };

        // 0.030..0.050 in 1bp steps crosses epsilon (0.035) and the floor (0.04)
        let mut previous = f64::INFINITY;
        for bp in 0..=200 {
            let rate = 0.03 + bp as f64 * 0.0001;
            let value = value_at(rate);
            assert!(value <= previous, "value {} at rate {} above {}", value, rate, previous);
            previous = value;
        }

        assert!(value_at(0.036) <= value_at(0.034));
        assert_relative_eq!(value_at(0.036), value_at(0.04), epsilon = 1e-9);
        assert!(value_at(0.041) < value_at(0.04));
    }

    #[test]
    fn test_guard_covers_band_between_epsilon_and_min_spread() {
        let p = projector().project(ProjectionMode::ThreeStage, 100.0, 0.10, 0.03, 0.036);
        let guard = p.rate_guard.expect("guard should fire below the minimum spread");
        assert_relative_eq!(guard.substituted, 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_guard_keeps_rate_when_epsilon_exceeds_min_spread() {
        let config = EngineConfig {
            rate_guard_epsilon: 0.02,
            ..EngineConfig::default()
        };
        let p = Projector::new(&config).project(ProjectionMode::ThreeStage, 100.0, 0.10, 0.03, 0.045);
        let guard = p.rate_guard.expect("spread within epsilon");
        assert_eq!(guard.substituted, 0.045);
        assert_eq!(p.breakdown.discount_rate, 0.045);
    }

    #[test]
    fn test_rate_guard_handles_negative_spread() {
        let p = projector().project(ProjectionMode::ThreeStage, 100.0, 0.10, 0.05, 0.04);
        assert!(p.rate_guard.is_some());
        assert!(p.breakdown.terminal_value > 0.0);
    }

    #[test]
    fn test_no_guard_with_normal_spread() {
        let p = projector().project(ProjectionMode::ThreeStage, 100.0, 0.10, 0.03, 0.09);
        assert!(p.rate_guard.is_none());
        assert_eq!(p.breakdown.discount_rate, 0.09);
    }

    #[test]
    fn test_single_stage_has_no_transition() {
        let b = projector()
            .project(ProjectionMode::SingleStageFallback, 100.0, 0.08, 0.03, 0.10)
            .breakdown;

        assert_eq!(b.stage_years(ProjectionStage::Transition).count(), 0);
        assert!(b.years.iter().all(|y| y.growth_rate == 0.08));
        assert_eq!(b.stage2_present_value, 0.0);
        assert_relative_eq!(b.final_year().unwrap().cash_flow, 100.0 * 1.08f64.powi(10), epsilon = 1e-9);
    }
}
