use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use valuation_core::DiscountBasis;

/// How period-over-period growth observations are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthAggregation {
    Mean,
    Median,
}

impl FromStr for GrowthAggregation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(GrowthAggregation::Mean),
            "median" => Ok(GrowthAggregation::Median),
            other => bail!("unknown growth aggregation '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // CAPM / capital structure inputs
    pub risk_free_rate: f64,               // 2.8%
    pub market_risk_premium: f64,          // 5.5%
    pub default_cost_of_debt: f64,         // 4.5% pre-tax
    pub default_tax_rate: f64,             // 25%
    pub min_tax_rate: f64,                 // 15%
    pub max_tax_rate: f64,                 // 35%
    pub min_wacc: f64,                     // 5%
    pub max_wacc: f64,                     // 20%

    // Projection horizon
    pub high_growth_years: u32,            // k1 = 5
    pub transition_years: u32,             // k2 = 5

    // Growth estimation
    pub growth_window: usize,              // 8 most recent periods
    pub min_growth: f64,                   // -20%
    pub max_growth: f64,                   // +40%
    pub default_growth: f64,               // 5% when nothing is observable
    pub growth_aggregation: GrowthAggregation,

    // Discount-rate guard
    pub rate_guard_epsilon: f64,           // spread at or below which the guard fires
    pub min_rate_spread: f64,              // 1%, also the floor on rate - terminal growth
    pub rate_guard_penalty: f64,

    // Signal policy
    pub bullish_threshold: f64,            // +10%
    pub bearish_threshold: f64,            // -20%
    pub confidence_scale: f64,
    pub max_confidence: f64,               // 0.95
    pub full_confidence_min_periods: usize, // below this, confidence is capped
    pub short_history_confidence_cap: f64, // 0.5
    pub few_periods_penalty: f64,          // applied below two periods

    // Model combination
    pub dcf_weight: f64,                   // 0.6, owner earnings get the rest
    pub divergence_ratio: f64,             // 3x

    // Owner earnings
    pub owner_earnings_discount_override: Option<DiscountBasis>,
    pub working_capital_smoothing_threshold: f64, // |dWC| above 50% of |NI| is smoothed

    // Revenue model
    pub revenue_discount_rate: f64,        // 12%
    pub revenue_terminal_growth: f64,      // 2.5%
    pub revenue_profit_years: u32,         // explicit years of projected profit
    pub default_revenue_growth: f64,       // 10% when revenue growth is unobservable
    pub three_way_growth_blend: bool,      // blend all three models for profitable growth companies
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.028,
            market_risk_premium: 0.055,
            default_cost_of_debt: 0.045,
            default_tax_rate: 0.25,
            min_tax_rate: 0.15,
            max_tax_rate: 0.35,
            min_wacc: 0.05,
            max_wacc: 0.20,
            high_growth_years: 5,
            transition_years: 5,
            growth_window: 8,
            min_growth: -0.20,
            max_growth: 0.40,
            default_growth: 0.05,
            growth_aggregation: GrowthAggregation::Mean,
            rate_guard_epsilon: 0.005,
            min_rate_spread: 0.01,
            rate_guard_penalty: 0.15,
            bullish_threshold: 0.10,
            bearish_threshold: -0.20,
            confidence_scale: 1.0,
            max_confidence: 0.95,
            full_confidence_min_periods: 3,
            short_history_confidence_cap: 0.5,
            few_periods_penalty: 0.2,
            dcf_weight: 0.6,
            divergence_ratio: 3.0,
            owner_earnings_discount_override: None,
            working_capital_smoothing_threshold: 0.5,
            revenue_discount_rate: 0.12,
            revenue_terminal_growth: 0.025,
            revenue_profit_years: 5,
            default_revenue_growth: 0.10,
            three_way_growth_blend: false,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

impl EngineConfig {
    /// Load from `VALUATION_*` environment variables (and `.env`), falling
    /// back to the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let d = Self::default();

        let owner_earnings_discount_override = match env::var("VALUATION_OWNER_EARNINGS_DISCOUNT") {
            Ok(raw) => match raw.trim().to_lowercase().as_str() {
                "wacc" => Some(DiscountBasis::Wacc),
                "required_return" => Some(DiscountBasis::RequiredReturn),
                "" | "industry" => None,
                other => bail!("Invalid value for VALUATION_OWNER_EARNINGS_DISCOUNT: '{}'", other),
            },
            Err(_) => None,
        };

        let growth_aggregation = match env::var("VALUATION_GROWTH_AGGREGATION") {
            Ok(raw) => raw.parse()?,
            Err(_) => d.growth_aggregation,
        };

        let config = Self {
            risk_free_rate: env_or("VALUATION_RISK_FREE_RATE", d.risk_free_rate)?,
            market_risk_premium: env_or("VALUATION_MARKET_RISK_PREMIUM", d.market_risk_premium)?,
            default_cost_of_debt: env_or("VALUATION_COST_OF_DEBT", d.default_cost_of_debt)?,
            default_tax_rate: env_or("VALUATION_TAX_RATE", d.default_tax_rate)?,
            min_tax_rate: env_or("VALUATION_MIN_TAX_RATE", d.min_tax_rate)?,
            max_tax_rate: env_or("VALUATION_MAX_TAX_RATE", d.max_tax_rate)?,
            min_wacc: env_or("VALUATION_MIN_WACC", d.min_wacc)?,
            max_wacc: env_or("VALUATION_MAX_WACC", d.max_wacc)?,
            high_growth_years: env_or("VALUATION_HIGH_GROWTH_YEARS", d.high_growth_years)?,
            transition_years: env_or("VALUATION_TRANSITION_YEARS", d.transition_years)?,
            growth_window: env_or("VALUATION_GROWTH_WINDOW", d.growth_window)?,
            min_growth: env_or("VALUATION_MIN_GROWTH", d.min_growth)?,
            max_growth: env_or("VALUATION_MAX_GROWTH", d.max_growth)?,
            default_growth: env_or("VALUATION_DEFAULT_GROWTH", d.default_growth)?,
            growth_aggregation,
            rate_guard_epsilon: env_or("VALUATION_RATE_GUARD_EPSILON", d.rate_guard_epsilon)?,
            min_rate_spread: env_or("VALUATION_MIN_RATE_SPREAD", d.min_rate_spread)?,
            rate_guard_penalty: env_or("VALUATION_RATE_GUARD_PENALTY", d.rate_guard_penalty)?,
            bullish_threshold: env_or("VALUATION_BULLISH_THRESHOLD", d.bullish_threshold)?,
            bearish_threshold: env_or("VALUATION_BEARISH_THRESHOLD", d.bearish_threshold)?,
            confidence_scale: env_or("VALUATION_CONFIDENCE_SCALE", d.confidence_scale)?,
            max_confidence: env_or("VALUATION_MAX_CONFIDENCE", d.max_confidence)?,
            full_confidence_min_periods: env_or(
                "VALUATION_FULL_CONFIDENCE_MIN_PERIODS",
                d.full_confidence_min_periods,
            )?,
            short_history_confidence_cap: env_or(
                "VALUATION_SHORT_HISTORY_CONFIDENCE_CAP",
                d.short_history_confidence_cap,
            )?,
            few_periods_penalty: env_or("VALUATION_FEW_PERIODS_PENALTY", d.few_periods_penalty)?,
            dcf_weight: env_or("VALUATION_DCF_WEIGHT", d.dcf_weight)?,
            divergence_ratio: env_or("VALUATION_DIVERGENCE_RATIO", d.divergence_ratio)?,
            owner_earnings_discount_override,
            working_capital_smoothing_threshold: env_or(
                "VALUATION_WC_SMOOTHING_THRESHOLD",
                d.working_capital_smoothing_threshold,
            )?,
            revenue_discount_rate: env_or("VALUATION_REVENUE_DISCOUNT_RATE", d.revenue_discount_rate)?,
            revenue_terminal_growth: env_or("VALUATION_REVENUE_TERMINAL_GROWTH", d.revenue_terminal_growth)?,
            revenue_profit_years: env_or("VALUATION_REVENUE_PROFIT_YEARS", d.revenue_profit_years)?,
            default_revenue_growth: env_or("VALUATION_DEFAULT_REVENUE_GROWTH", d.default_revenue_growth)?,
            three_way_growth_blend: env_or("VALUATION_THREE_WAY_GROWTH_BLEND", d.three_way_growth_blend)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_growth >= self.max_growth {
            bail!("min_growth must be below max_growth");
        }
        if self.min_wacc <= 0.0 || self.min_wacc >= self.max_wacc {
            bail!("WACC band must satisfy 0 < min_wacc < max_wacc");
        }
        if !(0.0..1.0).contains(&self.min_tax_rate) || self.min_tax_rate > self.max_tax_rate || self.max_tax_rate >= 1.0 {
            bail!("tax band must lie within [0, 1) with min <= max");
        }
        if !(0.0..1.0).contains(&self.default_tax_rate) {
            bail!("default_tax_rate must be in [0, 1)");
        }
        if self.high_growth_years == 0 || self.transition_years == 0 {
            bail!("stage lengths must be at least 1 year");
        }
        if self.growth_window < 2 {
            bail!("growth_window must cover at least two periods");
        }
        if self.bullish_threshold <= self.bearish_threshold {
            bail!("bullish_threshold must exceed bearish_threshold");
        }
        if self.min_rate_spread <= 0.0 || self.rate_guard_epsilon < 0.0 {
            bail!("rate guard spread must be positive");
        }
        if !(0.0..=1.0).contains(&self.max_confidence)
            || !(0.0..=1.0).contains(&self.short_history_confidence_cap)
        {
            bail!("confidence caps must be in [0, 1]");
        }
        if self.confidence_scale <= 0.0 {
            bail!("confidence_scale must be positive");
        }
        if !(0.0..=1.0).contains(&self.dcf_weight) {
            bail!("dcf_weight must be in [0, 1]");
        }
        if self.divergence_ratio <= 1.0 {
            bail!("divergence_ratio must exceed 1");
        }
        if self.revenue_discount_rate <= self.revenue_terminal_growth {
            bail!("revenue_discount_rate must exceed revenue_terminal_growth");
        }
        if self.revenue_profit_years == 0 {
            bail!("revenue_profit_years must be at least 1");
        }
        Ok(())
    }
}
