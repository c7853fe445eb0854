use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{IndustryProfile, Money, UnitTag, ValuationError};

/// One reporting period after normalization. Amounts are in the owning
/// `FinancialHistory`'s unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialPeriod {
    pub period_end_date: NaiveDate,
    pub net_income: f64,
    pub operating_revenue: f64,
    pub operating_profit: f64,
    pub depreciation_and_amortization: f64,
    /// Always non-negative (cash spent)
    pub capital_expenditure: f64,
    pub free_cash_flow: f64,
    pub working_capital: f64,
}

/// Non-empty, most-recent-first sequence of periods sharing one unit tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedHistory")]
pub struct FinancialHistory {
    unit: UnitTag,
    periods: Vec<FinancialPeriod>,
}

#[derive(Deserialize)]
struct UncheckedHistory {
    unit: UnitTag,
    periods: Vec<FinancialPeriod>,
}

impl TryFrom<UncheckedHistory> for FinancialHistory {
    type Error = ValuationError;

    fn try_from(raw: UncheckedHistory) -> Result<Self, Self::Error> {
        FinancialHistory::new(raw.unit, raw.periods)
    }
}

impl FinancialHistory {
    pub fn new(unit: UnitTag, mut periods: Vec<FinancialPeriod>) -> Result<Self, ValuationError> {
        if periods.is_empty() {
            return Err(ValuationError::InsufficientData(
                "at least one financial period is required".to_string(),
            ));
        }
        periods.sort_by(|a, b| b.period_end_date.cmp(&a.period_end_date));
        Ok(Self { unit, periods })
    }

    pub fn unit(&self) -> UnitTag {
        self.unit
    }

    pub fn periods(&self) -> &[FinancialPeriod] {
        &self.periods
    }

    pub fn latest(&self) -> &FinancialPeriod {
        &self.periods[0]
    }

    pub fn previous(&self) -> Option<&FinancialPeriod> {
        self.periods.get(1)
    }

    /// The `n` most recent periods (fewer if the history is shorter).
    pub fn recent(&self, n: usize) -> &[FinancialPeriod] {
        &self.periods[..n.min(self.periods.len())]
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Tag a bare amount with this history's unit.
    pub fn money(&self, amount: f64) -> Money {
        Money::new(amount, self.unit)
    }
}

/// Per-period statement figures as a provider delivers them: any field may
/// be missing and the unit is whatever the provider reports in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPeriodRecord {
    #[serde(default)]
    pub period_end_date: Option<NaiveDate>,
    pub unit: UnitTag,
    #[serde(default)]
    pub net_income: Option<f64>,
    #[serde(default)]
    pub operating_revenue: Option<f64>,
    #[serde(default)]
    pub operating_profit: Option<f64>,
    #[serde(default)]
    pub depreciation_and_amortization: Option<f64>,
    #[serde(default)]
    pub capital_expenditure: Option<f64>,
    #[serde(default)]
    pub free_cash_flow: Option<f64>,
    #[serde(default)]
    pub operating_cash_flow: Option<f64>,
    #[serde(default)]
    pub working_capital: Option<f64>,
    #[serde(default)]
    pub current_assets: Option<f64>,
    #[serde(default)]
    pub current_liabilities: Option<f64>,
}

impl RawPeriodRecord {
    pub fn new(period_end_date: NaiveDate, unit: UnitTag) -> Self {
        Self {
            period_end_date: Some(period_end_date),
            unit,
            net_income: None,
            operating_revenue: None,
            operating_profit: None,
            depreciation_and_amortization: None,
            capital_expenditure: None,
            free_cash_flow: None,
            operating_cash_flow: None,
            working_capital: None,
            current_assets: None,
            current_liabilities: None,
        }
    }
}

/// Market-side inputs. Every `Money` field must carry the same unit as the
/// financial history it is valued against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub market_capitalization: Option<Money>,
    #[serde(default)]
    pub total_debt: Option<Money>,
    /// Company-specific beta; overrides the industry beta when present
    #[serde(default)]
    pub beta: Option<f64>,
    /// Pre-tax cost of debt
    #[serde(default)]
    pub cost_of_debt: Option<f64>,
    #[serde(default)]
    pub tax_rate: Option<f64>,
}

impl MarketSnapshot {
    pub fn with_market_cap(market_capitalization: Money) -> Self {
        Self {
            market_capitalization: Some(market_capitalization),
            ..Self::default()
        }
    }

    /// Rescale every monetary field to its currency's canonical unit.
    pub fn to_canonical(self) -> Self {
        Self {
            market_capitalization: self.market_capitalization.map(Money::to_canonical),
            total_debt: self.total_debt.map(Money::to_canonical),
            ..self
        }
    }
}

/// Directional call derived from a valuation gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl Signal {
    pub fn to_score(&self) -> i32 {
        match self {
            Signal::Bullish => 1,
            Signal::Neutral => 0,
            Signal::Bearish => -1,
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            Signal::Bullish => "bullish",
            Signal::Bearish => "bearish",
            Signal::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Dcf,
    OwnerEarnings,
    Revenue,
}

impl ModelKind {
    pub fn to_label(&self) -> &'static str {
        match self {
            ModelKind::Dcf => "DCF",
            ModelKind::OwnerEarnings => "Owner Earnings",
            ModelKind::Revenue => "Revenue",
        }
    }
}

/// `Inapplicable` is a defined outcome (value 0), not missing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Applied,
    Inapplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    ThreeStage,
    SingleStageFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionStage {
    HighGrowth,
    Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearProjection {
    pub year: u32,
    pub stage: ProjectionStage,
    pub growth_rate: f64,
    pub cash_flow: f64,
    pub discount_factor: f64,
    pub present_value: f64,
}

/// Year-by-year present values of one model's projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageBreakdown {
    pub mode: ProjectionMode,
    pub baseline: f64,
    pub discount_rate: f64,
    pub terminal_growth_rate: f64,
    pub years: Vec<YearProjection>,
    pub stage1_present_value: f64,
    pub stage2_present_value: f64,
    /// Undiscounted perpetuity value at the end of the explicit horizon
    pub terminal_value: f64,
    pub terminal_present_value: f64,
    pub total_present_value: f64,
}

impl StageBreakdown {
    pub fn stage_years(&self, stage: ProjectionStage) -> impl Iterator<Item = &YearProjection> {
        self.years.iter().filter(move |y| y.stage == stage)
    }

    pub fn final_year(&self) -> Option<&YearProjection> {
        self.years.last()
    }
}

impl fmt::Display for StageBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "discount rate {:.2}%, terminal growth {:.2}%",
            self.discount_rate * 100.0,
            self.terminal_growth_rate * 100.0
        )?;
        for y in &self.years {
            writeln!(
                f,
                "  year {:>2} [{}] growth {:>6.2}%  cash flow {:>18.2}  pv {:>18.2}",
                y.year,
                match y.stage {
                    ProjectionStage::HighGrowth => "stage 1",
                    ProjectionStage::Transition => "stage 2",
                },
                y.growth_rate * 100.0,
                y.cash_flow,
                y.present_value
            )?;
        }
        writeln!(f, "  stage 1 pv:  {:.2}", self.stage1_present_value)?;
        if self.mode == ProjectionMode::ThreeStage {
            writeln!(f, "  stage 2 pv:  {:.2}", self.stage2_present_value)?;
        }
        writeln!(
            f,
            "  terminal pv: {:.2} (value {:.2})",
            self.terminal_present_value, self.terminal_value
        )?;
        write!(f, "  total:       {:.2}", self.total_present_value)
    }
}

/// Output of one intrinsic value model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelValuation {
    pub model: ModelKind,
    pub status: ModelStatus,
    /// Starting figure: free cash flow, owner earnings or operating revenue
    pub baseline: f64,
    pub discount_rate: f64,
    /// Present value before any margin of safety
    pub gross_value: f64,
    pub value: f64,
    #[serde(default)]
    pub breakdown: Option<StageBreakdown>,
    #[serde(default)]
    pub gap: Option<f64>,
    #[serde(default)]
    pub signal: Option<Signal>,
}

impl ModelValuation {
    pub fn inapplicable(model: ModelKind, baseline: f64, discount_rate: f64) -> Self {
        Self {
            model,
            status: ModelStatus::Inapplicable,
            baseline,
            discount_rate,
            gross_value: 0.0,
            value: 0.0,
            breakdown: None,
            gap: None,
            signal: None,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.status == ModelStatus::Applied
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthSource {
    /// Weighted blend of revenue, operating profit and free cash flow growth
    Blended,
    /// Latest free cash flow was non-positive
    RevenueProxy,
    /// No usable period-over-period observation
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthEstimate {
    pub high_growth_rate: f64,
    pub free_cash_flow_growth: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub operating_profit_growth: Option<f64>,
    pub source: GrowthSource,
    pub periods_used: usize,
    /// Rate before the clamp band was applied
    pub unclamped_rate: f64,
}

impl GrowthEstimate {
    pub fn was_clamped(&self) -> bool {
        self.unclamped_rate != self.high_growth_rate
    }
}

/// Why a company was treated as a growth company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthCompanyReason {
    /// Net income is not positive but revenue grows by more than 5%
    LossMakingWithRevenueGrowth,
    /// Revenue grows by more than 20%
    HighRevenueGrowth,
    /// Growth industry, revenue growth above 15% and net margin below 10%
    GrowthIndustryLowMargin,
    /// Capex above 15% of revenue with revenue growth above 10%
    HeavyInvestment,
    /// Revenue growth above 15% while profit growth lags at under half of it
    EarningsLagRevenue,
}

impl GrowthCompanyReason {
    pub fn to_label(&self) -> &'static str {
        match self {
            GrowthCompanyReason::LossMakingWithRevenueGrowth => "loss-making with growing revenue",
            GrowthCompanyReason::HighRevenueGrowth => "high revenue growth",
            GrowthCompanyReason::GrowthIndustryLowMargin => "growth industry with low margin",
            GrowthCompanyReason::HeavyInvestment => "heavy capital investment",
            GrowthCompanyReason::EarningsLagRevenue => "profit growth lags revenue growth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaSource {
    Company,
    Industry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapitalStructureSource {
    Reported,
    /// No usable debt figure; weighted as 100% equity
    AssumedAllEquity,
}

/// WACC and the inputs that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountRate {
    pub risk_free_rate: f64,
    pub market_risk_premium: f64,
    pub beta: f64,
    pub beta_source: BetaSource,
    pub cost_of_equity: f64,
    pub pre_tax_cost_of_debt: f64,
    pub tax_rate: f64,
    pub after_tax_cost_of_debt: f64,
    pub equity_weight: f64,
    pub debt_weight: f64,
    pub capital_structure: CapitalStructureSource,
    pub wacc: f64,
}

/// Approximations and recoveries made while valuing, kept for auditability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValuationNote {
    AssumedAllEquity,
    GrowthClamped { raw: f64, clamped: f64 },
    RateGuardApplied { model: ModelKind, rate: f64, substituted: f64 },
    SingleStageFallback { periods: usize },
    ShortHistory { periods: usize },
    DcfInapplicable { baseline_free_cash_flow: f64 },
    OwnerEarningsInapplicable { owner_earnings: f64 },
    WorkingCapitalDeltaUnavailable,
    WorkingCapitalSmoothed { raw_delta: f64, smoothed_delta: f64 },
    NormalizedOwnerEarnings { periods: usize, median: f64 },
    ModelsDiverge { ratio: f64 },
    MarketCapUnavailable,
    RevenueInapplicable { operating_revenue: f64 },
    RevenueBasedValuation {
        price_to_sales: f64,
        price_to_sales_value: f64,
        profitability_value: f64,
        years_to_profitability: u32,
    },
    RevenueFallback,
    GrowthCompanyBlend { reason: GrowthCompanyReason },
}

impl fmt::Display for ValuationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuationNote::AssumedAllEquity => {
                write!(f, "no debt data; capital structure assumed 100% equity")
            }
            ValuationNote::GrowthClamped { raw, clamped } => write!(
                f,
                "growth {:.2}% clamped to {:.2}%",
                raw * 100.0,
                clamped * 100.0
            ),
            ValuationNote::RateGuardApplied { model, rate, substituted } => write!(
                f,
                "{} discount rate {:.2}% too close to terminal growth; used {:.2}%",
                model.to_label(),
                rate * 100.0,
                substituted * 100.0
            ),
            ValuationNote::SingleStageFallback { periods } => write!(
                f,
                "only {} period(s) available; single-stage model used",
                periods
            ),
            ValuationNote::ShortHistory { periods } => {
                write!(f, "short history ({} periods); confidence capped", periods)
            }
            ValuationNote::DcfInapplicable { baseline_free_cash_flow } => write!(
                f,
                "free cash flow {:.2} is not positive; DCF does not apply",
                baseline_free_cash_flow
            ),
            ValuationNote::OwnerEarningsInapplicable { owner_earnings } => write!(
                f,
                "owner earnings {:.2} are not positive; owner-earnings model does not apply",
                owner_earnings
            ),
            ValuationNote::WorkingCapitalDeltaUnavailable => {
                write!(f, "single period; working capital change taken as 0")
            }
            ValuationNote::WorkingCapitalSmoothed { raw_delta, smoothed_delta } => write!(
                f,
                "working capital change {:.2} smoothed to {:.2}",
                raw_delta, smoothed_delta
            ),
            ValuationNote::NormalizedOwnerEarnings { periods, median } => write!(
                f,
                "owner earnings normalized to median {:.2} over {} periods",
                median, periods
            ),
            ValuationNote::ModelsDiverge { ratio } => {
                write!(f, "model values differ by {:.1}x", ratio)
            }
            ValuationNote::MarketCapUnavailable => {
                write!(f, "market capitalization missing or zero; valuation indeterminate")
            }
            ValuationNote::RevenueInapplicable { operating_revenue } => write!(
                f,
                "operating revenue {:.2} is not positive; revenue model does not apply",
                operating_revenue
            ),
            ValuationNote::RevenueBasedValuation {
                price_to_sales,
                price_to_sales_value,
                profitability_value,
                years_to_profitability,
            } => write!(
                f,
                "revenue model: P/S {:.2}x gives {:.2}, profitability in {} year(s) gives {:.2}",
                price_to_sales, price_to_sales_value, years_to_profitability, profitability_value
            ),
            ValuationNote::RevenueFallback => {
                write!(f, "no cash-flow model applies; signal based on revenue model")
            }
            ValuationNote::GrowthCompanyBlend { reason } => write!(
                f,
                "growth company ({}); DCF, owner earnings and revenue blended",
                reason.to_label()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationStatus {
    Complete,
    /// Market capitalization missing or zero: neutral with zero confidence
    Indeterminate,
}

/// Final output of one valuation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub status: ValuationStatus,
    pub signal: Signal,
    pub confidence: f64, // 0.0 to 1.0
    pub dcf_value: f64,
    pub owner_earnings_value: f64,
    pub dcf_gap: Option<f64>,
    pub owner_earnings_gap: Option<f64>,
    pub revenue_value: f64,
    pub revenue_gap: Option<f64>,
    pub combined_gap: Option<f64>,
    pub market_capitalization: Option<Money>,
    pub unit: UnitTag,
    pub mode: ProjectionMode,
    pub periods_used: usize,
    pub dcf: ModelValuation,
    pub owner_earnings: ModelValuation,
    pub revenue: ModelValuation,
    pub growth_company: Option<GrowthCompanyReason>,
    pub industry_parameters_applied: IndustryProfile,
    pub discount_rate: DiscountRate,
    pub growth: GrowthEstimate,
    pub notes: Vec<ValuationNote>,
}

impl ValuationResult {
    /// Per-model, per-stage present values as plain text
    pub fn render_breakdown(&self) -> String {
        let mut out = format!(
            "{} [{}] {} (confidence {:.0}%)\n",
            self.symbol,
            self.industry_parameters_applied.industry_id,
            self.signal.to_label(),
            self.confidence * 100.0
        );
        for model in [&self.dcf, &self.owner_earnings, &self.revenue] {
            out.push_str(&format!("{}: {:.2} {}", model.model.to_label(), model.value, self.unit));
            if let Some(gap) = model.gap {
                out.push_str(&format!(" (gap {:+.1}%)", gap * 100.0));
            }
            out.push('\n');
            match &model.breakdown {
                Some(breakdown) => {
                    out.push_str(&breakdown.to_string());
                    out.push('\n');
                }
                None if !model.is_applied() => out.push_str("  not applicable\n"),
                None => {}
            }
        }
        for note in &self.notes {
            out.push_str(&format!("note: {}\n", note));
        }
        out
    }

    /// Flat metrics map in the shape the report layer consumes
    pub fn metrics(&self) -> serde_json::Value {
        serde_json::json!({
            "dcf_value": self.dcf_value,
            "owner_earnings_value": self.owner_earnings_value,
            "dcf_gap": self.dcf_gap,
            "owner_earnings_gap": self.owner_earnings_gap,
            "revenue_value": self.revenue_value,
            "revenue_gap": self.revenue_gap,
            "growth_company": self.growth_company.map(|r| r.to_label()),
            "combined_gap": self.combined_gap,
            "market_cap": self.market_capitalization.map(|m| m.amount),
            "wacc": self.discount_rate.wacc,
            "cost_of_equity": self.discount_rate.cost_of_equity,
            "high_growth_rate": self.growth.high_growth_rate,
            "terminal_growth_rate": self.industry_parameters_applied.terminal_growth_rate,
            "industry": self.industry_parameters_applied.industry_id.label(),
            "mode": self.mode,
            "periods_used": self.periods_used,
        })
    }
}
