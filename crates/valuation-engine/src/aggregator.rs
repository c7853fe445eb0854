use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use valuation_core::{
    CapitalStructureSource, FinancialHistory, GrowthCompanyReason, Industry, MarketSnapshot, Money,
    ModelKind, ModelValuation, ProjectionMode, Signal, ValuationError, ValuationNote,
    ValuationResult, ValuationStatus,
};

use crate::config::EngineConfig;
use crate::dcf::DcfModel;
use crate::growth::GrowthEstimator;
use crate::industry::IndustryTable;
use crate::model::{IntrinsicValueModel, ModelInputs, ModelOutcome};
use crate::owner_earnings::OwnerEarningsModel;
use crate::revenue::{growth_company_reason, RevenueModel};
use crate::wacc::DiscountRateCalculator;

/// One company to value: already-normalized history plus market data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationRequest {
    pub symbol: String,
    pub history: FinancialHistory,
    pub market: MarketSnapshot,
    pub industry: Industry,
}

/// Steps a single valuation moves through. `Result` and `Indeterminate`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuationPhase {
    CollectingInputs,
    ComputingWaccGrowth,
    ComputingDcf,
    ComputingOwnerEarnings,
    ComputingRevenue,
    ComparingToMarketCap,
    EmittingResult,
    Result,
    Indeterminate,
}

struct PhaseTracker<'a> {
    symbol: &'a str,
    phase: ValuationPhase,
}

impl<'a> PhaseTracker<'a> {
    fn new(symbol: &'a str) -> Self {
        Self {
            symbol,
            phase: ValuationPhase::CollectingInputs,
        }
    }

    fn advance(&mut self, next: ValuationPhase) {
        tracing::debug!("{}: {:?} -> {:?}", self.symbol, self.phase, next);
        self.phase = next;
    }

    fn run(&mut self, phase: ValuationPhase, model: &dyn IntrinsicValueModel, inputs: &ModelInputs<'_>) -> ModelOutcome {
        self.advance(phase);
        let outcome = model.value(inputs);
        tracing::debug!(
            "{}: {} {:?}, value {:.2}",
            self.symbol,
            model.kind().to_label(),
            outcome.valuation.status,
            outcome.valuation.value
        );
        outcome
    }
}

/// Values companies with a three-stage DCF and an owner-earnings model and
/// compares both to market capitalization. A revenue-based model covers
/// companies neither cash-flow model applies to.
pub struct ValuationEngine {
    config: EngineConfig,
    industries: Arc<IndustryTable>,
    dcf: DcfModel,
    owner_earnings: OwnerEarningsModel,
    revenue: RevenueModel,
}

impl ValuationEngine {
    pub fn new() -> Self {
        let config = EngineConfig::default();
        Self {
            dcf: DcfModel::new(&config),
            owner_earnings: OwnerEarningsModel::new(&config),
            revenue: RevenueModel::new(&config),
            industries: IndustryTable::global(),
            config,
        }
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, ValuationError> {
        config
            .validate()
            .map_err(|e| ValuationError::Config(e.to_string()))?;
        Ok(Self {
            dcf: DcfModel::new(&config),
            owner_earnings: OwnerEarningsModel::new(&config),
            revenue: RevenueModel::new(&config),
            industries: IndustryTable::global(),
            config,
        })
    }

    pub fn with_industry_table(mut self, industries: Arc<IndustryTable>) -> Self {
        self.industries = industries;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn industries(&self) -> &IndustryTable {
        &self.industries
    }

    pub fn value(&self, request: &ValuationRequest) -> Result<ValuationResult, ValuationError> {
        let mut tracker = PhaseTracker::new(&request.symbol);
        let history = &request.history;

        // Collecting inputs; a FinancialHistory is never empty
        validate_units(history, &request.market)?;

        let profile = self.industries.profile(request.industry);
        let periods = history.len();
        let mode = if periods < 2 {
            ProjectionMode::SingleStageFallback
        } else {
            ProjectionMode::ThreeStage
        };

        let mut notes = Vec::new();
        if mode == ProjectionMode::SingleStageFallback {
            tracing::warn!(
                "{}: only {} period(s); using single-stage growth model",
                request.symbol,
                periods
            );
            notes.push(ValuationNote::SingleStageFallback { periods });
        }

        tracker.advance(ValuationPhase::ComputingWaccGrowth);
        let growth = GrowthEstimator::new(&self.config).estimate(history);
        if growth.was_clamped() {
            notes.push(ValuationNote::GrowthClamped {
                raw: growth.unclamped_rate,
                clamped: growth.high_growth_rate,
            });
        }
        let discount_rate = DiscountRateCalculator::new(&self.config).compute(history, &request.market, profile)?;
        if discount_rate.capital_structure == CapitalStructureSource::AssumedAllEquity {
            notes.push(ValuationNote::AssumedAllEquity);
        }

        let inputs = ModelInputs {
            history,
            growth: &growth,
            profile,
            discount_rate: &discount_rate,
            mode,
        };

        let dcf_outcome = tracker.run(ValuationPhase::ComputingDcf, &self.dcf, &inputs);
        let oe_outcome = tracker.run(ValuationPhase::ComputingOwnerEarnings, &self.owner_earnings, &inputs);
        let revenue_outcome = tracker.run(ValuationPhase::ComputingRevenue, &self.revenue, &inputs);
        let growth_company = growth_company_reason(history, &growth, request.industry);

        let rate_guarded = dcf_outcome.rate_guarded || oe_outcome.rate_guarded;
        notes.extend(dcf_outcome.notes);
        notes.extend(oe_outcome.notes);
        notes.extend(revenue_outcome.notes);
        let mut dcf = dcf_outcome.valuation;
        let mut owner_earnings = oe_outcome.valuation;
        let mut revenue = revenue_outcome.valuation;

        tracker.advance(ValuationPhase::ComparingToMarketCap);
        let market_cap = request
            .market
            .market_capitalization
            .filter(Money::is_positive);

        let (status, signal, confidence, combined_gap) = match market_cap {
            None => {
                tracker.advance(ValuationPhase::Indeterminate);
                tracing::warn!("{}: market capitalization missing or zero", request.symbol);
                notes.push(ValuationNote::MarketCapUnavailable);
                (ValuationStatus::Indeterminate, Signal::Neutral, 0.0, None)
            }
            Some(mcap) => {
                for model in [&mut dcf, &mut owner_earnings, &mut revenue] {
                    let gap = history.money(model.value).relative_to(&mcap)?;
                    model.gap = Some(gap);
                    model.signal = Some(self.classify_gap(gap));
                }

                let growth_blend = match growth_company {
                    Some(reason) if self.config.three_way_growth_blend && history.latest().net_income > 0.0 => {
                        self.growth_blend_gap(&dcf, &owner_earnings, &revenue, reason, &mut notes)
                    }
                    _ => None,
                };
                let combined = growth_blend.or_else(|| {
                    self.combined_gap(&dcf, &owner_earnings, &revenue, request.industry, &mcap, &mut notes)
                });
                let (signal, confidence) = match combined {
                    Some(gap) => {
                        let confidence = self.confidence(gap, periods, rate_guarded, &mut notes);
                        (self.classify_gap(gap), confidence)
                    }
                    None => {
                        tracing::warn!("{}: no valuation model applies", request.symbol);
                        (Signal::Neutral, 0.0)
                    }
                };

                tracker.advance(ValuationPhase::EmittingResult);
                tracker.advance(ValuationPhase::Result);
                (ValuationStatus::Complete, signal, confidence, combined)
            }
        };

        tracing::info!(
            "{}: {} (confidence {:.2}), DCF {:.2}, owner earnings {:.2}, revenue {:.2}, gap {:?}",
            request.symbol,
            signal.to_label(),
            confidence,
            dcf.value,
            owner_earnings.value,
            revenue.value,
            combined_gap
        );

        Ok(ValuationResult {
            symbol: request.symbol.clone(),
            timestamp: Utc::now(),
            status,
            signal,
            confidence,
            dcf_value: dcf.value,
            owner_earnings_value: owner_earnings.value,
            dcf_gap: dcf.gap,
            owner_earnings_gap: owner_earnings.gap,
            revenue_value: revenue.value,
            revenue_gap: revenue.gap,
            combined_gap,
            market_capitalization: market_cap,
            unit: history.unit(),
            mode,
            periods_used: periods,
            dcf,
            owner_earnings,
            revenue,
            growth_company,
            industry_parameters_applied: profile.clone(),
            discount_rate,
            growth,
            notes,
        })
    }

    /// Value independent requests in parallel; output order matches input.
    pub fn value_batch(&self, requests: &[ValuationRequest]) -> Vec<Result<ValuationResult, ValuationError>> {
        requests.par_iter().map(|r| self.value(r)).collect()
    }

    /// Strict thresholds: a gap exactly on a boundary is neutral.
    pub fn classify_gap(&self, gap: f64) -> Signal {
        if gap > self.config.bullish_threshold {
            Signal::Bullish
        } else if gap < self.config.bearish_threshold {
            Signal::Bearish
        } else {
            Signal::Neutral
        }
    }

    /// The gap the final signal is based on. An inapplicable DCF (value 0)
    /// defers to owner earnings; with neither cash-flow model the revenue
    /// model decides.
    pub(crate) fn combined_gap(
        &self,
        dcf: &ModelValuation,
        owner_earnings: &ModelValuation,
        revenue: &ModelValuation,
        industry: Industry,
        market_cap: &Money,
        notes: &mut Vec<ValuationNote>,
    ) -> Option<f64> {
        match (dcf.is_applied(), owner_earnings.is_applied()) {
            (false, false) if revenue.is_applied() => {
                tracing::warn!("No cash-flow model applies; using revenue model");
                notes.push(ValuationNote::RevenueFallback);
                revenue.gap
            }
            (false, false) => None,
            (false, true) => owner_earnings.gap,
            (true, false) => dcf.gap,
            (true, true) => {
                let (hi, lo) = if dcf.value >= owner_earnings.value {
                    (dcf.value, owner_earnings.value)
                } else {
                    (owner_earnings.value, dcf.value)
                };
                let ratio = hi / lo;
                if ratio > self.config.divergence_ratio {
                    tracing::warn!("Model values diverge by {:.1}x", ratio);
                    notes.push(ValuationNote::ModelsDiverge { ratio });
                    if industry.is_stable() {
                        return dcf.gap;
                    }
                    let blended = (dcf.value * owner_earnings.value).sqrt();
                    return Some((blended - market_cap.amount) / market_cap.amount);
                }
                let w = self.config.dcf_weight;
                match (dcf.gap, owner_earnings.gap) {
                    (Some(d), Some(o)) => Some(w * d + (1.0 - w) * o),
                    _ => None,
                }
            }
        }
    }

    /// Profitable growth companies: 0.3 DCF, 0.3 owner earnings and 0.4
    /// revenue, renormalized over the models that apply.
    pub(crate) fn growth_blend_gap(
        &self,
        dcf: &ModelValuation,
        owner_earnings: &ModelValuation,
        revenue: &ModelValuation,
        reason: GrowthCompanyReason,
        notes: &mut Vec<ValuationNote>,
    ) -> Option<f64> {
        let weight = |kind: ModelKind| match kind {
            ModelKind::Dcf | ModelKind::OwnerEarnings => 0.3,
            ModelKind::Revenue => 0.4,
        };
        let (weighted, total) = [dcf, owner_earnings, revenue]
            .into_iter()
            .filter(|m| m.is_applied())
            .filter_map(|m| m.gap.map(|gap| (weight(m.model), gap)))
            .fold((0.0, 0.0), |(sum, total), (w, gap)| (sum + w * gap, total + w));
        if total == 0.0 {
            return None;
        }
        tracing::info!("Growth company ({}); blending all three models", reason.to_label());
        notes.push(ValuationNote::GrowthCompanyBlend { reason });
        Some(weighted / total)
    }

    pub(crate) fn confidence(&self, gap: f64, periods: usize, rate_guarded: bool, notes: &mut Vec<ValuationNote>) -> f64 {
        let mut confidence = (gap.abs() * self.config.confidence_scale).min(self.config.max_confidence);

        if periods < 2 {
            confidence -= self.config.few_periods_penalty;
        }
        if periods < self.config.full_confidence_min_periods {
            confidence = confidence.min(self.config.short_history_confidence_cap);
            notes.push(ValuationNote::ShortHistory { periods });
        }
        if rate_guarded {
            confidence -= self.config.rate_guard_penalty;
        }
        confidence.clamp(0.0, 1.0)
    }
}

impl Default for ValuationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Every monetary market input must be in the history's unit.
pub(crate) fn validate_units(history: &FinancialHistory, market: &MarketSnapshot) -> Result<(), ValuationError> {
    for money in [market.market_capitalization, market.total_debt].into_iter().flatten() {
        history.unit().ensure_matches(&money.unit)?;
    }
    Ok(())
}
