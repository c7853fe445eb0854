use valuation_core::{
    DiscountRate, FinancialHistory, GrowthEstimate, IndustryProfile, ModelKind, ModelValuation,
    ProjectionMode, ValuationNote,
};

/// Everything a cash-flow model needs, already derived by the earlier phases
#[derive(Debug, Clone, Copy)]
pub struct ModelInputs<'a> {
    pub history: &'a FinancialHistory,
    pub growth: &'a GrowthEstimate,
    pub profile: &'a IndustryProfile,
    pub discount_rate: &'a DiscountRate,
    pub mode: ProjectionMode,
}

#[derive(Debug, Clone)]
pub struct ModelOutcome {
    pub valuation: ModelValuation,
    pub notes: Vec<ValuationNote>,
    /// The discount rate needed the minimum-spread substitution
    pub rate_guarded: bool,
}

/// Intrinsic value model over a normalized history
pub trait IntrinsicValueModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn value(&self, inputs: &ModelInputs<'_>) -> ModelOutcome;
}
