pub mod aggregator;
pub mod config;
pub mod dcf;
pub mod growth;
pub mod industry;
pub mod model;
pub mod normalizer;
pub mod owner_earnings;
pub mod pipeline;
pub mod projection;
pub mod revenue;
pub mod sensitivity;
pub mod wacc;

pub use aggregator::{ValuationEngine, ValuationPhase, ValuationRequest};
pub use config::{EngineConfig, GrowthAggregation};
pub use dcf::DcfModel;
pub use growth::GrowthEstimator;
pub use industry::IndustryTable;
pub use model::{IntrinsicValueModel, ModelInputs, ModelOutcome};
pub use normalizer::{NormalizationNote, NormalizedHistory, PeriodNormalizer};
pub use owner_earnings::{OwnerEarnings, OwnerEarningsModel};
pub use pipeline::ValuationPipeline;
pub use projection::{Projection, Projector, RateGuard};
pub use revenue::{growth_company_reason, RevenueModel};
pub use sensitivity::{SensitivityGrid, SensitivityPoint};
pub use wacc::DiscountRateCalculator;
