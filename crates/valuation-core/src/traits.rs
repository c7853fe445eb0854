use async_trait::async_trait;
use crate::{MarketSnapshot, RawPeriodRecord, ValuationError};

/// Source of statement data and market quotes for the valuation pipeline.
///
/// Implementations own retries and provider fallback; the engine only sees
/// the records they return.
#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    /// Up to `limit` reporting periods, in any order and any unit.
    async fn financial_periods(&self, symbol: &str, limit: usize) -> Result<Vec<RawPeriodRecord>, ValuationError>;

    async fn market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, ValuationError>;

    /// Free-form industry description, if the provider knows one.
    async fn industry_name(&self, symbol: &str) -> Result<Option<String>, ValuationError>;
}
