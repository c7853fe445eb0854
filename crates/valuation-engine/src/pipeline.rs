use valuation_core::{FinancialDataProvider, Industry, ValuationError, ValuationResult};

use crate::aggregator::{ValuationEngine, ValuationRequest};
use crate::normalizer::PeriodNormalizer;

/// Fetch, normalize, classify and value one symbol.
///
/// All I/O happens here through the provider; the engine call at the end
/// is synchronous.
pub struct ValuationPipeline<P> {
    provider: P,
    engine: ValuationEngine,
    normalizer: PeriodNormalizer,
}

impl<P: FinancialDataProvider> ValuationPipeline<P> {
    pub fn new(provider: P, engine: ValuationEngine) -> Self {
        Self {
            provider,
            engine,
            normalizer: PeriodNormalizer::new(),
        }
    }

    pub fn engine(&self) -> &ValuationEngine {
        &self.engine
    }

    pub async fn build_request(&self, symbol: &str) -> Result<ValuationRequest, ValuationError> {
        let records = self
            .provider
            .financial_periods(symbol, self.engine.config().growth_window)
            .await?;
        let normalized = self.normalizer.normalize(&records)?;
        for note in &normalized.notes {
            tracing::debug!("{}: {:?}", symbol, note);
        }

        let market = self.provider.market_snapshot(symbol).await?.to_canonical();

        let industry = match self.provider.industry_name(symbol).await? {
            Some(name) => {
                let industry = Industry::classify(&name);
                tracing::debug!("{}: industry '{}' classified as {}", symbol, name, industry);
                industry
            }
            None => Industry::Unclassified,
        };

        Ok(ValuationRequest {
            symbol: symbol.to_string(),
            history: normalized.history,
            market,
            industry,
        })
    }

    pub async fn value_symbol(&self, symbol: &str) -> Result<ValuationResult, ValuationError> {
        let request = self.build_request(symbol).await?;
        self.engine.value(&request)
    }
}
