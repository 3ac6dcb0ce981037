use async_trait::async_trait;
use thiserror::Error;

/// Point-in-time quote as reported by an upstream market-data provider.
///
/// Prices are in `currency`; callers decide whether to convert.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawQuote {
    pub symbol: String,
    pub company_name: Option<String>,
    pub exchange: Option<String>,
    pub price: f64,
    pub previous_close: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub currency: String,
    pub latest_trading_day: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuoteProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("symbol not found")]
    NotFound,
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_quote(&self, symbol: &str) -> Result<RawQuote, QuoteProviderError>;

    /// USD to INR rate. Providers without a dedicated FX endpoint quote the
    /// `USDINR=X` pair.
    async fn fetch_usd_inr_rate(&self) -> Result<f64, QuoteProviderError> {
        let quote = self.fetch_quote("USDINR=X").await?;
        if quote.price > 0.0 {
            Ok(quote.price)
        } else {
            Err(QuoteProviderError::BadResponse("non-positive exchange rate".into()))
        }
    }
}
