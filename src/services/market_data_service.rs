use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::future::join_all;
use tracing::{info, warn};

use crate::external::quote_provider::{QuoteProvider, QuoteProviderError, RawQuote};
use crate::models::{IndexQuote, QuoteFailure, StockSnapshot};
use crate::services::exchange_rate::ExchangeRate;
use crate::services::rate_limiter::RateLimiter;

/// Major indices shown for "sensex"/"nifty"/"market index" questions.
pub const MARKET_INDICES: [(&str, &str); 8] = [
    ("S&P 500", "^GSPC"),
    ("NASDAQ", "^IXIC"),
    ("Dow Jones", "^DJI"),
    ("NIFTY 50", "^NSEI"),
    ("SENSEX", "^BSESN"),
    ("FTSE 100", "^FTSE"),
    ("DAX", "^GDAXI"),
    ("Nikkei 225", "^N225"),
];

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// How prices from a raw quote should be presented.
#[derive(Debug, Clone, Copy)]
pub enum Conversion {
    /// Keep the provider's currency
    Keep,
    /// Treat the quote as USD and multiply by this rate
    UsdToInr(f64),
}

/// Builds a display snapshot from a raw quote, applying currency
/// conversion and 2 dp rounding. The change percentage is computed on the
/// unconverted values.
pub fn snapshot_from_quote(
    symbol: &str,
    quote: &RawQuote,
    exchange: Option<&str>,
    conversion: Conversion,
    source: &str,
) -> StockSnapshot {
    let change = quote.price - quote.previous_close;
    let change_percent = if quote.previous_close != 0.0 {
        change / quote.previous_close * 100.0
    } else {
        0.0
    };

    let (factor, currency, original_currency, exchange_rate) = match conversion {
        Conversion::Keep => (1.0, quote.currency.clone(), None, None),
        Conversion::UsdToInr(rate) => (rate, "INR".to_string(), Some("USD".to_string()), Some(rate)),
    };
    let scale = |v: f64| round2(v * factor);

    StockSnapshot {
        symbol: symbol.to_string(),
        company_name: quote.company_name.clone(),
        exchange: exchange.map(str::to_string).or_else(|| quote.exchange.clone()),
        current_price: scale(quote.price),
        previous_close: scale(quote.previous_close),
        change: scale(change),
        change_percent: round2(change_percent),
        open: quote.open.map(scale),
        high: quote.high.map(scale),
        low: quote.low.map(scale),
        volume: quote.volume,
        market_cap: quote.market_cap,
        currency,
        original_currency,
        exchange_rate,
        latest_trading_day: quote.latest_trading_day.clone(),
        source: source.to_string(),
        last_updated: Local::now().naive_local(),
    }
}

/// Quote lookups for Indian listings, global stocks, indices and crypto on
/// top of a single keyless market-data provider.
pub struct MarketDataService {
    provider: Arc<dyn QuoteProvider>,
    exchange_rate: ExchangeRate,
    limiter: RateLimiter,
}

impl MarketDataService {
    pub fn new(provider: Arc<dyn QuoteProvider>, exchange_rate: ExchangeRate) -> Self {
        Self {
            provider,
            exchange_rate,
            limiter: RateLimiter::new(4, Duration::from_millis(100)),
        }
    }

    pub fn exchange_rate(&self) -> &ExchangeRate {
        &self.exchange_rate
    }

    /// Indian stock price from BSE/NSE.
    ///
    /// Accepts `RELIANCE`, `RELIANCE.BO`, `RELIANCE.NS` or a BSE code such as
    /// `500325.BO`; tries the BSE listing, then NSE, then the bare symbol.
    pub async fn get_indian_stock_price(&self, symbol: &str) -> Result<StockSnapshot, QuoteFailure> {
        info!("Fetching Indian stock price for {}...", symbol);
        let clean_symbol = symbol.to_uppercase().replace(".BO", "").replace(".NS", "");

        let candidates = [
            (format!("{}.BO", clean_symbol), "BSE"),
            (format!("{}.NS", clean_symbol), "NSE"),
            (clean_symbol.clone(), "Unknown"),
        ];

        let mut last_error = None;
        for (candidate, exchange) in &candidates {
            match self.provider.fetch_quote(candidate).await {
                Ok(quote) if quote.price > 0.0 => {
                    info!("Successfully fetched {} data from {}", clean_symbol, exchange);
                    return Ok(snapshot_from_quote(
                        &clean_symbol,
                        &quote,
                        Some(exchange),
                        Conversion::Keep,
                        self.provider.name(),
                    ));
                }
                Ok(_) => warn!("{} returned no price for {}", self.provider.name(), candidate),
                Err(e) => {
                    warn!("Failed to fetch {}: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }

        Err(QuoteFailure::new(format!(
            "Could not fetch {} data. Please check the symbol or try later.",
            clean_symbol
        ))
        .with_suggestions(&[
            "Verify the stock symbol (e.g., RELIANCE, TCS, INFY)",
            "Try adding .BO for BSE or .NS for NSE",
            "Check if the stock is actively traded",
        ])
        .with_cause(last_error))
    }

    /// Global stock price; USD quotes are converted to INR.
    pub async fn get_global_stock_price(&self, symbol: &str) -> Result<StockSnapshot, QuoteFailure> {
        info!("Fetching global stock price for {}...", symbol);
        let quote = self.fetch(symbol).await?;

        let conversion = if quote.currency.eq_ignore_ascii_case("USD") {
            Conversion::UsdToInr(self.exchange_rate.usd_to_inr())
        } else {
            Conversion::Keep
        };

        Ok(snapshot_from_quote(symbol, &quote, None, conversion, self.provider.name()))
    }

    /// Major index levels. USD-quoted indices are converted to INR like any
    /// global quote. Indices that fail to load are skipped; the rest keep
    /// the `MARKET_INDICES` order.
    pub async fn get_market_indices(&self) -> Vec<IndexQuote> {
        let lookups = MARKET_INDICES.iter().map(|(name, symbol)| async move {
            let _guard = self.limiter.acquire().await;
            match self.get_global_stock_price(symbol).await {
                Ok(snapshot) => Some(IndexQuote {
                    name: name.to_string(),
                    snapshot,
                }),
                Err(failure) => {
                    warn!("Failed to fetch {}: {}", name, failure.message);
                    None
                }
            }
        });

        let indices: Vec<IndexQuote> = join_all(lookups).await.into_iter().flatten().collect();
        info!("Fetched {} market indices", indices.len());
        indices
    }

    /// Crypto price against USD (`BTC` → `BTC-USD`), converted to INR.
    pub async fn get_crypto_price(&self, symbol: &str) -> Result<StockSnapshot, QuoteFailure> {
        let pair = if symbol.ends_with("-USD") {
            symbol.to_string()
        } else {
            format!("{}-USD", symbol)
        };
        self.get_global_stock_price(&pair).await
    }

    async fn fetch(&self, symbol: &str) -> Result<RawQuote, QuoteFailure> {
        self.provider.fetch_quote(symbol).await.map_err(|e| {
            let message = match &e {
                QuoteProviderError::NotFound => format!("Could not find data for {}", symbol),
                other => format!("Failed to fetch stock price for {}: {}", symbol, other),
            };
            QuoteFailure::new(message).with_cause(Some(e))
        })
    }
}
