use crate::external::quote_provider::{QuoteProvider, QuoteProviderError, RawQuote};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Yahoo Finance chart API. No API key required; covers US, NSE/BSE,
/// indices (`^NSEI`), FX pairs (`USDINR=X`) and crypto (`BTC-USD`).
pub struct YahooFinanceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooFinanceProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
        }
    }
}

impl Default for YahooFinanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    meta: YahooMeta,
    #[serde(default)]
    indicators: Option<YahooIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    symbol: Option<String>,
    currency: Option<String>,
    exchange_name: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<u64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooBars>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooBars {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

fn last_present<T: Copy>(values: &[Option<T>]) -> Option<T> {
    values.iter().rev().find_map(|v| *v)
}

fn into_raw_quote(requested: &str, result: YahooResult) -> Result<RawQuote, QuoteProviderError> {
    let meta = result.meta;
    let price = meta
        .regular_market_price
        .filter(|p| *p > 0.0)
        .ok_or(QuoteProviderError::NotFound)?;

    let bars = result
        .indicators
        .and_then(|mut i| if i.quote.is_empty() { None } else { Some(i.quote.remove(0)) })
        .unwrap_or_default();

    let closes: Vec<f64> = bars.close.iter().filter_map(|c| *c).collect();
    let previous_close = meta
        .previous_close
        .or_else(|| closes.len().checked_sub(2).map(|i| closes[i]))
        .or(meta.chart_previous_close)
        .unwrap_or(price);

    Ok(RawQuote {
        symbol: meta.symbol.unwrap_or_else(|| requested.to_string()),
        company_name: meta.long_name.or(meta.short_name),
        exchange: meta.exchange_name,
        price,
        previous_close,
        open: last_present(&bars.open),
        high: last_present(&bars.high).or(meta.regular_market_day_high),
        low: last_present(&bars.low).or(meta.regular_market_day_low),
        volume: last_present(&bars.volume).or(meta.regular_market_volume),
        market_cap: None,
        pe_ratio: None,
        fifty_two_week_high: meta.fifty_two_week_high,
        fifty_two_week_low: meta.fifty_two_week_low,
        currency: meta.currency.unwrap_or_else(|| "USD".to_string()),
        latest_trading_day: None,
    })
}

#[async_trait]
impl QuoteProvider for YahooFinanceProvider {
    fn name(&self) -> &'static str {
        "Yahoo Finance"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<RawQuote, QuoteProviderError> {
        let url = format!("{}/{}", self.base_url, symbol);

        let resp = self
            .client
            .get(&url)
            .query(&[("interval", "1d"), ("range", "5d")])
            .send()
            .await
            .map_err(|e| QuoteProviderError::Network(e.to_string()))?;

        match resp.status() {
            s if s == reqwest::StatusCode::NOT_FOUND => return Err(QuoteProviderError::NotFound),
            s if s == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                return Err(QuoteProviderError::RateLimited)
            }
            s if !s.is_success() => {
                return Err(QuoteProviderError::BadResponse(format!("HTTP {}", s)))
            }
            _ => {}
        }

        let body: YahooChartResponse = resp
            .json()
            .await
            .map_err(|e| QuoteProviderError::Parse(e.to_string()))?;

        if let Some(error) = body.chart.error {
            if error.description.contains("No data found") {
                return Err(QuoteProviderError::NotFound);
            }
            return Err(QuoteProviderError::BadResponse(error.description));
        }

        let result = body
            .chart
            .result
            .and_then(|mut r| r.pop())
            .ok_or(QuoteProviderError::NotFound)?;

        into_raw_quote(symbol, result)
    }
}
