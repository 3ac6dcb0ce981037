use crate::external::quote_provider::{QuoteProvider, QuoteProviderError, RawQuote};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://www.alphavantage.co/query";

pub struct AlphaVantageProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Returns `None` when `ALPHA_VANTAGE_API_KEY` is missing or empty.
    pub fn from_env() -> Option<Self> {
        std::env::var("ALPHA_VANTAGE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Self::new)
    }

    async fn query<T: for<'de> Deserialize<'de>>(
        &self,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<T, QuoteProviderError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| QuoteProviderError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(QuoteProviderError::RateLimited);
        }

        resp.json::<T>()
            .await
            .map_err(|e| QuoteProviderError::Parse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct AvGlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<AvGlobalQuote>,

    // Throttled calls come back as
    // { "Note": "Thank you for using Alpha Vantage! ... 5 calls per minute ..." }
    #[serde(rename = "Note")]
    note: Option<String>,

    #[serde(rename = "Information")]
    information: Option<String>,

    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

// An unknown symbol yields `"Global Quote": {}`, so every field is optional.
#[derive(Debug, Default, Deserialize)]
struct AvGlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "02. open")]
    open: Option<String>,
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvExchangeRateResponse {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    rate: Option<AvExchangeRate>,
    #[serde(rename = "Note")]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvExchangeRate {
    #[serde(rename = "5. Exchange Rate")]
    exchange_rate: String,
}

fn parse_number(field: &Option<String>) -> Option<f64> {
    field.as_deref().and_then(|v| v.trim().parse::<f64>().ok())
}

fn into_raw_quote(requested: &str, quote: AvGlobalQuote) -> Result<RawQuote, QuoteProviderError> {
    let price = parse_number(&quote.price).ok_or(QuoteProviderError::NotFound)?;
    let previous_close = parse_number(&quote.previous_close).unwrap_or(price);

    Ok(RawQuote {
        symbol: quote.symbol.unwrap_or_else(|| requested.to_string()),
        price,
        previous_close,
        open: parse_number(&quote.open),
        high: parse_number(&quote.high),
        low: parse_number(&quote.low),
        volume: quote.volume.as_deref().and_then(|v| v.trim().parse::<u64>().ok()),
        // GLOBAL_QUOTE does not report a currency; callers decide.
        currency: "USD".to_string(),
        latest_trading_day: quote.latest_trading_day,
        ..RawQuote::default()
    })
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        "Alpha Vantage"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<RawQuote, QuoteProviderError> {
        let body: AvGlobalQuoteResponse = self
            .query(
                &[("function", "GLOBAL_QUOTE"), ("symbol", symbol)],
                Duration::from_secs(15),
            )
            .await?;

        if body.note.is_some() || body.information.is_some() {
            return Err(QuoteProviderError::RateLimited);
        }

        if let Some(msg) = body.error_message {
            return Err(QuoteProviderError::BadResponse(msg));
        }

        let quote = body.global_quote.ok_or(QuoteProviderError::NotFound)?;
        into_raw_quote(symbol, quote)
    }

    async fn fetch_usd_inr_rate(&self) -> Result<f64, QuoteProviderError> {
        let body: AvExchangeRateResponse = self
            .query(
                &[
                    ("function", "CURRENCY_EXCHANGE_RATE"),
                    ("from_currency", "USD"),
                    ("to_currency", "INR"),
                ],
                Duration::from_secs(10),
            )
            .await?;

        if body.note.is_some() {
            return Err(QuoteProviderError::RateLimited);
        }

        let rate = body
            .rate
            .ok_or_else(|| QuoteProviderError::BadResponse("missing exchange rate".into()))?;

        rate.exchange_rate
            .trim()
            .parse::<f64>()
            .map_err(|e| QuoteProviderError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_quote_payload() {
        let payload = r#"{
            "Global Quote": {
                "01. symbol": "IBM",
                "02. open": "170.0000",
                "03. high": "172.5000",
                "04. low": "169.1000",
                "05. price": "171.2500",
                "06. volume": "3456789",
                "07. latest trading day": "2024-05-10",
                "08. previous close": "170.5000",
                "09. change": "0.7500",
                "10. change percent": "0.4399%"
            }
        }"#;
        let body: AvGlobalQuoteResponse = serde_json::from_str(payload).unwrap();
        let quote = into_raw_quote("IBM", body.global_quote.unwrap()).unwrap();

        assert_eq!(quote.symbol, "IBM");
        assert_eq!(quote.price, 171.25);
        assert_eq!(quote.previous_close, 170.5);
        assert_eq!(quote.volume, Some(3_456_789));
        assert_eq!(quote.latest_trading_day.as_deref(), Some("2024-05-10"));
        assert_eq!(quote.currency, "USD");
    }

    #[test]
    fn empty_global_quote_is_not_found() {
        let body: AvGlobalQuoteResponse = serde_json::from_str(r#"{"Global Quote": {}}"#).unwrap();
        let result = into_raw_quote("NOPE", body.global_quote.unwrap());
        assert_eq!(result, Err(QuoteProviderError::NotFound));
    }

    #[test]
    fn throttle_note_is_detected() {
        let body: AvGlobalQuoteResponse =
            serde_json::from_str(r#"{"Note": "Thank you for using Alpha Vantage!"}"#).unwrap();
        assert!(body.note.is_some());
        assert!(body.global_quote.is_none());
    }
}
