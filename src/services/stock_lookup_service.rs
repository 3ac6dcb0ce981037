use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::external::quote_provider::{QuoteProvider, QuoteProviderError};
use crate::models::{QuoteFailure, StockSnapshot};
use crate::services::failure_cache::{FailureCache, FailureKind};
use crate::services::formatting::{
    format_market_indices, format_stock_markdown, format_stock_response, strip_markdown,
};
use crate::services::market_data_service::{snapshot_from_quote, Conversion, MarketDataService};
use crate::services::query_router::{classify, is_indian_symbol, FinancialIntent};

const INDIAN_ATTEMPT_DELAY: Duration = Duration::from_millis(200);

/// Answers price questions straight from market data.
///
/// Stock quotes walk a fallback chain: Alpha Vantage (when configured),
/// then the keyless provider for Indian or global listings, then an
/// Indian-market retry for symbols that failed globally.
pub struct StockLookupService {
    alpha_vantage: Option<Arc<dyn QuoteProvider>>,
    market_data: Arc<MarketDataService>,
    failures: FailureCache,
}

impl StockLookupService {
    pub fn new(
        alpha_vantage: Option<Arc<dyn QuoteProvider>>,
        market_data: Arc<MarketDataService>,
    ) -> Self {
        Self {
            alpha_vantage,
            market_data,
            failures: FailureCache::new(),
        }
    }

    /// Drops expired failure-cache entries and returns how many went.
    pub fn cleanup(&self) -> usize {
        self.failures.cleanup_expired()
    }

    /// Returns a finished answer for stock, index and crypto questions, or
    /// `None` when the query needs the full pipeline.
    pub async fn handle_financial_query(&self, query: &str) -> Option<String> {
        match classify(query) {
            FinancialIntent::StockPrice(symbol) => Some(self.answer_stock(&symbol).await),
            FinancialIntent::MarketIndices => Some(self.answer_indices().await),
            FinancialIntent::Crypto(symbol) => Some(self.answer_crypto(&symbol).await),
            FinancialIntent::StockPriceUnresolved
            | FinancialIntent::CryptoUnresolved
            | FinancialIntent::None => None,
        }
    }

    async fn answer_stock(&self, symbol: &str) -> String {
        if let Some(failed) = self.failures.is_failed(symbol) {
            debug!("Skipping {} (failed lookup cached: {:?})", symbol, failed.kind);
            return failed.answer;
        }

        let indian = is_indian_symbol(symbol);

        if self.alpha_vantage.is_some() {
            info!("🔍 Searching Alpha Vantage for: {}", symbol);
            let result = if indian {
                self.alpha_vantage_indian_quote(symbol).await
            } else {
                self.alpha_vantage_quote(symbol).await
            };
            match result {
                Ok(snapshot) => return self.success(symbol, &snapshot),
                Err(failure) => warn!("⚠️ Alpha Vantage failed: {}", failure.message),
            }
        }

        info!("🔄 Falling back to market data tools for: {}", symbol);

        if indian {
            return match self.market_data.get_indian_stock_price(symbol).await {
                Ok(snapshot) => self.success(symbol, &snapshot),
                Err(failure) => {
                    let answer = failure_with_suggestions(&failure);
                    self.record_failure(symbol, &failure, &answer);
                    answer
                }
            };
        }

        if let Ok(snapshot) = self.market_data.get_global_stock_price(symbol).await {
            return self.success(symbol, &snapshot);
        }

        match self.market_data.get_indian_stock_price(symbol).await {
            Ok(snapshot) => self.success(symbol, &snapshot),
            Err(failure) => {
                let answer = not_found_message(symbol);
                self.record_failure(symbol, &failure, &answer);
                answer
            }
        }
    }

    async fn answer_indices(&self) -> String {
        let indices = self.market_data.get_market_indices().await;
        if indices.is_empty() {
            return "❌ Failed to fetch market indices".to_string();
        }
        format_market_indices(&indices, Local::now().naive_local())
    }

    async fn answer_crypto(&self, symbol: &str) -> String {
        match self.market_data.get_crypto_price(symbol).await {
            Ok(snapshot) => format_stock_markdown(&snapshot),
            Err(failure) => format!("❌ {}", failure.message),
        }
    }

    /// USD quote from Alpha Vantage, converted to INR.
    async fn alpha_vantage_quote(&self, symbol: &str) -> Result<StockSnapshot, QuoteFailure> {
        let provider = self.alpha_vantage_provider()?;
        let quote = provider.fetch_quote(symbol).await.map_err(|e| {
            let message = match &e {
                QuoteProviderError::NotFound => {
                    format!("No data found for symbol '{}' in Alpha Vantage", symbol)
                }
                other => format!("Alpha Vantage API error: {}", other),
            };
            QuoteFailure::new(message).with_cause(Some(e))
        })?;

        let rate = self.market_data.exchange_rate().usd_to_inr();
        Ok(snapshot_from_quote(
            &quote.symbol,
            &quote,
            None,
            Conversion::UsdToInr(rate),
            "Alpha Vantage",
        ))
    }

    /// Indian listing from Alpha Vantage, already priced in INR. Tries the
    /// bare symbol, then the BSE and NSE suffixes.
    async fn alpha_vantage_indian_quote(&self, symbol: &str) -> Result<StockSnapshot, QuoteFailure> {
        let provider = self.alpha_vantage_provider()?;
        let candidates = [
            symbol.to_string(),
            format!("{}.BSE", symbol),
            format!("{}.NS", symbol),
        ];

        let mut last_error = None;
        for (attempt, candidate) in candidates.iter().enumerate() {
            if attempt > 0 {
                tokio::time::sleep(INDIAN_ATTEMPT_DELAY).await;
            }
            match provider.fetch_quote(candidate).await {
                Ok(mut quote) if quote.price > 0.0 => {
                    quote.currency = "INR".to_string();
                    return Ok(snapshot_from_quote(
                        &quote.symbol,
                        &quote,
                        None,
                        Conversion::Keep,
                        "Alpha Vantage (Indian Market)",
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Alpha Vantage has no {}: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }

        Err(QuoteFailure::new(format!(
            "Indian stock '{}' not found in Alpha Vantage",
            symbol
        ))
        .with_suggestions(&[
            "Try the exact NSE/BSE symbol (e.g., TATAMOTORS)",
            "Check if the company is listed on Indian exchanges",
            "Verify the symbol spelling",
        ])
        .with_cause(last_error))
    }

    fn alpha_vantage_provider(&self) -> Result<&Arc<dyn QuoteProvider>, QuoteFailure> {
        self.alpha_vantage
            .as_ref()
            .ok_or_else(|| QuoteFailure::new("Alpha Vantage API not available"))
    }

    fn success(&self, symbol: &str, snapshot: &StockSnapshot) -> String {
        self.failures.clear(symbol);
        strip_markdown(&format_stock_response(snapshot))
    }

    fn record_failure(&self, symbol: &str, failure: &QuoteFailure, answer: &str) {
        let kind = failure
            .cause
            .as_ref()
            .map(FailureKind::from)
            .unwrap_or(FailureKind::NotFound);
        self.failures.record_failure(symbol, kind, answer);
    }
}

fn failure_with_suggestions(failure: &QuoteFailure) -> String {
    let suggestions: Vec<String> = failure.suggestions.iter().map(|s| format!("- {}", s)).collect();
    format!("❌ {}\n\nSuggestions:\n{}", failure.message, suggestions.join("\n"))
}

fn not_found_message(symbol: &str) -> String {
    format!(
        "❌ Could not find stock data for '{}'. Please check the symbol or try a different stock.\n\n\
         Suggestions:\n\
         - Verify the stock symbol is correct\n\
         - Try the full company name\n\
         - Check if the company is publicly traded",
        symbol
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::exchange_rate::ExchangeRate;
    use crate::services::test_support::{raw_quote, StubQuoteProvider};

    fn lookup(
        alpha_vantage: Option<StubQuoteProvider>,
        yahoo: StubQuoteProvider,
    ) -> (StockLookupService, Option<Arc<StubQuoteProvider>>, Arc<StubQuoteProvider>) {
        let alpha_vantage = alpha_vantage.map(StubQuoteProvider::into_arc);
        let yahoo = yahoo.into_arc();
        let market_data = Arc::new(MarketDataService::new(yahoo.clone(), ExchangeRate::new(80.0)));
        let service = StockLookupService::new(
            alpha_vantage.clone().map(|p| p as Arc<dyn QuoteProvider>),
            market_data,
        );
        (service, alpha_vantage, yahoo)
    }

    #[tokio::test]
    async fn alpha_vantage_answers_first_in_inr() {
        let av = StubQuoteProvider::new("Alpha Vantage").with_quote(raw_quote("AAPL", 200.0, 190.0, "USD"));
        let (service, _, yahoo) = lookup(Some(av), StubQuoteProvider::new("Yahoo Finance"));

        let answer = service
            .handle_financial_query("What is the stock price of Apple?")
            .await
            .unwrap();

        assert!(answer.contains("Current Price: 💰 ₹16,000.00"));
        assert!(answer.contains("₹+800.00 (+5.26%)"));
        assert!(yahoo.calls().is_empty());
    }

    #[tokio::test]
    async fn indian_symbol_tries_exchange_suffixes_on_alpha_vantage() {
        let av = StubQuoteProvider::new("Alpha Vantage")
            .with_quote(raw_quote("TCS.BSE", 3855.7, 3800.0, "USD"));
        let (service, av, _) = lookup(Some(av), StubQuoteProvider::new("Yahoo Finance"));

        let answer = service.handle_financial_query("share price of tcs").await.unwrap();

        assert_eq!(av.unwrap().calls(), vec!["TCS", "TCS.BSE"]);
        assert!(answer.contains("₹3,855.70"));
    }

    #[tokio::test]
    async fn falls_back_to_market_data_without_alpha_vantage() {
        let yahoo = StubQuoteProvider::new("Yahoo Finance").with_quote(raw_quote("MSFT", 400.0, 400.0, "USD"));
        let (service, _, yahoo) = lookup(None, yahoo);

        let answer = service.handle_financial_query("price of microsoft").await.unwrap();

        assert_eq!(yahoo.calls(), vec!["MSFT"]);
        assert!(answer.contains("₹32,000.00"));
    }

    #[tokio::test]
    async fn alpha_vantage_failure_falls_through_to_market_data() {
        let av = StubQuoteProvider::new("Alpha Vantage").with_error("NVDA", QuoteProviderError::RateLimited);
        let yahoo = StubQuoteProvider::new("Yahoo Finance").with_quote(raw_quote("NVDA", 100.0, 100.0, "USD"));
        let (service, _, _) = lookup(Some(av), yahoo);

        let answer = service.handle_financial_query("current price of nvidia").await.unwrap();

        assert!(answer.contains("₹8,000.00"));
    }

    #[tokio::test]
    async fn global_miss_retries_as_indian_listing() {
        let yahoo = StubQuoteProvider::new("Yahoo Finance").with_quote(raw_quote("ZOMATO.NS", 180.0, 175.0, "INR"));
        let (service, _, yahoo) = lookup(None, yahoo);

        let answer = service.handle_financial_query("price of zomato").await.unwrap();

        assert_eq!(yahoo.calls(), vec!["ZOMATO", "ZOMATO.BO", "ZOMATO.NS"]);
        assert!(answer.contains("Current Price: 💰 ₹180.00"));
    }

    #[tokio::test]
    async fn indian_failure_lists_suggestions() {
        let (service, _, _) = lookup(None, StubQuoteProvider::new("Yahoo Finance"));

        let answer = service.handle_financial_query("stock price of wipro").await.unwrap();

        assert!(answer.starts_with("❌ Could not fetch WIPRO data."));
        assert!(answer.contains("Suggestions:\n- Verify the stock symbol (e.g., RELIANCE, TCS, INFY)"));
    }

    #[tokio::test]
    async fn indian_failure_is_repeated_from_cache() {
        let (service, _, yahoo) = lookup(None, StubQuoteProvider::new("Yahoo Finance"));

        let first = service.handle_financial_query("stock price of wipro").await.unwrap();
        let calls_after_first = yahoo.calls().len();
        let second = service.handle_financial_query("stock price of wipro").await.unwrap();

        assert!(first.starts_with("❌ Could not fetch WIPRO data."));
        assert_eq!(first, second);
        assert_eq!(yahoo.calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn indian_alpha_vantage_attempts_run_without_trailing_delay() {
        let (service, av, _) = lookup(
            Some(StubQuoteProvider::new("Alpha Vantage")),
            StubQuoteProvider::new("Yahoo Finance"),
        );

        let started = std::time::Instant::now();
        let result = service.alpha_vantage_indian_quote("WIPRO").await;

        assert!(result.is_err());
        assert_eq!(av.unwrap().calls(), vec!["WIPRO", "WIPRO.BSE", "WIPRO.NS"]);
        assert!(started.elapsed() < INDIAN_ATTEMPT_DELAY * 3);
    }

    #[tokio::test]
    async fn cleanup_drops_expired_failures() {
        let (service, _, _) = lookup(None, StubQuoteProvider::new("Yahoo Finance"));
        service.failures.record_failure_at(
            "OLDCO",
            FailureKind::RateLimited,
            "❌ old",
            chrono::Utc::now() - chrono::Duration::hours(2),
        );
        service.failures.record_failure("NEWCO", FailureKind::NotFound, "❌ new");

        assert_eq!(service.cleanup(), 1);
        assert!(service.failures.is_failed("OLDCO").is_none());
        assert!(service.failures.is_failed("NEWCO").is_some());
    }

    #[tokio::test]
    async fn exhausted_symbol_is_answered_from_failure_cache() {
        let (service, _, yahoo) = lookup(None, StubQuoteProvider::new("Yahoo Finance"));

        let first = service.handle_financial_query("price of xyzq").await.unwrap();
        let calls_after_first = yahoo.calls().len();
        let second = service.handle_financial_query("price of xyzq").await.unwrap();

        assert!(first.starts_with("❌ Could not find stock data for 'XYZQ'"));
        assert_eq!(first, second);
        assert_eq!(yahoo.calls().len(), calls_after_first);
        assert_eq!(
            service.failures.is_failed("XYZQ").map(|f| f.kind),
            Some(FailureKind::NotFound)
        );
    }

    #[tokio::test]
    async fn crypto_answer_keeps_markdown() {
        let yahoo = StubQuoteProvider::new("Yahoo Finance").with_quote(raw_quote("BTC-USD", 60000.0, 59000.0, "USD"));
        let (service, _, _) = lookup(None, yahoo);

        let answer = service.handle_financial_query("bitcoin price today").await.unwrap();

        assert!(answer.starts_with("## 📊 Stock Information for BTC-USD"));
        assert!(answer.contains("**Current Price:** 💰 ₹4,800,000.00"));
    }

    #[tokio::test]
    async fn crypto_failure_is_reported() {
        let (service, _, _) = lookup(None, StubQuoteProvider::new("Yahoo Finance"));
        let answer = service.handle_financial_query("ethereum outlook").await.unwrap();
        assert_eq!(answer, "❌ Could not find data for ETH-USD");
    }

    #[tokio::test]
    async fn index_question_lists_indices() {
        let yahoo = StubQuoteProvider::new("Yahoo Finance").with_quote(raw_quote("^NSEI", 22000.0, 21900.0, "INR"));
        let (service, _, _) = lookup(None, yahoo);

        let answer = service.handle_financial_query("how is nifty today").await.unwrap();

        assert!(answer.starts_with("## 📊 Major Market Indices"));
        assert!(answer.contains("**NIFTY 50:** 🟢 22,000.0 (+0.46%)"));
    }

    #[tokio::test]
    async fn general_questions_are_not_handled() {
        let (service, _, yahoo) = lookup(None, StubQuoteProvider::new("Yahoo Finance"));
        assert!(service.handle_financial_query("what is an ETF?").await.is_none());
        assert!(yahoo.calls().is_empty());
    }
}
