use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::external::quote_provider::QuoteProviderError;

/// A quote ready for display, usually converted to INR.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockSnapshot {
    pub symbol: String,
    pub company_name: Option<String>,
    /// BSE / NSE for Indian listings
    pub exchange: Option<String>,
    pub current_price: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub currency: String,
    /// Set when prices were converted from another currency
    pub original_currency: Option<String>,
    pub exchange_rate: Option<f64>,
    pub latest_trading_day: Option<String>,
    pub source: String,
    pub last_updated: NaiveDateTime,
}

impl StockSnapshot {
    pub fn is_indian_listing(&self) -> bool {
        matches!(self.exchange.as_deref(), Some("BSE") | Some("NSE"))
    }
}

/// A named market index with its latest level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexQuote {
    pub name: String,
    pub snapshot: StockSnapshot,
}

/// Why a quote lookup failed, with hints the user can act on.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[error("{message}")]
pub struct QuoteFailure {
    pub message: String,
    pub suggestions: Vec<String>,
    /// Last provider error seen, if any
    #[serde(skip)]
    pub cause: Option<QuoteProviderError>,
}

impl QuoteFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: Option<QuoteProviderError>) -> Self {
        self.cause = cause;
        self
    }

    pub fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggestions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }
}
