use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live (or fallback) market data for a tracked investment opportunity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveStock {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub market_cap: f64,
    pub pe_ratio: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub fifty_two_week_high: f64,
    pub fifty_two_week_low: f64,
    pub currency: String,
    pub exchange: String,
    pub sector: String,
    pub industry: String,
    pub last_updated: DateTime<Utc>,
    pub success: bool,
    /// Present only on synthesized records served when the live fetch failed
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMovers {
    pub gainers: Vec<LiveStock>,
    pub losers: Vec<LiveStock>,
    pub last_updated: DateTime<Utc>,
}
