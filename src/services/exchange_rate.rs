use std::sync::Arc;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::external::quote_provider::QuoteProvider;

pub const DEFAULT_USD_INR_RATE: f64 = 83.0;

/// Shared USD→INR conversion rate. Every displayed price is in rupees.
#[derive(Clone)]
pub struct ExchangeRate {
    rate: Arc<RwLock<f64>>,
}

impl ExchangeRate {
    pub fn new(initial: f64) -> Self {
        let initial = if initial > 0.0 { initial } else { DEFAULT_USD_INR_RATE };
        Self {
            rate: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn usd_to_inr(&self) -> f64 {
        *self.rate.read()
    }

    /// Asks each provider in turn and keeps the first positive rate.
    /// Returns false when every provider failed and the old rate stays.
    pub async fn refresh(&self, providers: &[Arc<dyn QuoteProvider>]) -> bool {
        for provider in providers {
            match provider.fetch_usd_inr_rate().await {
                Ok(rate) if rate > 0.0 => {
                    *self.rate.write() = rate;
                    info!("✅ Updated USD to INR rate from {}: ₹{:.2}", provider.name(), rate);
                    return true;
                }
                Ok(rate) => warn!("{} returned an invalid USD/INR rate: {}", provider.name(), rate),
                Err(e) => warn!("⚠️ Failed to update exchange rate from {}: {}", provider.name(), e),
            }
        }

        warn!("⚠️ Using USD to INR rate: ₹{:.2}", self.usd_to_inr());
        false
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self::new(DEFAULT_USD_INR_RATE)
    }
}
