use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::external::quote_provider::QuoteProviderError;

/// A symbol whose whole provider chain failed recently.
#[derive(Debug, Clone)]
pub struct FailedLookup {
    pub failed_at: DateTime<Utc>,
    pub kind: FailureKind,
    pub ttl_hours: i64,
    /// Reply given when the lookup failed, repeated on cache hits.
    pub answer: String,
}

impl FailedLookup {
    fn expires_at(&self) -> DateTime<Utc> {
        self.failed_at + Duration::hours(self.ttl_hours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureKind {
    NotFound,
    RateLimited,
    Upstream,
}

impl FailureKind {
    fn ttl_hours(self) -> i64 {
        match self {
            FailureKind::NotFound => 24,
            FailureKind::RateLimited => 1,
            FailureKind::Upstream => 6,
        }
    }
}

impl From<&QuoteProviderError> for FailureKind {
    fn from(err: &QuoteProviderError) -> Self {
        match err {
            QuoteProviderError::NotFound => FailureKind::NotFound,
            QuoteProviderError::RateLimited => FailureKind::RateLimited,
            _ => FailureKind::Upstream,
        }
    }
}

/// Remembers symbols that exhausted every quote provider so repeated
/// questions about them skip the network round-trips.
#[derive(Clone, Default)]
pub struct FailureCache {
    entries: Arc<DashMap<String, FailedLookup>>,
}

impl FailureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_failed(&self, symbol: &str) -> Option<FailedLookup> {
        let key = symbol.to_uppercase();
        let lookup = self.entries.get(&key).map(|entry| entry.value().clone())?;

        if Utc::now() < lookup.expires_at() {
            return Some(lookup);
        }

        self.entries.remove(&key);
        None
    }

    pub fn record_failure(&self, symbol: &str, kind: FailureKind, answer: &str) {
        self.record_failure_at(symbol, kind, answer, Utc::now());
    }

    pub(crate) fn record_failure_at(
        &self,
        symbol: &str,
        kind: FailureKind,
        answer: &str,
        failed_at: DateTime<Utc>,
    ) {
        self.entries.insert(
            symbol.to_uppercase(),
            FailedLookup {
                failed_at,
                kind,
                ttl_hours: kind.ttl_hours(),
                answer: answer.to_string(),
            },
        );
    }

    pub fn clear(&self, symbol: &str) {
        self.entries.remove(&symbol.to_uppercase());
    }

    /// Drops expired entries and returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, lookup| now < lookup.expires_at());
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_records_and_retrieves_failures() {
        let cache = FailureCache::new();
        cache.record_failure("NOTAREALCO", FailureKind::NotFound, "❌ not found");

        let result = cache.is_failed("notarealco").unwrap();
        assert_eq!(result.kind, FailureKind::NotFound);
        assert_eq!(result.answer, "❌ not found");
    }

    #[test]
    fn test_cache_clears_symbol() {
        let cache = FailureCache::new();
        cache.record_failure("TEST", FailureKind::Upstream, "");
        assert!(cache.is_failed("TEST").is_some());

        cache.clear("TEST");
        assert!(cache.is_failed("TEST").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_different_ttls_for_failure_kinds() {
        let cache = FailureCache::new();
        cache.record_failure("NOT_FOUND", FailureKind::NotFound, "");
        cache.record_failure("RATE_LIMITED", FailureKind::from(&QuoteProviderError::RateLimited), "");
        cache.record_failure("OTHER", FailureKind::from(&QuoteProviderError::Network("x".into())), "");

        assert_eq!(cache.is_failed("NOT_FOUND").unwrap().ttl_hours, 24);
        assert_eq!(cache.is_failed("RATE_LIMITED").unwrap().ttl_hours, 1);
        assert_eq!(cache.is_failed("OTHER").unwrap().ttl_hours, 6);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = FailureCache::new();
        cache.record_failure_at("OLD", FailureKind::RateLimited, "", Utc::now() - Duration::hours(2));
        cache.record_failure("NEW", FailureKind::RateLimited, "");

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.is_failed("OLD").is_none());
        assert_eq!(cache.len(), 1);
    }
}
