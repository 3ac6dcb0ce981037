use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    created_at: Instant,
}

/// In-memory key/value cache with a fixed time-to-live.
///
/// Expired entries are ignored on read and dropped by `clear_expired`.
/// Cloning shares the underlying map.
#[derive(Clone)]
pub struct TtlCache<V> {
    entries: Arc<RwLock<HashMap<String, CachedEntry<V>>>>,
    ttl: Duration,
}

impl<V: Clone + Send + Sync> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        let cached = entries.get(key)?;
        if cached.created_at.elapsed() < self.ttl {
            debug!("Cache hit for key: {}", truncate_key(key));
            return Some(cached.value.clone());
        }
        None
    }

    pub async fn set(&self, key: String, value: V) {
        let mut entries = self.entries.write().await;
        debug!("Cached value (key: {})", truncate_key(&key));
        entries.insert(key, CachedEntry {
            value,
            created_at: Instant::now(),
        });
    }

    pub async fn clear_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let initial_count = entries.len();
        entries.retain(|_, v| v.created_at.elapsed() < self.ttl);
        let removed_count = initial_count - entries.len();
        if removed_count > 0 {
            debug!("Cleared {} expired cache entries", removed_count);
        }
        removed_count
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn truncate_key(key: &str) -> &str {
    match key.char_indices().nth(50) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_stores_and_retrieves() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("AAPL".to_string(), 175.23_f64).await;

        assert_eq!(cache.get("AAPL").await, Some(175.23));
        assert_eq!(cache.get("MSFT").await, None);
    }

    #[tokio::test]
    async fn test_cache_expires() {
        let cache = TtlCache::new(Duration::from_millis(100));
        cache.set("test_key".to_string(), "test_value".to_string()).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get("test_key").await, None);
        assert_eq!(cache.clear_expired().await, 1);
        assert_eq!(cache.len().await, 0);
    }

    #[test]
    fn test_truncate_key_respects_char_boundaries() {
        let key = "₹".repeat(60);
        assert_eq!(truncate_key(&key).chars().count(), 50);
        assert_eq!(truncate_key("short"), "short");
    }
}
