//! Response cache keyed by normalized query hash.
//!
//! Caches model answers so known questions skip the provider round trip.
//! The cache is best-effort: any store failure is logged and swallowed, and
//! the surrounding request proceeds as a miss. Expiry is dual-layer: entries
//! carry an `expires_at` checked on every read, and the backing store may
//! additionally purge by TTL on its own schedule.

use std::sync::Arc;

use chrono::Utc;
use medibot_abstraction::KeyValueStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Default cache TTL when the caller does not override it.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// A cached model answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 64-hex-char SHA-256 of the normalized query.
    pub cache_key: String,
    /// The cached answer text.
    pub response_text: String,
    /// Detected topic, if any.
    pub topic: Option<String>,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    /// Logical expiry, epoch seconds; always `created_at + ttl`.
    pub expires_at: i64,
}

/// Normalizes a query for cache key generation.
///
/// Lowercase, collapse whitespace runs, strip trailing punctuation, trim.
/// Queries differing only by these elements produce identical keys.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    let lowered = query.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(['?', '!', '.', ',', ';', ':']).trim().to_string()
}

/// SHA-256 hex cache key for a query.
#[must_use]
pub fn cache_key(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_query(query).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content-addressed response cache over a key-value store.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    ttl_hours: i64,
}

impl ResponseCache {
    /// Creates a cache over the given store with the given default TTL.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, ttl_hours: i64) -> Self {
        Self { store, ttl_hours }
    }

    /// Looks up a cached answer for the given query.
    ///
    /// Returns `None` on miss, on logical expiry, and on any store or decode
    /// failure. Never errors.
    pub async fn lookup(&self, query: &str) -> Option<CacheEntry> {
        let key = cache_key(query);

        let item = match self.store.get(&key).await {
            Ok(item) => item?,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed (non-fatal)");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_value(item) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, cache_key = %&key[..12], "Malformed cache entry, treating as miss");
                return None;
            }
        };

        // The store's own TTL cleanup is async; check expiry here too.
        if entry.expires_at <= Utc::now().timestamp() {
            info!(cache_key = %&key[..12], "Cache EXPIRED");
            return None;
        }

        info!(cache_key = %&key[..12], "Cache HIT");
        Some(entry)
    }

    /// Stores a model answer, overwriting any entry for the same key.
    ///
    /// `ttl_hours` overrides the default TTL; cache-warming callers use a
    /// longer one. Store failures are logged and swallowed.
    pub async fn store(
        &self,
        query: &str,
        response_text: &str,
        topic: Option<String>,
        ttl_hours: Option<i64>,
    ) {
        let key = cache_key(query);
        let ttl = ttl_hours.unwrap_or(self.ttl_hours);
        let now = Utc::now().timestamp();

        let entry = CacheEntry {
            cache_key: key.clone(),
            response_text: response_text.to_string(),
            topic,
            created_at: now,
            expires_at: now + ttl * 3600,
        };

        let item = match serde_json::to_value(&entry) {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "Failed to encode cache entry (non-fatal)");
                return;
            }
        };

        match self.store.put(&key, item).await {
            Ok(()) => info!(cache_key = %&key[..12], ttl_hours = ttl, "Cached response"),
            Err(e) => warn!(error = %e, "Cache write failed (non-fatal)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medibot_abstraction::StoreError;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Minimal in-memory store local to these tests.
    #[derive(Default)]
    struct TestStore {
        items: RwLock<HashMap<String, serde_json::Value>>,
        fail: bool,
    }

    #[async_trait]
    impl KeyValueStore for TestStore {
        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
            if self.fail {
                return Err(StoreError::Io("down".to_string()));
            }
            Ok(self.items.read().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, item: serde_json::Value) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Io("down".to_string()));
            }
            self.items.write().unwrap().insert(key.to_string(), item);
            Ok(())
        }
    }

    #[test]
    fn test_normalize_collapses_case_whitespace_punctuation() {
        assert_eq!(normalize_query("  How to   treat a BURN?? "), "how to treat a burn");
        assert_eq!(normalize_query("how to treat a burn"), "how to treat a burn");
        assert_eq!(normalize_query("How to treat a burn!.;:"), "how to treat a burn");
    }

    #[test]
    fn test_equivalent_queries_collide() {
        let variants =
            ["How to perform CPR?", "how to perform cpr", "  HOW TO   PERFORM CPR!!  "];
        let keys: Vec<String> = variants.iter().map(|q| cache_key(q)).collect();
        assert_eq!(keys[0], keys[1]);
        assert_eq!(keys[1], keys[2]);
        assert_eq!(keys[0].len(), 64);
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let cache = ResponseCache::new(Arc::new(TestStore::default()), 24);
        cache.store("How to treat a burn?", "Run cool water.", Some("burn".to_string()), None)
            .await;

        let entry = cache.lookup("how to treat a burn").await.expect("hit");
        assert_eq!(entry.response_text, "Run cool water.");
        assert_eq!(entry.topic.as_deref(), Some("burn"));
        assert_eq!(entry.expires_at, entry.created_at + 24 * 3600);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = Arc::new(TestStore::default());
        let key = cache_key("old question");
        let past = Utc::now().timestamp() - 10;
        store
            .put(
                &key,
                json!({
                    "cache_key": key,
                    "response_text": "stale",
                    "topic": null,
                    "created_at": past - 3600,
                    "expires_at": past,
                }),
            )
            .await
            .unwrap();

        let cache = ResponseCache::new(store, 24);
        assert!(cache.lookup("old question").await.is_none());
    }

    #[tokio::test]
    async fn test_store_errors_are_swallowed() {
        let cache =
            ResponseCache::new(Arc::new(TestStore { fail: true, ..Default::default() }), 24);
        cache.store("q", "a", None, None).await;
        assert!(cache.lookup("q").await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_entry_is_a_miss() {
        let store = Arc::new(TestStore::default());
        let key = cache_key("weird");
        store.put(&key, json!({"not": "an entry"})).await.unwrap();

        let cache = ResponseCache::new(store, 24);
        assert!(cache.lookup("weird").await.is_none());
    }
}
