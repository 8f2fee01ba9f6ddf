//! Response cache for validated queries
//!
//! Entries are keyed by identity plus the normalized prompt and live for a
//! fixed TTL. Expiry is checked on every read, so a stale entry is never
//! served even between sweeps; the periodic sweep only reclaims memory.

use crate::domain::query::{GeneratedQuery, Identity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Default TTL in seconds (10 minutes for generated queries)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;
/// Default sweep interval in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// Default cache size
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

/// Cache entry for a validated query
#[derive(Clone)]
struct ResponseCacheEntry {
    query: GeneratedQuery,
    created_at: Instant,
}

type CacheKey = (Identity, String);

/// TTL cache of validated queries keyed by identity and normalized prompt
pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, ResponseCacheEntry>>,
    ttl: Duration,
    sweep_interval: Duration,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(config.ttl_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            max_entries: config.max_entries.max(1),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Lower-case and collapse whitespace so formatting differences share a key.
    pub fn normalize_prompt(prompt: &str) -> String {
        prompt
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    fn make_key(identity: &Identity, prompt: &str) -> CacheKey {
        (identity.clone(), Self::normalize_prompt(prompt))
    }

    /// Get a query from cache if not expired
    pub async fn get(&self, identity: &Identity, prompt: &str) -> Option<GeneratedQuery> {
        self.get_at(identity, prompt, Instant::now()).await
    }

    pub async fn get_at(
        &self,
        identity: &Identity,
        prompt: &str,
        now: Instant,
    ) -> Option<GeneratedQuery> {
        let key = Self::make_key(identity, prompt);
        let result = {
            let entries = self.entries.read().await;
            entries
                .get(&key)
                .filter(|entry| !self.is_expired(entry, now))
                .map(|entry| entry.query.clone())
        };

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Store a query in cache
    pub async fn put(&self, identity: &Identity, prompt: &str, query: GeneratedQuery) {
        self.put_at(identity, prompt, query, Instant::now()).await
    }

    pub async fn put_at(
        &self,
        identity: &Identity,
        prompt: &str,
        query: GeneratedQuery,
        now: Instant,
    ) {
        let key = Self::make_key(identity, prompt);
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, entry| !self.is_expired(entry, now));
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            ResponseCacheEntry {
                query,
                created_at: now,
            },
        );
    }

    /// Clear expired entries
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    pub async fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Swept expired cache entries");
        }
        removed
    }

    /// Clear entire cache
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> ResponseCacheStats {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests > 0 {
            hits as f32 / total_requests as f32
        } else {
            0.0
        };

        ResponseCacheStats {
            total_entries: entries.len(),
            valid_entries: entries
                .values()
                .filter(|e| !self.is_expired(e, now))
                .count(),
            max_entries: self.max_entries,
            hits,
            misses,
            hit_rate,
        }
    }

    fn is_expired(&self, entry: &ResponseCacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) >= self.ttl
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseCacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub max_entries: usize,
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(sql: &str) -> GeneratedQuery {
        GeneratedQuery::new(sql, vec![serde_json::json!(42)])
    }

    #[test]
    fn test_normalize_prompt() {
        assert_eq!(
            ResponseCache::normalize_prompt("  Show   MY\n orders "),
            "show my orders"
        );
    }

    #[tokio::test]
    async fn test_get_after_put_returns_same_query() {
        let cache = ResponseCache::default();
        let id = Identity::new("42");
        let q = query("SELECT * FROM orders WHERE customer_id = $1");
        cache.put(&id, "my orders", q.clone()).await;
        assert_eq!(cache.get(&id, "my orders").await, Some(q));
    }

    #[tokio::test]
    async fn test_formatting_differences_share_entry() {
        let cache = ResponseCache::default();
        let id = Identity::new("42");
        let q = query("SELECT * FROM orders WHERE customer_id = $1");
        cache.put(&id, "My   Orders", q.clone()).await;
        assert_eq!(cache.get(&id, "my orders").await, Some(q));
    }

    #[tokio::test]
    async fn test_entries_are_per_identity() {
        let cache = ResponseCache::default();
        cache
            .put(&Identity::new("1"), "my orders", query("SELECT * FROM orders"))
            .await;
        assert_eq!(cache.get(&Identity::new("2"), "my orders").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_absent_without_sweep() {
        let cache = ResponseCache::default();
        let id = Identity::new("42");
        let base = Instant::now();
        cache
            .put_at(&id, "my orders", query("SELECT * FROM orders"), base)
            .await;

        let just_before = base + Duration::from_secs(DEFAULT_CACHE_TTL_SECS - 1);
        assert!(cache.get_at(&id, "my orders", just_before).await.is_some());

        let after = base + Duration::from_secs(DEFAULT_CACHE_TTL_SECS);
        assert_eq!(cache.get_at(&id, "my orders", after).await, None);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let cache = ResponseCache::default();
        let id = Identity::new("42");
        let base = Instant::now();
        cache
            .put_at(&id, "old", query("SELECT * FROM orders"), base)
            .await;
        cache
            .put_at(
                &id,
                "new",
                query("SELECT * FROM products"),
                base + Duration::from_secs(400),
            )
            .await;

        let removed = cache
            .sweep_at(base + Duration::from_secs(DEFAULT_CACHE_TTL_SECS + 1))
            .await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = ResponseCache::new(&CacheConfig {
            max_entries: 2,
            ..Default::default()
        });
        let id = Identity::new("42");
        let base = Instant::now();
        cache.put_at(&id, "a", query("SELECT 1"), base).await;
        cache
            .put_at(&id, "b", query("SELECT 2"), base + Duration::from_secs(1))
            .await;
        cache
            .put_at(&id, "c", query("SELECT 3"), base + Duration::from_secs(2))
            .await;

        let now = base + Duration::from_secs(3);
        assert_eq!(cache.len().await, 2);
        assert!(cache.get_at(&id, "a", now).await.is_none());
        assert!(cache.get_at(&id, "c", now).await.is_some());
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = ResponseCache::default();
        let id = Identity::new("42");
        cache.put(&id, "x", query("SELECT 1")).await;
        cache.get(&id, "x").await;
        cache.get(&id, "y").await;
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.valid_entries, 1);
    }

    #[tokio::test]
    async fn test_clear_drops_entries_and_counters() {
        let cache = ResponseCache::default();
        let id = Identity::new("42");
        cache.put(&id, "x", query("SELECT 1")).await;
        cache.get(&id, "x").await;
        cache.get(&id, "y").await;

        cache.clear().await;
        assert!(cache.is_empty().await);
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (0, 0));
        assert!(cache.get(&id, "x").await.is_none());
    }
}
