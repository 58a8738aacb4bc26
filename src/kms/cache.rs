//! Time-bounded cache of issued data keys.
//!
//! Keyed by `(key id, encryption context)`, so a DEK issued for one tenant
//! is never handed to another. Cuts key-provider round-trips when many
//! credentials are written in a burst.
//!
//! The map sits behind a `std::sync::RwLock` that is only ever held around
//! map access, never across an `.await`: a miss is resolved by the caller,
//! which talks to the provider with no lock held and then calls [`DataKeyCache::put`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{EncryptionContext, GeneratedDataKey};
use crate::crypto::DataKey;

/// How long an issued data key may be reused.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cached DEK. `plain_key` zeroes itself when the entry is dropped.
struct DataKeyCacheEntry {
    plain_key: DataKey,
    wrapped_key: Vec<u8>,
    expires_at: Instant,
}

/// Read/write-locked TTL cache of data keys.
pub struct DataKeyCache {
    entries: RwLock<HashMap<String, DataKeyCacheEntry>>,
    ttl: Duration,
}

impl DataKeyCache {
    /// Create a new cache with the specified TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a new cache with the default TTL (5 minutes).
    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Deterministic cache key: key id, then context entries in sorted order.
    ///
    /// Separators inside ids or values are escaped so distinct inputs can
    /// never produce the same key.
    pub fn cache_key(key_id: &str, context: &EncryptionContext) -> String {
        let mut key = escape(key_id);
        key.push('|');
        let entries: Vec<String> = context
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect();
        key.push_str(&entries.join(","));
        key
    }

    /// Look up a live entry and return an independent copy of it.
    ///
    /// The caller may zero or drop its copy freely; the cached buffer is
    /// unaffected, and vice versa.
    pub fn get(&self, key_id: &str, context: &EncryptionContext) -> Option<GeneratedDataKey> {
        let cache_key = Self::cache_key(key_id, context);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let entry = entries.get(&cache_key)?;
        if entry.expires_at <= Instant::now() {
            debug!(key_id = %key_id, "data key cache entry expired");
            return None;
        }

        Some(GeneratedDataKey {
            plaintext: entry.plain_key.clone(),
            wrapped: entry.wrapped_key.clone(),
        })
    }

    /// Store a copy of a freshly issued data key.
    ///
    /// A TTL too large to represent as a deadline is not cached at all.
    pub fn put(&self, key_id: &str, context: &EncryptionContext, issued: &GeneratedDataKey) {
        let Some(expires_at) = Instant::now().checked_add(self.ttl) else {
            debug!(key_id = %key_id, "cache TTL out of range, not caching data key");
            return;
        };
        let cache_key = Self::cache_key(key_id, context);
        let entry = DataKeyCacheEntry {
            plain_key: issued.plaintext.clone(),
            wrapped_key: issued.wrapped.clone(),
            expires_at,
        };

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // A replaced entry is dropped here, zeroing its key.
        entries.insert(cache_key, entry);
        debug!(key_id = %key_id, ttl_secs = self.ttl.as_secs(), "cached data key");
    }

    /// Remove every expired entry, returning how many were evicted.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Drop every entry, zeroing all cached keys.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        debug!("cleared data key cache");
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run [`DataKeyCache::evict_expired`] every `every` until `cancel` fires.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = self.evict_expired();
                        if evicted > 0 {
                            debug!(evicted, "swept expired data keys");
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for DataKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKeyCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '|' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroize::Zeroize;

    fn issued(byte: u8) -> GeneratedDataKey {
        GeneratedDataKey {
            plaintext: DataKey::new([byte; 32]),
            wrapped: vec![byte; 8],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_live_for_the_ttl_and_no_longer() {
        let cache = DataKeyCache::with_default_ttl();
        let ctx = EncryptionContext::for_tenant("acme");
        cache.put("k", &ctx, &issued(1));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("k", &ctx).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k", &ctx).is_none());

        assert_eq!(cache.evict_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn get_returns_a_copy() {
        let cache = DataKeyCache::with_default_ttl();
        let ctx = EncryptionContext::new();
        cache.put("k", &ctx, &issued(7));

        let mut copy = cache.get("k", &ctx).unwrap();
        copy.plaintext.zeroize();
        copy.wrapped.clear();

        let again = cache.get("k", &ctx).unwrap();
        assert_eq!(again.plaintext.as_bytes(), &[7u8; 32]);
        assert_eq!(again.wrapped, vec![7u8; 8]);
    }

    #[tokio::test]
    async fn put_stores_a_copy() {
        let cache = DataKeyCache::with_default_ttl();
        let ctx = EncryptionContext::new();
        let mut original = issued(9);
        cache.put("k", &ctx, &original);

        original.plaintext.zeroize();

        assert_eq!(cache.get("k", &ctx).unwrap().plaintext.as_bytes(), &[9u8; 32]);
    }

    #[tokio::test]
    async fn entries_are_scoped_by_key_id_and_context() {
        let cache = DataKeyCache::with_default_ttl();
        let acme = EncryptionContext::for_tenant("acme");
        let globex = EncryptionContext::for_tenant("globex");
        cache.put("k", &acme, &issued(1));

        assert!(cache.get("k", &globex).is_none());
        assert!(cache.get("other", &acme).is_none());
        assert!(cache.get("k", &acme).is_some());
    }

    #[test]
    fn cache_keys_escape_separators() {
        let a = EncryptionContext::new().with("a", "b,c=d");
        let b = EncryptionContext::new().with("a", "b").with("c", "d");
        assert_ne!(
            DataKeyCache::cache_key("k", &a),
            DataKeyCache::cache_key("k", &b)
        );
        assert_ne!(
            DataKeyCache::cache_key("k|x", &EncryptionContext::new()),
            DataKeyCache::cache_key("k", &EncryptionContext::new().with("x", ""))
        );
    }

    #[tokio::test]
    async fn unrepresentable_ttl_skips_caching() {
        let cache = DataKeyCache::new(Duration::from_secs(u64::MAX));
        let ctx = EncryptionContext::new();
        cache.put("k", &ctx, &issued(5));

        assert!(cache.is_empty());
        assert!(cache.get("k", &ctx).is_none());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let cache = DataKeyCache::with_default_ttl();
        cache.put("a", &EncryptionContext::new(), &issued(1));
        cache.put("b", &EncryptionContext::new(), &issued(2));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_until_cancelled() {
        let cache = Arc::new(DataKeyCache::new(Duration::from_secs(10)));
        cache.put("k", &EncryptionContext::new(), &issued(3));

        let cancel = CancellationToken::new();
        let handle = Arc::clone(&cache).spawn_sweeper(Duration::from_secs(5), cancel.clone());

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(cache.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
