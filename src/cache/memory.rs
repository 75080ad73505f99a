//! In-process cache store with LRU eviction and per-entry expiry

use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CacheStore;
use crate::errors::{CacheError, CacheResult};

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: &[u8], ttl: Option<Duration>) -> Self {
        Self {
            data: data.to_vec(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// LRU backed [`CacheStore`]
///
/// Entries written with a TTL live in the LRU: expired ones are dropped
/// lazily when touched and, when full, the least recently used one is
/// evicted. Entries written without a TTL (the request counters) are pinned
/// outside the LRU and only go away when deleted.
pub struct MemoryCacheStore {
    entries: Mutex<Entries>,
}

struct Entries {
    expiring: LruCache<String, StoredValue>,
    pinned: HashMap<String, Vec<u8>>,
}

impl Entries {
    /// The live value under `key`, dropping it first if it has expired
    fn live(&mut self, key: &str) -> Option<&mut Vec<u8>> {
        if let Some(value) = self.pinned.get_mut(key) {
            return Some(value);
        }

        let now = Instant::now();
        if self
            .expiring
            .peek(key)
            .is_some_and(|value| value.is_expired(now))
        {
            self.expiring.pop(key);
            return None;
        }
        self.expiring.get_mut(key).map(|value| &mut value.data)
    }

    fn insert(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) {
        match ttl {
            Some(_) => {
                self.pinned.remove(key);
                self.expiring
                    .put(key.to_string(), StoredValue::new(value, ttl));
            }
            None => {
                self.expiring.pop(key);
                self.pinned.insert(key.to_string(), value.to_vec());
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        let existed = self.live(key).is_some();
        self.pinned.remove(key);
        self.expiring.pop(key);
        existed
    }
}

impl MemoryCacheStore {
    /// `capacity` bounds the entries that carry a TTL
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                expiring: LruCache::new(capacity),
                pinned: HashMap::new(),
            }),
        }
    }

    /// Number of entries currently held, including not yet collected expired ones
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.expiring.len() + entries.pinned.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        Ok(entries.live(key).map(|value| value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.entries.lock().await.insert(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.lock().await.remove(key))
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        let mut entries = self.entries.lock().await;
        let Some(value) = entries.live(key) else {
            return Ok(None);
        };

        let current: u64 = std::str::from_utf8(value)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or_else(|| {
                CacheError::protocol(format!("cannot increment non-numeric value at {key}"))
            })?;

        let next = current.wrapping_add(delta);
        *value = next.to_string().into_bytes();
        Ok(Some(next))
    }

    async fn add(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        if entries.live(key).is_some() {
            return Ok(false);
        }
        entries.insert(key, value, ttl);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryCacheStore::new(16);

        assert_eq!(store.get("icon-a").await.unwrap(), None);
        store.set("icon-a", b"bytes", None).await.unwrap();
        assert_eq!(store.get("icon-a").await.unwrap(), Some(b"bytes".to_vec()));

        assert!(store.delete("icon-a").await.unwrap());
        assert!(!store.delete("icon-a").await.unwrap());
        assert_eq!(store.get("icon-a").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let store = MemoryCacheStore::new(16);
        store
            .set("icon-a", b"bytes", Some(Duration::from_secs(60)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("icon-a").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("icon-a").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_increment_counters() {
        let store = MemoryCacheStore::new(16);

        assert_eq!(store.increment("counter-hits", 1).await.unwrap(), None);

        store.set("counter-hits", b"0", None).await.unwrap();
        assert_eq!(store.increment("counter-hits", 1).await.unwrap(), Some(1));
        assert_eq!(store.increment("counter-hits", 5).await.unwrap(), Some(6));
        assert_eq!(store.get("counter-hits").await.unwrap(), Some(b"6".to_vec()));

        store.set("icon-a", b"\x00\x01", None).await.unwrap();
        assert!(store.increment("icon-a", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_add_only_when_absent() {
        let store = MemoryCacheStore::new(16);

        assert!(store.add("counter-requests", b"0", None).await.unwrap());
        store.increment("counter-requests", 3).await.unwrap();
        assert!(!store.add("counter-requests", b"0", None).await.unwrap());
        assert_eq!(
            store.get("counter-requests").await.unwrap(),
            Some(b"3".to_vec())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_replaces_expired_entry() {
        let store = MemoryCacheStore::new(16);
        store
            .set("k", b"old", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(store.add("k", b"new", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_least_recently_used_entry_is_evicted() {
        let store = MemoryCacheStore::new(2);
        let ttl = Some(Duration::from_secs(60));
        store.set("a", b"1", ttl).await.unwrap();
        store.set("b", b"2", ttl).await.unwrap();
        store.get("a").await.unwrap();
        store.set("c", b"3", ttl).await.unwrap();

        assert!(store.get("a").await.unwrap().is_some());
        assert_eq!(store.get("b").await.unwrap(), None);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_counters_survive_icon_churn() {
        let store = MemoryCacheStore::new(8);
        assert!(store.add("counter-hits", b"0", None).await.unwrap());
        store.increment("counter-hits", 2).await.unwrap();

        for i in 0..10 {
            store
                .set(&format!("icon-http://site{i}.example"), b"icon", Some(Duration::from_secs(60)))
                .await
                .unwrap();
        }

        assert_eq!(store.get("counter-hits").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get("icon-http://site0.example").await.unwrap(), None);
        assert_eq!(store.len().await, 9);
    }

    #[tokio::test]
    async fn test_setting_with_ttl_unpins_entry() {
        let store = MemoryCacheStore::new(4);
        store.set("k", b"pinned", None).await.unwrap();
        store.set("k", b"expiring", Some(Duration::from_secs(60))).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(b"expiring".to_vec()));
        assert_eq!(store.len().await, 1);
        assert!(store.delete("k").await.unwrap());
        assert!(store.is_empty().await);
    }
}
