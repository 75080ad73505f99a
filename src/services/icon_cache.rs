//! Per-domain icon cache and request counters
//!
//! Entries live under `icon-{domain}` and hold either the raw icon bytes or
//! the literal sentinel `DEFAULT`, meaning "resolution failed, serve the
//! default icon". Counters live under `counter-{name}` as decimal strings.
//!
//! Store failures never fail a request: reads degrade to a miss and writes
//! are logged and dropped.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, error, info};

use crate::cache::CacheStore;
use crate::errors::CacheResult;
use crate::models::Icon;

/// Marker stored in place of icon bytes when the chain fell through to the default
pub const DEFAULT_SENTINEL: &[u8] = b"DEFAULT";

/// Named request counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Counter {
    /// Every well-formed resolution request
    Requests,
    /// Requests answered from the cache
    Hits,
    /// Requests answered with the default icon
    Defaults,
}

impl Counter {
    fn key(self) -> String {
        format!("counter-{self}")
    }
}

/// Snapshot of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub requests: u64,
    pub hits: u64,
    pub defaults: u64,
}

/// What a cache entry holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Icon(Bytes),
    Default,
}

impl CachedValue {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Icon(data) => &data[..],
            Self::Default => DEFAULT_SENTINEL,
        }
    }
}

fn icon_key(domain: &str) -> String {
    format!("icon-{domain}")
}

pub struct IconCache {
    store: Arc<dyn CacheStore>,
    default_icon: Icon,
    ttl: Duration,
}

impl IconCache {
    pub fn new(store: Arc<dyn CacheStore>, default_icon: Icon, ttl: Duration) -> Self {
        Self {
            store,
            default_icon,
            ttl,
        }
    }

    /// The shared fallback icon
    pub fn default_icon(&self) -> Icon {
        self.default_icon.clone()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up the cached icon for `domain`
    ///
    /// A hit bumps `hits`; a sentinel hit also bumps `defaults` and yields the
    /// default icon. Cached icons carry bytes only.
    pub async fn get(&self, domain: &str) -> Option<Icon> {
        let value = match self.store.get(&icon_key(domain)).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("Cache miss for {}", domain);
                return None;
            }
            Err(e) => {
                error!("Cache lookup failed for {}: {}", domain, e);
                return None;
            }
        };

        self.increment(Counter::Hits).await;

        if value == DEFAULT_SENTINEL {
            info!("Cache hit for {} (default icon)", domain);
            self.increment(Counter::Defaults).await;
            return Some(self.default_icon());
        }

        info!("Cache hit for {} ({} bytes)", domain, value.len());
        Some(Icon::new(value))
    }

    /// Store a resolution outcome for `domain` with the configured TTL
    pub async fn put(&self, domain: &str, value: CachedValue) {
        if let Err(e) = self
            .store
            .set(&icon_key(domain), value.as_bytes(), Some(self.ttl))
            .await
        {
            error!("Failed to cache icon for {}: {}", domain, e);
        }
    }

    /// Drop the entry for `domain`, returning whether one existed
    pub async fn invalidate(&self, domain: &str) -> CacheResult<bool> {
        let existed = self.store.delete(&icon_key(domain)).await?;
        info!("Invalidated cache for {} (existed: {})", domain, existed);
        Ok(existed)
    }

    /// Bump a counter by one, creating it if it has gone missing
    pub async fn increment(&self, counter: Counter) {
        if let Err(e) = self.try_increment(counter).await {
            error!("Failed to increment counter {}: {}", counter, e);
        }
    }

    async fn try_increment(&self, counter: Counter) -> CacheResult<()> {
        let key = counter.key();
        if self.store.increment(&key, 1).await?.is_some() {
            return Ok(());
        }
        // Evicted or never initialised; another request may recreate it first
        if !self.store.add(&key, b"1", None).await? {
            self.store.increment(&key, 1).await?;
        }
        Ok(())
    }

    /// Current value of every counter, missing or unreadable ones as zero
    pub async fn read_counters(&self) -> Counters {
        let mut counters = Counters::default();
        for counter in Counter::iter() {
            let value = self.read_counter(counter).await;
            match counter {
                Counter::Requests => counters.requests = value,
                Counter::Hits => counters.hits = value,
                Counter::Defaults => counters.defaults = value,
            }
        }
        counters
    }

    async fn read_counter(&self, counter: Counter) -> u64 {
        match self.store.get(&counter.key()).await {
            Ok(Some(raw)) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                error!("Failed to read counter {}: {}", counter, e);
                0
            }
        }
    }

    /// Create every counter at zero unless it already exists
    pub async fn initialize_counters(&self) -> CacheResult<()> {
        for counter in Counter::iter() {
            if self.store.add(&counter.key(), b"0", None).await? {
                info!("Initialised counter {}", counter);
            }
        }
        Ok(())
    }
}
