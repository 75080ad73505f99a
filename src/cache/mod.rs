//! Key-value cache backends
//!
//! The icon cache and the request counters live behind [`CacheStore`], a
//! small set of atomic primitives modelled on memcached: get, set with TTL,
//! delete, increment and add-if-absent. Two backends are provided:
//!
//! - [`MemoryCacheStore`]: in-process LRU, the default
//! - [`MemcachedStore`]: remote memcached over its text protocol

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{CacheBackend, CacheConfig};
use crate::errors::CacheResult;

pub mod memcached;
pub mod memory;

pub use memcached::MemcachedStore;
pub use memory::MemoryCacheStore;

/// Atomic key-value primitives with expiry
///
/// Implementations must be safe to share between concurrent requests.
/// A `ttl` of `None` means the entry never expires.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove `key`, returning whether it existed
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Add `delta` to a decimal counter, returning the new value or `None`
    /// when the key does not exist
    async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>>;

    /// Store `value` only if `key` is absent, returning whether it was stored
    async fn add(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<bool>;
}

/// Build the configured cache backend
pub fn create_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    match config.backend {
        CacheBackend::Memory => {
            info!("Using in-memory cache store (capacity {})", config.capacity);
            Arc::new(MemoryCacheStore::new(config.capacity))
        }
        CacheBackend::Memcached => {
            info!("Using memcached cache store at {}:{}", config.host, config.port);
            Arc::new(MemcachedStore::new(
                format!("{}:{}", config.host, config.port),
                config.io_timeout,
            ))
        }
    }
}
