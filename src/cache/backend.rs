//! Cache backend implementations.

use super::key::CacheKey;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct CacheEntry {
    data: Bytes,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(data: Bytes, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            data,
            expires_at: now.checked_add(ttl),
            last_accessed: now,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>>;
    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn exists(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

type Entries = RwLock<HashMap<String, CacheEntry>>;

/// In-memory backend.
///
/// Expired entries are treated as misses on read and removed by a periodic
/// sweep task. The sweep only holds a weak reference to the map and is
/// stopped by [`MemoryCache::close`] or when the cache is dropped.
pub struct MemoryCache {
    entries: Arc<Entries>,
    max_entries: usize,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self::with_sweep_interval(max_entries, DEFAULT_SWEEP_INTERVAL)
    }

    /// Outside a tokio runtime no sweep task is started and expiry is lazy only.
    pub fn with_sweep_interval(max_entries: usize, interval: Duration) -> Self {
        let entries = Arc::new(RwLock::new(HashMap::new()));
        let sweeper = tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| handle.spawn(sweep(Arc::downgrade(&entries), interval)));
        Self {
            entries,
            max_entries,
            sweeper: std::sync::Mutex::new(sweeper),
        }
    }

    /// Stop the background sweep. Idempotent; the cache stays usable.
    pub fn close(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Remove expired entries now; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, CacheEntry>) {
        let now = Instant::now();
        entries.retain(|_, e| !e.is_expired(now));
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.close();
    }
}

fn purge(entries: &Entries) -> usize {
    let now = Instant::now();
    let mut entries = entries.write().unwrap_or_else(|e| e.into_inner());
    let before = entries.len();
    entries.retain(|_, e| !e.is_expired(now));
    before - entries.len()
}

async fn sweep(entries: Weak<Entries>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(map) = entries.upgrade() else {
            break;
        };
        let removed = purge(&map);
        if removed > 0 {
            tracing::debug!(removed, "cache sweep removed expired entries");
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(&key.hash) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed = now;
                return Ok(Some(entry.data.clone()));
            }
            Some(_) => {}
        }
        entries.remove(&key.hash);
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(&key.hash) {
            self.evict_if_needed(&mut entries);
        }
        entries.insert(key.hash.clone(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key.hash)
            .is_some())
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(&key.hash)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false))
    }

    async fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|e| !e.is_expired(now))
            .count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &CacheKey) -> Result<Option<Bytes>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheKey, _: Bytes, _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn exists(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = MemoryCache::new(16);
        let key = CacheKey::new("k");
        cache
            .set(&key, Bytes::from_static(b"v"), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(Bytes::from_static(b"v")));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(&key).await.unwrap().is_none());
        assert!(!cache.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_purges_in_background() {
        let cache = MemoryCache::with_sweep_interval(16, Duration::from_millis(20));
        cache
            .set(&CacheKey::new("a"), Bytes::from_static(b"1"), Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(cache.entries.read().unwrap().len(), 0);
        cache.close();
        cache.close();
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set(&CacheKey::new("a"), Bytes::from_static(b"1"), ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set(&CacheKey::new("b"), Bytes::from_static(b"2"), ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.get(&CacheKey::new("a")).await.unwrap();
        cache.set(&CacheKey::new("c"), Bytes::from_static(b"3"), ttl).await.unwrap();

        assert!(cache.exists(&CacheKey::new("a")).await.unwrap());
        assert!(!cache.exists(&CacheKey::new("b")).await.unwrap());
        assert_eq!(cache.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_never_expires() {
        let cache = MemoryCache::new(4);
        let key = CacheKey::new("forever");
        cache.set(&key, Bytes::from_static(b"v"), Duration::MAX).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(Bytes::from_static(b"v")));
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_no_runtime_means_lazy_only() {
        let cache = MemoryCache::new(4);
        assert!(cache.sweeper.lock().unwrap().is_none());
        assert_eq!(cache.purge_expired(), 0);
    }
}
