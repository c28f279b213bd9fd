use crate::domain::ports::Cache;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

pub const DEFAULT_MAX_SIZE: usize = 1000;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry<V> {
    value: V,
    expires_at: Instant,
    accessed_at: Instant,
}

type Entries<V> = HashMap<String, Entry<V>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub expired_entries: usize,
}

/// Bounded in-process cache with per-entry TTL and least-recently-used eviction.
///
/// Expired entries are dropped lazily on read and by an optional background sweeper.
/// The sweeper only holds a weak reference and stops once the cache is dropped.
pub struct TtlCache<V> {
    entries: Arc<Mutex<Entries<V>>>,
    max_size: usize,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            max_size: max_size.max(1),
        }
    }

    /// Creates a cache and starts its expiry sweeper on the current tokio runtime.
    pub fn with_sweeper(max_size: usize, interval: Duration) -> Self {
        let cache = Self::new(max_size);
        cache.spawn_sweeper(interval);
        cache
    }

    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let entries: Weak<Mutex<Entries<V>>> = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let removed = remove_expired(&mut *entries.lock().await);
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        })
    }

    /// Drops every expired entry and returns how many were removed.
    pub async fn sweep(&self) -> usize {
        remove_expired(&mut *self.entries.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        CacheStats {
            size: entries.len(),
            max_size: self.max_size,
            expired_entries: entries.values().filter(|e| e.expires_at <= now).count(),
        }
    }
}

fn remove_expired<V>(entries: &mut Entries<V>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    before - entries.len()
}

fn evict_lru<V>(entries: &mut Entries<V>) {
    let lru = entries
        .iter()
        .min_by_key(|(_, entry)| entry.accessed_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = lru {
        entries.remove(&key);
        debug!(%key, "evicted least recently used cache entry");
    }
}

#[async_trait]
impl<V> Cache<V> for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.accessed_at = now;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.max_size && !entries.contains_key(key) {
            evict_lru(&mut entries);
        }
        let now = Instant::now();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
                accessed_at: now,
            },
        );
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }
}
