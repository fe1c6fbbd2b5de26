//! Time-boxed memoization of resolved cache values.
//!
//! Only hits are memoized: a lookup that produced nothing is retried on the
//! next read. Entries expire after the configured TTL and are also evicted
//! in LRU order once `max_entries` is reached.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::path::ContentPath;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};
use super::values::CacheValues;

pub const CACHE_KEY_PREFIX: &str = "published-content:";

const SOURCE: &str = "cache::memo";
const METRIC_CACHE_HIT: &str = "arbor_cache_hit_total";
const METRIC_CACHE_MISS: &str = "arbor_cache_miss_total";

pub fn cache_key(id: i32) -> String {
    format!("{CACHE_KEY_PREFIX}{id}")
}

/// Storage behind the memoizer.
pub trait ValuesCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<CacheValues>>;

    fn insert(&self, key: String, values: Arc<CacheValues>, ttl: Duration);

    fn remove(&self, key: &str) -> bool;

    /// Remove every entry whose values satisfy `predicate`; returns the count.
    fn remove_where(&self, predicate: &dyn Fn(&CacheValues) -> bool) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct TimedEntry {
    values: Arc<CacheValues>,
    expires_at: Instant,
}

/// LRU-bounded store whose entries carry their own deadline.
pub struct TimedValuesCache {
    entries: RwLock<LruCache<String, TimedEntry>>,
}

impl TimedValuesCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
        }
    }
}

impl ValuesCache for TimedValuesCache {
    fn get(&self, key: &str) -> Option<Arc<CacheValues>> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(Arc::clone(&entry.values));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    fn insert(&self, key: String, values: Arc<CacheValues>, ttl: Duration) {
        let entry = TimedEntry {
            values,
            expires_at: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "insert").put(key, entry);
    }

    fn remove(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "remove")
            .pop(key)
            .is_some()
    }

    fn remove_where(&self, predicate: &dyn Fn(&CacheValues) -> bool) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "remove_where");
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| predicate(&entry.values))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }
}

pub struct Memoizer {
    cache: Arc<dyn ValuesCache>,
    ttl: Option<Duration>,
}

impl Memoizer {
    pub fn new(cache: Arc<dyn ValuesCache>, config: &CacheConfig) -> Self {
        Self {
            cache,
            ttl: config.ttl(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Arc::new(TimedValuesCache::new(config)), config)
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl.is_some()
    }

    /// Return the memoized values for `id`, running `producer` on a miss.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        id: i32,
        producer: F,
    ) -> Result<Option<Arc<CacheValues>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Arc<CacheValues>>, E>>,
    {
        let Some(ttl) = self.ttl else {
            return producer().await;
        };

        let key = cache_key(id);
        if let Some(values) = self.cache.get(&key) {
            counter!(METRIC_CACHE_HIT).increment(1);
            return Ok(Some(values));
        }
        counter!(METRIC_CACHE_MISS).increment(1);

        let produced = producer().await?;
        if let Some(values) = &produced {
            self.cache.insert(key, Arc::clone(values), ttl);
        }
        Ok(produced)
    }

    /// Evict `id` only.
    pub fn clear_key(&self, id: i32) -> bool {
        self.cache.remove(&cache_key(id))
    }

    /// Evict `id` and every memoized node below it.
    pub fn clear(&self, id: i32) -> usize {
        let own = usize::from(self.clear_key(id));
        let descendants = self.cache.remove_where(&|values: &CacheValues| {
            values
                .path()
                .and_then(|raw| raw.parse::<ContentPath>().ok())
                .is_some_and(|path| path.has_ancestor(id))
        });
        debug!(
            content_id = id,
            evicted = own + descendants,
            "Evicted memoized content"
        );
        own + descendants
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
