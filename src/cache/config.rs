//! Cache tuning derived from the `[cache]` settings table.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECONDS: i64 = 240;
const DEFAULT_MAX_ENTRIES: usize = 1000;
const DEFAULT_INDEX_MISS_WARN_THRESHOLD: u32 = 10;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a memoized value; zero or negative disables memoization.
    pub ttl_seconds: i64,
    /// Upper bound on memoized entries (LRU eviction).
    pub max_entries: usize,
    /// Store fallbacks tolerated before the index is reported as stale.
    pub index_miss_warn_threshold: u32,
    /// Maximum tree changes handled per consumer pass.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            max_entries: DEFAULT_MAX_ENTRIES,
            index_miss_warn_threshold: DEFAULT_INDEX_MISS_WARN_THRESHOLD,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl_seconds: settings.ttl_seconds,
            max_entries: settings.max_entries,
            index_miss_warn_threshold: settings.index_miss_warn_threshold,
            consume_batch_limit: settings.consume_batch_limit,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.ttl_seconds > 0
    }

    pub fn ttl(&self) -> Option<Duration> {
        u64::try_from(self.ttl_seconds)
            .ok()
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs)
    }

    /// Clamped to 1 when configured as zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
