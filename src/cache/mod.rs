//! Published-content read cache.
//!
//! Values are read from the search index, the structured document tree or
//! the authoritative store, normalised into [`CacheValues`] and wrapped in
//! [`PublishedNode`] adapters.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! ttl_seconds = 240
//! max_entries = 1000
//! index_miss_warn_threshold = 10
//! consume_batch_limit = 100
//! ```

mod arbitrator;
mod config;
mod consumer;
mod events;
pub mod extract;
pub(crate) mod lock;
mod memo;
mod node;
pub mod values;

pub use arbitrator::{CacheError, SourceArbitrator};
pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use events::{Epoch, TreeChange, TreeChangeQueue};
pub use memo::{CACHE_KEY_PREFIX, Memoizer, TimedValuesCache, ValuesCache, cache_key};
pub use node::{NodeResolver, PublishedNode, PublishedProperty};
pub use values::{CacheValues, Field, ValuesError};
