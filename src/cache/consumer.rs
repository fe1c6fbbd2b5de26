//! Applies queued tree changes to the memoizer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument};

use crate::domain::types::TreeChangeKind;

use super::arbitrator::SourceArbitrator;
use super::config::CacheConfig;
use super::events::TreeChangeQueue;

const METRIC_CACHE_CONSUME_MS: &str = "arbor_cache_consume_ms";

pub struct CacheConsumer {
    config: CacheConfig,
    queue: Arc<TreeChangeQueue>,
    arbitrator: SourceArbitrator,
}

impl CacheConsumer {
    pub fn new(config: CacheConfig, queue: Arc<TreeChangeQueue>, arbitrator: SourceArbitrator) -> Self {
        Self {
            config,
            queue,
            arbitrator,
        }
    }

    /// Drain one batch of changes; returns false when the queue was empty.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let started_at = Instant::now();
        let changes = self.queue.drain(self.config.consume_batch_limit);
        if changes.is_empty() {
            return false;
        }

        // one eviction per content id; branch-wide changes win over node refreshes
        let mut plan: BTreeMap<i32, TreeChangeKind> = BTreeMap::new();
        for change in &changes {
            plan.entry(change.content_id)
                .and_modify(|kind| {
                    if *kind == TreeChangeKind::RefreshNode {
                        *kind = change.kind;
                    }
                })
                .or_insert(change.kind);
        }

        let mut evicted = 0;
        for (content_id, kind) in &plan {
            evicted += match kind {
                TreeChangeKind::RefreshNode => usize::from(self.arbitrator.clear_key(*content_id)),
                TreeChangeKind::RefreshBranch | TreeChangeKind::Remove => {
                    self.arbitrator.clear(*content_id)
                }
            };
        }

        info!(
            change_count = changes.len(),
            content_count = plan.len(),
            evicted,
            "Tree changes consumed"
        );
        histogram!(METRIC_CACHE_CONSUME_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        true
    }

    /// Consume until the queue is empty.
    pub fn consume_all(&self) -> usize {
        let mut batches = 0;
        while self.consume() {
            batches += 1;
        }
        batches
    }
}
