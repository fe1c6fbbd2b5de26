//! Tree changes raised when a content scope commits.
//!
//! Changes are queued in commit order and drained by the cache consumer.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::domain::{path::ContentPath, types::TreeChangeKind};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_QUEUE_LEN: &str = "arbor_tree_change_queue_len";

/// Monotonic sequence number assigned at enqueue time.
pub type Epoch = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeChange {
    pub id: Uuid,
    pub epoch: Epoch,
    pub content_id: i32,
    pub path: ContentPath,
    pub kind: TreeChangeKind,
    pub timestamp: OffsetDateTime,
}

impl TreeChange {
    pub fn new(content_id: i32, path: ContentPath, kind: TreeChangeKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            content_id,
            path,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

pub struct TreeChangeQueue {
    queue: Mutex<VecDeque<TreeChange>>,
    epoch_counter: AtomicU64,
}

impl TreeChangeQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, content_id: i32, path: ContentPath, kind: TreeChangeKind) {
        let change = TreeChange::new(content_id, path, kind, self.next_epoch());

        info!(
            change_id = %change.id,
            change_epoch = change.epoch,
            content_id,
            change_kind = kind.as_str(),
            "Tree change enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(change);
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
    }

    /// Up to `limit` changes in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<TreeChange> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained: Vec<TreeChange> = queue.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    /// Copy of the pending changes, oldest first.
    pub fn pending(&self) -> Vec<TreeChange> {
        mutex_lock(&self.queue, SOURCE, "pending")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TreeChangeQueue {
    fn default() -> Self {
        Self::new()
    }
}
