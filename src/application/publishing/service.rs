use std::sync::Arc;

use crate::application::notifications::Notifications;
use crate::application::repos::{ContentStore, ContentTypeRepo, ContentWriteRepo};
use crate::application::scope::{ContentScope, LockRegistry, ScopeContext};
use crate::cache::TreeChangeQueue;

use super::strategy::PublishStrategy;

/// Write workflow for content items: save, publish, move, copy, delete.
#[derive(Clone)]
pub struct ContentService {
    pub(crate) store: Arc<dyn ContentStore>,
    pub(crate) writer: Arc<dyn ContentWriteRepo>,
    pub(crate) types: Arc<dyn ContentTypeRepo>,
    pub(crate) queue: Arc<TreeChangeQueue>,
    pub(crate) notifications: Notifications,
    pub(crate) locks: LockRegistry,
    pub(crate) strategy: PublishStrategy,
}

impl ContentService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        writer: Arc<dyn ContentWriteRepo>,
        types: Arc<dyn ContentTypeRepo>,
        queue: Arc<TreeChangeQueue>,
        notifications: Notifications,
    ) -> Self {
        Self {
            store,
            writer,
            types,
            queue,
            notifications,
            locks: LockRegistry::new(),
            strategy: PublishStrategy,
        }
    }

    pub fn with_locks(mut self, locks: LockRegistry) -> Self {
        self.locks = locks;
        self
    }

    pub fn queue(&self) -> &Arc<TreeChangeQueue> {
        &self.queue
    }

    pub(crate) async fn scope(&self) -> ContentScope {
        let context = ScopeContext {
            store: Arc::clone(&self.store),
            writer: Arc::clone(&self.writer),
            queue: Arc::clone(&self.queue),
            notifications: self.notifications.clone(),
        };
        ContentScope::begin(&self.locks, context).await
    }
}
