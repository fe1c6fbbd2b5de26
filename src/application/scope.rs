//! Named locks and the unit-of-work scope used by write operations.
//!
//! A [`ContentScope`] holds the content-tree write lock for its whole
//! lifetime. Reads through the scope see its own staged writes. Nothing
//! reaches the store until [`ContentScope::complete`]; dropping an
//! incomplete scope discards everything it staged.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};

use crate::application::notifications::{ContentNotification, Notifications};
use crate::application::repos::{CommitBatch, ContentStore, ContentWriteRepo, RepoError};
use crate::cache::TreeChangeQueue;
use crate::domain::{
    entities::{AuditLogRecord, ContentEntity},
    path::{ContentPath, RECYCLE_BIN_ID, ROOT_ID},
    types::TreeChangeKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockId {
    ContentTree,
    ContentTypes,
}

#[derive(Clone, Default)]
pub struct LockRegistry {
    content_tree: Arc<RwLock<()>>,
    content_types: Arc<RwLock<()>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, id: LockId) -> Arc<RwLock<()>> {
        match id {
            LockId::ContentTree => Arc::clone(&self.content_tree),
            LockId::ContentTypes => Arc::clone(&self.content_types),
        }
    }

    pub async fn read(&self, id: LockId) -> OwnedRwLockReadGuard<()> {
        self.lock(id).read_owned().await
    }

    pub async fn write(&self, id: LockId) -> OwnedRwLockWriteGuard<()> {
        self.lock(id).write_owned().await
    }
}

/// Everything a scope needs besides its lock.
#[derive(Clone)]
pub struct ScopeContext {
    pub store: Arc<dyn ContentStore>,
    pub writer: Arc<dyn ContentWriteRepo>,
    pub queue: Arc<TreeChangeQueue>,
    pub notifications: Notifications,
}

pub struct ContentScope {
    _guard: OwnedRwLockWriteGuard<()>,
    context: ScopeContext,
    staged: BTreeMap<i32, ContentEntity>,
    deleted: BTreeSet<i32>,
    audit: Vec<AuditLogRecord>,
    changes: Vec<(i32, ContentPath, TreeChangeKind)>,
    deferred: Vec<ContentNotification>,
    completed: bool,
}

impl ContentScope {
    pub async fn begin(locks: &LockRegistry, context: ScopeContext) -> Self {
        let guard = locks.write(LockId::ContentTree).await;
        Self {
            _guard: guard,
            context,
            staged: BTreeMap::new(),
            deleted: BTreeSet::new(),
            audit: Vec::new(),
            changes: Vec::new(),
            deferred: Vec::new(),
            completed: false,
        }
    }

    pub async fn get(&self, id: i32) -> Result<Option<ContentEntity>, RepoError> {
        if self.deleted.contains(&id) {
            return Ok(None);
        }
        if let Some(entity) = self.staged.get(&id) {
            return Ok(Some(entity.clone()));
        }
        self.context.store.get(id).await
    }

    /// Direct children ordered by sort order.
    pub async fn children(&self, parent_id: i32) -> Result<Vec<ContentEntity>, RepoError> {
        let mut children: BTreeMap<i32, ContentEntity> = self
            .context
            .store
            .get_children(parent_id)
            .await?
            .into_iter()
            .map(|entity| (entity.id, entity))
            .collect();

        for (id, entity) in &self.staged {
            if entity.parent_id == parent_id {
                children.insert(*id, entity.clone());
            } else {
                children.remove(id);
            }
        }
        children.retain(|id, _| !self.deleted.contains(id));

        let mut children: Vec<_> = children.into_values().collect();
        children.sort_by_key(|entity| (entity.sort_order, entity.id));
        Ok(children)
    }

    /// Descendants of `id`, parents before children.
    pub async fn descendants(&self, id: i32) -> Result<Vec<ContentEntity>, RepoError> {
        let mut found = Vec::new();
        let mut pending = VecDeque::from([id]);
        while let Some(parent_id) = pending.pop_front() {
            for child in self.children(parent_id).await? {
                pending.push_back(child.id);
                found.push(child);
            }
        }
        Ok(found)
    }

    /// Path of `parent_id`; the root and the recycle bin have fixed paths.
    pub async fn parent_path(&self, parent_id: i32) -> Result<Option<ContentPath>, RepoError> {
        if parent_id == ROOT_ID {
            return Ok(Some(ContentPath::root()));
        }
        if parent_id == RECYCLE_BIN_ID {
            return Ok(Some(ContentPath::recycle_bin()));
        }
        Ok(self.get(parent_id).await?.map(|parent| parent.path))
    }

    pub async fn next_id(&self) -> Result<i32, RepoError> {
        self.context.writer.next_id().await
    }

    pub fn stage(&mut self, entity: ContentEntity) {
        self.deleted.remove(&entity.id);
        self.staged.insert(entity.id, entity);
    }

    pub fn stage_delete(&mut self, id: i32) {
        self.staged.remove(&id);
        self.deleted.insert(id);
    }

    pub fn record_audit(&mut self, record: AuditLogRecord) {
        self.audit.push(record);
    }

    pub fn push_change(&mut self, content_id: i32, path: ContentPath, kind: TreeChangeKind) {
        self.changes.push((content_id, path, kind));
    }

    /// Queue a post-action notification for after the commit.
    pub fn defer(&mut self, notification: ContentNotification) {
        self.deferred.push(notification);
    }

    pub fn notifications(&self) -> &Notifications {
        &self.context.notifications
    }

    /// Settle transient states, commit, then publish tree changes and notifications.
    pub async fn complete(mut self) -> Result<Vec<ContentEntity>, RepoError> {
        let mut upserts: Vec<ContentEntity> = std::mem::take(&mut self.staged).into_values().collect();
        for entity in &mut upserts {
            entity.settle();
        }

        let batch = CommitBatch {
            upserts: upserts.clone(),
            deletes: self.deleted.iter().copied().collect(),
            audit: std::mem::take(&mut self.audit),
        };
        if !batch.is_empty() {
            self.context.writer.commit(batch).await?;
        }
        self.completed = true;

        for (content_id, path, kind) in std::mem::take(&mut self.changes) {
            self.context.queue.publish(content_id, path, kind);
        }
        for notification in std::mem::take(&mut self.deferred) {
            self.context.notifications.dispatch(notification);
        }

        info!(
            upserts = upserts.len(),
            deletes = self.deleted.len(),
            "Content scope committed"
        );
        Ok(upserts)
    }
}

impl Drop for ContentScope {
    fn drop(&mut self) {
        if !self.completed && !(self.staged.is_empty() && self.deleted.is_empty()) {
            debug!(
                staged = self.staged.len(),
                deleted = self.deleted.len(),
                "Content scope dropped without completing; changes discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{entities::ContentTypeSchema, types::PublishState};
    use crate::infra::memory::MemoryRepository;

    use super::*;

    fn schema() -> ContentTypeSchema {
        ContentTypeSchema {
            id: 1,
            alias: "page".to_string(),
            property_types: Vec::new(),
        }
    }

    async fn setup() -> (Arc<MemoryRepository>, LockRegistry, ScopeContext) {
        let repo = Arc::new(MemoryRepository::new());
        repo.insert_type(schema()).await;
        let home = repo
            .seed_entity("Home", 10, &ContentPath::root(), &schema())
            .await;
        repo.seed_entity("About", 42, &home.path, &schema()).await;
        let context = ScopeContext {
            store: repo.clone(),
            writer: repo.clone(),
            queue: Arc::new(TreeChangeQueue::new()),
            notifications: Notifications::new(),
        };
        (repo, LockRegistry::new(), context)
    }

    #[tokio::test]
    async fn dropped_scope_persists_nothing() {
        let (repo, locks, context) = setup().await;
        {
            let mut scope = ContentScope::begin(&locks, context.clone()).await;
            let mut entity = scope.get(42).await.expect("get").expect("exists");
            entity.name = "Changed".to_string();
            scope.stage(entity);
            scope.push_change(42, "-1,10,42".parse().expect("path"), TreeChangeKind::RefreshNode);
        }

        assert_eq!(repo.entity(42).await.expect("exists").name, "About");
        assert_eq!(repo.commit_count(), 0);
        assert!(context.queue.is_empty());
    }

    #[tokio::test]
    async fn complete_settles_transient_states() {
        let (repo, locks, context) = setup().await;
        let mut scope = ContentScope::begin(&locks, context.clone()).await;
        let mut entity = scope.get(42).await.expect("get").expect("exists");
        entity.publish_state = PublishState::Publishing;
        scope.stage(entity);
        scope.push_change(42, "-1,10,42".parse().expect("path"), TreeChangeKind::RefreshNode);

        let committed = scope.complete().await.expect("commit");

        assert_eq!(committed[0].publish_state, PublishState::Published);
        let stored = repo.entity(42).await.expect("exists");
        assert_eq!(stored.publish_state, PublishState::Published);
        assert_eq!(stored.published_version_id, stored.version_id);
        assert_eq!(context.queue.len(), 1);
    }

    #[tokio::test]
    async fn reads_see_staged_moves_and_deletes() {
        let (_repo, locks, context) = setup().await;
        let mut scope = ContentScope::begin(&locks, context).await;

        let mut about = scope.get(42).await.expect("get").expect("exists");
        about.place_under(&ContentPath::root());
        scope.stage(about);
        assert!(scope.children(10).await.expect("children").is_empty());
        assert_eq!(scope.children(ROOT_ID).await.expect("children").len(), 2);

        scope.stage_delete(10);
        assert!(scope.get(10).await.expect("get").is_none());
        assert_eq!(scope.descendants(ROOT_ID).await.expect("descendants").len(), 1);
    }

    #[tokio::test]
    async fn write_lock_serialises_scopes() {
        let (_repo, locks, context) = setup().await;
        let scope = ContentScope::begin(&locks, context.clone()).await;

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            ContentScope::begin(&locks, context),
        )
        .await;
        assert!(pending.is_err());
        drop(scope);
    }
}
