//! In-process store, search index and audit log.
//!
//! Backs the operator binary and the test suites. The repository keeps
//! call counters so callers can assert which source answered a lookup.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use async_trait::async_trait;
use slug::slugify;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::application::repos::{
    AuditRepo, CommitBatch, ContentStore, ContentTypeRepo, ContentWriteRepo, RepoError,
    SearchError, SearchFilter, SearchHit, SearchIndex,
};

use crate::cache::lock::mutex_lock;
use crate::cache::values::{RAW_FIELD_PREFIX, to_ticks};
use crate::domain::{
    entities::{AuditLogRecord, ContentEntity, ContentTypeSchema},
    path::ContentPath,
};

const SOURCE: &str = "infra::memory";

#[derive(Default)]
struct StoreState {
    entities: BTreeMap<i32, ContentEntity>,
    types: BTreeMap<i32, ContentTypeSchema>,
    audit: Vec<AuditLogRecord>,
}

pub struct MemoryRepository {
    state: RwLock<StoreState>,
    next_id: AtomicI32,
    store_reads: AtomicUsize,
    commits: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            next_id: AtomicI32::new(1000),
            store_reads: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
        }
    }

    pub async fn insert_type(&self, schema: ContentTypeSchema) {
        self.state.write().await.types.insert(schema.id, schema);
    }

    /// Insert or replace an entity as-is, bypassing the write workflow.
    pub async fn put_entity(&self, entity: ContentEntity) {
        self.next_id.fetch_max(entity.id + 1, Ordering::SeqCst);
        self.state.write().await.entities.insert(entity.id, entity);
    }

    /// An unpublished item with a fixed id, appended after its siblings.
    pub async fn seed_entity(
        &self,
        name: &str,
        id: i32,
        parent: &ContentPath,
        schema: &ContentTypeSchema,
    ) -> ContentEntity {
        let now = OffsetDateTime::now_utc();
        // store dates carry whole seconds only
        let now = now.replace_nanosecond(0).unwrap_or(now);

        let mut entity = ContentEntity::new(name, parent, schema);
        entity.id = id;
        entity.place_under(parent);
        entity.create_date = now;
        entity.update_date = now;
        entity.sort_order = {
            let state = self.state.read().await;
            let siblings = state
                .entities
                .values()
                .filter(|sibling| sibling.parent_id == entity.parent_id)
                .count();
            i32::try_from(siblings).unwrap_or(i32::MAX)
        };

        self.put_entity(entity.clone()).await;
        entity
    }

    /// Direct read that does not count as a store lookup.
    pub async fn entity(&self, id: i32) -> Option<ContentEntity> {
        self.state.read().await.entities.get(&id).cloned()
    }

    pub async fn entity_count(&self) -> usize {
        self.state.read().await.entities.len()
    }

    pub async fn audit_records(&self) -> Vec<AuditLogRecord> {
        self.state.read().await.audit.clone()
    }

    /// Number of [`ContentStore::get`] calls served so far.
    pub fn store_reads(&self) -> usize {
        self.store_reads.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn tree_order(entities: &mut [ContentEntity]) {
    entities.sort_by_key(|entity| (entity.level, entity.sort_order, entity.id));
}

#[async_trait]
impl ContentStore for MemoryRepository {
    async fn get(&self, id: i32) -> Result<Option<ContentEntity>, RepoError> {
        self.store_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.read().await.entities.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[i32]) -> Result<Vec<ContentEntity>, RepoError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.entities.get(id).cloned())
            .collect())
    }

    async fn get_children(&self, parent_id: i32) -> Result<Vec<ContentEntity>, RepoError> {
        let state = self.state.read().await;
        let mut children: Vec<ContentEntity> = state
            .entities
            .values()
            .filter(|entity| entity.parent_id == parent_id)
            .cloned()
            .collect();
        children.sort_by_key(|entity| (entity.sort_order, entity.id));
        Ok(children)
    }

    async fn list_due_for_release(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<ContentEntity>, RepoError> {
        let state = self.state.read().await;
        let mut due: Vec<ContentEntity> = state
            .entities
            .values()
            .filter(|entity| !entity.trashed && entity.release_date.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        tree_order(&mut due);
        Ok(due)
    }

    async fn list_due_for_expiry(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<ContentEntity>, RepoError> {
        let state = self.state.read().await;
        let mut due: Vec<ContentEntity> = state
            .entities
            .values()
            .filter(|entity| {
                entity.is_published() && entity.expire_date.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        tree_order(&mut due);
        Ok(due)
    }
}

#[async_trait]
impl ContentWriteRepo for MemoryRepository {
    async fn next_id(&self) -> Result<i32, RepoError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn commit(&self, batch: CommitBatch) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        for entity in batch.upserts {
            state.entities.insert(entity.id, entity);
        }
        for id in batch.deletes {
            state.entities.remove(&id);
        }
        state.audit.extend(batch.audit);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ContentTypeRepo for MemoryRepository {
    async fn get_by_alias(&self, alias: &str) -> Result<Option<ContentTypeSchema>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .types
            .values()
            .find(|schema| schema.alias == alias)
            .cloned())
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<ContentTypeSchema>, RepoError> {
        Ok(self.state.read().await.types.get(&id).cloned())
    }
}

#[async_trait]
impl AuditRepo for MemoryRepository {
    async fn list_for_content(&self, content_id: i32) -> Result<Vec<AuditLogRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|record| record.content_id == content_id)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AuditLogRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.audit.iter().rev().take(limit).cloned().collect())
    }
}

/// Failure modes a [`MemorySearchIndex`] can be told to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFailure {
    IndexMissing,
    ReaderClosed,
    Unavailable,
    Query,
}

impl IndexFailure {
    fn to_error(self) -> SearchError {
        match self {
            IndexFailure::IndexMissing => SearchError::IndexMissing("segments.gen".to_string()),
            IndexFailure::ReaderClosed => SearchError::ReaderClosed,
            IndexFailure::Unavailable => SearchError::Unavailable,
            IndexFailure::Query => SearchError::Query("unparseable query".to_string()),
        }
    }
}

pub struct MemorySearchIndex {
    documents: RwLock<BTreeMap<i32, SearchHit>>,
    failure: Mutex<Option<IndexFailure>>,
    searches: AtomicUsize,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            failure: Mutex::new(None),
            searches: AtomicUsize::new(0),
        }
    }

    /// Make every following search fail, or recover with `None`.
    pub fn fail_with(&self, failure: Option<IndexFailure>) {
        *mutex_lock(&self.failure, SOURCE, "fail_with") = failure;
    }

    /// Index the entity the way the published-content indexer lays it out.
    pub async fn index_entity(&self, entity: &ContentEntity, schema: &ContentTypeSchema) {
        let mut fields = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            fields.insert(key.to_string(), value);
        };

        put("__NodeId", entity.id.to_string());
        put("__Key", entity.key.to_string());
        put("parentID", entity.parent_id.to_string());
        put("__Path", entity.path.to_string());
        put("sortOrder", entity.sort_order.to_string());
        put("level", entity.level.to_string());
        put("__NodeTypeAlias", entity.content_type_alias.clone());
        put("nodeName", entity.name.clone());
        put("urlName", slugify(&entity.name));
        put("nodeType", entity.content_type_id.to_string());
        if let Some(template_id) = entity.template_id {
            put("template", template_id.to_string());
        }
        put("writerName", entity.writer_name.clone());
        put("writerID", entity.writer_id.to_string());
        put("creatorName", entity.creator_name.clone());
        put("creatorID", entity.creator_id.to_string());
        put("createDate", to_ticks(entity.create_date).to_string());
        put("updateDate", to_ticks(entity.update_date).to_string());

        for property in &schema.property_types {
            let raw = entity
                .properties
                .get(&property.alias)
                .cloned()
                .unwrap_or_default();
            put(&property.alias, escape_markup(&raw));
            put(&format!("{RAW_FIELD_PREFIX}{}", property.alias), raw);
        }

        self.documents
            .write()
            .await
            .insert(entity.id, SearchHit::new(fields));
    }

    pub async fn remove(&self, id: i32) -> bool {
        self.documents.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl Default for MemorySearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn search(&self, filter: &SearchFilter) -> Result<Vec<SearchHit>, SearchError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let failure = *mutex_lock(&self.failure, SOURCE, "search");
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }

        let documents = self.documents.read().await;
        let mut hits: Vec<(i32, i32, SearchHit)> = documents
            .iter()
            .filter(|(_, hit)| filter.matches(hit))
            .map(|(id, hit)| {
                let sort_order = hit
                    .fields
                    .get("sortOrder")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(i32::MAX);
                (sort_order, *id, hit.clone())
            })
            .collect();
        hits.sort_by_key(|(sort_order, id, _)| (*sort_order, *id));
        Ok(hits.into_iter().map(|(_, _, hit)| hit).collect())
    }
}

/// Index text fields store markup-escaped values; the raw variant keeps the source.
fn escape_markup(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
