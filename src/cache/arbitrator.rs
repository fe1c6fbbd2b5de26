//! Decides which read source answers a content lookup.
//!
//! Lookups go memoizer → search index → authoritative store. Index
//! infrastructure failures fall through to the store; a query error is
//! surfaced to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::future::try_join_all;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::application::repos::{
    ContentStore, ContentTypeRepo, RepoError, SearchError, SearchFilter, SearchHit, SearchIndex,
};
use crate::domain::{document::DocumentNode, entities::ContentEntity, path::ContentPath};

use super::config::CacheConfig;
use super::extract;
use super::memo::Memoizer;
use super::node::{NodeResolver, PublishedNode};
use super::values::{CacheValues, ValuesError, fields};

const METRIC_INDEX_FALLBACK: &str = "arbor_index_fallback_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Values(#[from] ValuesError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("content type `{alias}` is not registered")]
    UnknownContentType { alias: String },
}

struct Inner {
    store: Arc<dyn ContentStore>,
    types: Arc<dyn ContentTypeRepo>,
    index: Option<Arc<dyn SearchIndex>>,
    memo: Memoizer,
    index_misses: AtomicU32,
    index_miss_warn_threshold: u32,
}

/// Cheap to clone; clones share the memoizer and the miss counter.
#[derive(Clone)]
pub struct SourceArbitrator {
    inner: Arc<Inner>,
}

impl SourceArbitrator {
    pub fn new(
        config: &CacheConfig,
        store: Arc<dyn ContentStore>,
        types: Arc<dyn ContentTypeRepo>,
        index: Option<Arc<dyn SearchIndex>>,
    ) -> Self {
        Self::with_memoizer(config, Memoizer::from_config(config), store, types, index)
    }

    pub fn with_memoizer(
        config: &CacheConfig,
        memo: Memoizer,
        store: Arc<dyn ContentStore>,
        types: Arc<dyn ContentTypeRepo>,
        index: Option<Arc<dyn SearchIndex>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                types,
                index,
                memo,
                index_misses: AtomicU32::new(0),
                index_miss_warn_threshold: config.index_miss_warn_threshold,
            }),
        }
    }

    /// Published node for `id`, or `None` when no source has it.
    #[instrument(skip(self))]
    pub async fn resolve(&self, id: i32) -> Result<Option<Arc<PublishedNode>>, CacheError> {
        match self.resolve_values(id).await? {
            Some(values) => self.node_from_values(values).await.map(Some),
            None => Ok(None),
        }
    }

    /// Nodes for every id that resolves, in input order.
    pub async fn resolve_many(&self, ids: &[i32]) -> Result<Vec<Arc<PublishedNode>>, CacheError> {
        let resolved = try_join_all(ids.iter().map(|id| self.resolve(*id))).await?;
        Ok(resolved.into_iter().flatten().collect())
    }

    pub async fn resolve_values(&self, id: i32) -> Result<Option<Arc<CacheValues>>, CacheError> {
        if id <= 0 {
            return Ok(None);
        }
        self.inner
            .memo
            .get_or_compute(id, move || self.load_values(id))
            .await
    }

    /// Node for an element of the structured document tree.
    pub async fn from_document(
        &self,
        element: &Arc<DocumentNode>,
    ) -> Result<Arc<PublishedNode>, CacheError> {
        self.node_from_values(Arc::new(extract::from_document(element)))
            .await
    }

    pub async fn node_from_values(
        &self,
        values: Arc<CacheValues>,
    ) -> Result<Arc<PublishedNode>, CacheError> {
        let alias = values.require(&fields::TYPE_ALIAS)?;
        let schema = self
            .inner
            .types
            .get_by_alias(alias)
            .await?
            .ok_or_else(|| CacheError::UnknownContentType {
                alias: alias.to_string(),
            })?;
        let resolver: Arc<dyn NodeResolver> = Arc::new(self.clone());
        let node = PublishedNode::new(values, &schema, resolver)?;
        Ok(Arc::new(node))
    }

    /// Evict `id` and its memoized descendants.
    pub fn clear(&self, id: i32) -> usize {
        self.inner.memo.clear(id)
    }

    pub fn clear_key(&self, id: i32) -> bool {
        self.inner.memo.clear_key(id)
    }

    /// Store fallbacks seen so far, saturating at the warning threshold.
    pub fn index_miss_count(&self) -> u32 {
        self.inner.index_misses.load(Ordering::Relaxed)
    }

    async fn load_values(&self, id: i32) -> Result<Option<Arc<CacheValues>>, CacheError> {
        let index_consulted = match &self.inner.index {
            Some(index) => {
                let filter =
                    SearchFilter::by_id(id).excluding_path_prefix(ContentPath::recycle_bin_prefix());
                if let Some(hits) = search_or_fall_back(index.as_ref(), &filter).await?
                    && let Some(hit) = hits.first()
                {
                    return Ok(Some(Arc::new(extract::from_search_hit(hit))));
                }
                true
            }
            None => false,
        };

        let Some(entity) = self.inner.store.get(id).await? else {
            return Ok(None);
        };
        if entity.trashed {
            return Ok(None);
        }
        if index_consulted {
            self.record_index_miss(id);
        }
        self.values_from_entity(&entity).await.map(Some)
    }

    async fn values_from_entity(
        &self,
        entity: &ContentEntity,
    ) -> Result<Arc<CacheValues>, CacheError> {
        let schema = self
            .inner
            .types
            .get_by_alias(&entity.content_type_alias)
            .await?
            .ok_or_else(|| CacheError::UnknownContentType {
                alias: entity.content_type_alias.clone(),
            })?;
        Ok(Arc::new(extract::from_entity(entity, &schema)))
    }

    fn record_index_miss(&self, id: i32) {
        counter!(METRIC_INDEX_FALLBACK).increment(1);

        let threshold = self.inner.index_miss_warn_threshold;
        let previous = self
            .inner
            .index_misses
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                (count < threshold).then_some(count + 1)
            });
        if let Ok(previous) = previous {
            debug!(content_id = id, misses = previous + 1, "Content served from store");
            if previous + 1 == threshold {
                warn!(
                    content_id = id,
                    threshold,
                    "Search index keeps missing content the store has; the index may need a rebuild"
                );
            }
        }
    }

    async fn children_from_store(
        &self,
        parent_id: i32,
    ) -> Result<Vec<Arc<PublishedNode>>, CacheError> {
        let entities = self.inner.store.get_children(parent_id).await?;
        let mut children = Vec::with_capacity(entities.len());
        for entity in entities.iter().filter(|entity| !entity.trashed) {
            let values = self.values_from_entity(entity).await?;
            children.push(self.node_from_values(values).await?);
        }
        Ok(children)
    }

    async fn children_from_hits(
        &self,
        hits: &[SearchHit],
    ) -> Result<Vec<Arc<PublishedNode>>, CacheError> {
        let mut children = Vec::with_capacity(hits.len());
        for hit in hits {
            let values = Arc::new(extract::from_search_hit(hit));
            children.push(self.node_from_values(values).await?);
        }
        Ok(children)
    }
}

/// `Ok(None)` when the index is unusable and the store should answer instead.
async fn search_or_fall_back(
    index: &dyn SearchIndex,
    filter: &SearchFilter,
) -> Result<Option<Vec<SearchHit>>, SearchError> {
    match index.search(filter).await {
        Ok(hits) => Ok(Some(hits)),
        Err(err) if err.is_recoverable() => {
            debug!(error = %err, "Search index unavailable; falling back to store");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[async_trait]
impl NodeResolver for SourceArbitrator {
    async fn resolve_parent(
        &self,
        node: &PublishedNode,
    ) -> Result<Option<Arc<PublishedNode>>, CacheError> {
        self.resolve(node.parent_id()).await
    }

    async fn resolve_children(
        &self,
        node: &PublishedNode,
    ) -> Result<Vec<Arc<PublishedNode>>, CacheError> {
        if let Some(document) = node.values().document() {
            let mut children = Vec::new();
            for element in document.doc_children() {
                children.push(self.from_document(element).await?);
            }
            return Ok(children);
        }

        if let Some(index) = &self.inner.index {
            let filter = SearchFilter::by_parent(node.id())
                .excluding_path_prefix(ContentPath::recycle_bin_prefix());
            // an empty result is an answer, not a miss
            if let Some(hits) = search_or_fall_back(index.as_ref(), &filter).await? {
                return self.children_from_hits(&hits).await;
            }
        }

        self.children_from_store(node.id()).await
    }
}
