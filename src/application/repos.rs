//! Collaborator traits describing the store, the search index and the audit log.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::cache::values::{Field, fields};
use crate::domain::entities::{AuditLogRecord, ContentEntity, ContentTypeSchema};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("conflicting write: {message}")]
    Conflict { message: String },
    #[error("store timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search index files are missing: {0}")]
    IndexMissing(String),
    #[error("search index reader was closed")]
    ReaderClosed,
    #[error("search index is not initialised")]
    Unavailable,
    #[error("search query failed: {0}")]
    Query(String),
}

impl SearchError {
    /// Failures that mean "ask the store instead" rather than "give up".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SearchError::IndexMissing(_) | SearchError::ReaderClosed | SearchError::Unavailable
        )
    }
}

/// One index result: a flat field dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHit {
    pub fields: BTreeMap<String, String>,
}

impl SearchHit {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn field(&self, field: &Field) -> Option<&str> {
        field
            .aliases
            .iter()
            .find_map(|alias| self.fields.get(*alias).map(String::as_str))
    }
}

/// `field == value AND path NOT LIKE prefix*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub field: Field,
    pub value: String,
    pub exclude_path_prefix: Option<String>,
}

impl SearchFilter {
    pub fn by_id(id: i32) -> Self {
        Self {
            field: fields::ID,
            value: id.to_string(),
            exclude_path_prefix: None,
        }
    }

    pub fn by_parent(parent_id: i32) -> Self {
        Self {
            field: fields::PARENT_ID,
            value: parent_id.to_string(),
            exclude_path_prefix: None,
        }
    }

    pub fn excluding_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_path_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, hit: &SearchHit) -> bool {
        if hit.field(&self.field) != Some(self.value.as_str()) {
            return false;
        }
        match (&self.exclude_path_prefix, hit.field(&fields::PATH)) {
            (Some(prefix), Some(path)) => !path_has_prefix(path, prefix),
            _ => true,
        }
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(','))
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, filter: &SearchFilter) -> Result<Vec<SearchHit>, SearchError>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(&self, id: i32) -> Result<Option<ContentEntity>, RepoError>;

    async fn get_many(&self, ids: &[i32]) -> Result<Vec<ContentEntity>, RepoError>;

    async fn get_children(&self, parent_id: i32) -> Result<Vec<ContentEntity>, RepoError>;

    /// Untrashed items whose release date is at or before `now`.
    async fn list_due_for_release(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<ContentEntity>, RepoError>;

    /// Published items whose expire date is at or before `now`.
    async fn list_due_for_expiry(&self, now: OffsetDateTime)
    -> Result<Vec<ContentEntity>, RepoError>;
}

/// Everything one scope persists, applied atomically.
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    pub upserts: Vec<ContentEntity>,
    pub deletes: Vec<i32>,
    pub audit: Vec<AuditLogRecord>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty() && self.audit.is_empty()
    }
}

#[async_trait]
pub trait ContentWriteRepo: Send + Sync {
    /// Reserve an identifier for a new item.
    async fn next_id(&self) -> Result<i32, RepoError>;

    async fn commit(&self, batch: CommitBatch) -> Result<(), RepoError>;
}

#[async_trait]
pub trait ContentTypeRepo: Send + Sync {
    async fn get_by_alias(&self, alias: &str) -> Result<Option<ContentTypeSchema>, RepoError>;

    async fn get_by_id(&self, id: i32) -> Result<Option<ContentTypeSchema>, RepoError>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn list_for_content(&self, content_id: i32) -> Result<Vec<AuditLogRecord>, RepoError>;

    async fn list_recent(&self, limit: usize) -> Result<Vec<AuditLogRecord>, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(pairs: &[(&str, &str)]) -> SearchHit {
        SearchHit::new(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    #[test]
    fn filter_excludes_recycle_bin_paths() {
        let filter = SearchFilter::by_id(42).excluding_path_prefix("-1,-20");

        assert!(filter.matches(&hit(&[("__NodeId", "42"), ("__Path", "-1,10,42")])));
        assert!(!filter.matches(&hit(&[("__NodeId", "42"), ("__Path", "-1,-20,42")])));
        assert!(!filter.matches(&hit(&[("__NodeId", "43"), ("__Path", "-1,10,43")])));
    }

    #[test]
    fn prefix_match_respects_segment_boundaries() {
        assert!(path_has_prefix("-1,-20,5", "-1,-20"));
        assert!(!path_has_prefix("-1,-200,5", "-1,-20"));
    }

    #[test]
    fn only_infrastructure_failures_are_recoverable() {
        assert!(SearchError::ReaderClosed.is_recoverable());
        assert!(SearchError::IndexMissing("segments_1".to_string()).is_recoverable());
        assert!(SearchError::Unavailable.is_recoverable());
        assert!(!SearchError::Query("syntax".to_string()).is_recoverable());
    }
}
