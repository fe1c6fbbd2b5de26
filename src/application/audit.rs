use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{AuditRepo, RepoError};
use crate::domain::entities::{AuditAction, AuditLogRecord};

/// Builds audit records for content operations and reads them back.
#[derive(Clone)]
pub struct ContentAuditService {
    repo: Arc<dyn AuditRepo>,
}

impl ContentAuditService {
    pub fn new(repo: Arc<dyn AuditRepo>) -> Self {
        Self { repo }
    }

    pub async fn list_for_content(&self, content_id: i32) -> Result<Vec<AuditLogRecord>, RepoError> {
        self.repo.list_for_content(content_id).await
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<AuditLogRecord>, RepoError> {
        self.repo.list_recent(limit).await
    }
}

/// Record staged alongside the entity rows it describes.
pub fn audit_entry<S>(
    user_id: i32,
    action: AuditAction,
    content_id: i32,
    message: impl Into<String>,
    payload: Option<&S>,
) -> Result<AuditLogRecord, RepoError>
where
    S: Serialize,
{
    let payload_text = match payload {
        Some(value) => Some(serde_json::to_string(value).map_err(RepoError::from_persistence)?),
        None => None,
    };

    Ok(AuditLogRecord {
        id: Uuid::new_v4(),
        user_id,
        action,
        content_id,
        message: message.into(),
        payload_text,
        created_at: OffsetDateTime::now_utc(),
    })
}
