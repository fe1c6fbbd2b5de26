use serde::Serialize;
use thiserror::Error;

use crate::{
    application::repos::RepoError,
    domain::{entities::ContentEntity, error::DomainError},
};

#[derive(Debug, Error)]
pub enum ContentServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ContentServiceError {
    pub fn not_found(id: i32) -> Self {
        Self::Domain(DomainError::not_found(id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(message))
    }
}

/// Sort order for an item appended after `sibling_count` siblings.
pub fn next_sort_order(sibling_count: usize) -> Result<i32, ContentServiceError> {
    i32::try_from(sibling_count).map_err(|_| {
        ContentServiceError::validation(format!(
            "{sibling_count} siblings exceed the sort order range"
        ))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    SuccessPublish,
    SuccessPublishAlready,
    SuccessUnpublish,
    SuccessUnpublishAlready,
    FailedCancelledByEvent,
    FailedNoPublishedValues,
    FailedHasExpired,
    FailedAwaitingRelease,
    FailedIsTrashed,
    FailedPathNotPublished,
}

impl PublishOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishOutcome::SuccessPublish => "success_publish",
            PublishOutcome::SuccessPublishAlready => "success_publish_already",
            PublishOutcome::SuccessUnpublish => "success_unpublish",
            PublishOutcome::SuccessUnpublishAlready => "success_unpublish_already",
            PublishOutcome::FailedCancelledByEvent => "failed_cancelled_by_event",
            PublishOutcome::FailedNoPublishedValues => "failed_no_published_values",
            PublishOutcome::FailedHasExpired => "failed_has_expired",
            PublishOutcome::FailedAwaitingRelease => "failed_awaiting_release",
            PublishOutcome::FailedIsTrashed => "failed_is_trashed",
            PublishOutcome::FailedPathNotPublished => "failed_path_not_published",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            PublishOutcome::SuccessPublish
                | PublishOutcome::SuccessPublishAlready
                | PublishOutcome::SuccessUnpublish
                | PublishOutcome::SuccessUnpublishAlready
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishResult {
    pub outcome: PublishOutcome,
    pub content: ContentEntity,
}

impl PublishResult {
    pub fn new(outcome: PublishOutcome, content: ContentEntity) -> Self {
        Self { outcome, content }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Outcome of save, move, copy and delete operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    Success,
    FailedCancelledByEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub outcome: OperationOutcome,
    /// Entities written by the operation, the primary item first.
    pub affected: Vec<ContentEntity>,
}

impl OperationResult {
    pub fn success(affected: Vec<ContentEntity>) -> Self {
        Self {
            outcome: OperationOutcome::Success,
            affected,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            outcome: OperationOutcome::FailedCancelledByEvent,
            affected: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == OperationOutcome::Success
    }

    pub fn primary(&self) -> Option<&ContentEntity> {
        self.affected.first()
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PublishSnapshot<'a> {
    pub name: &'a str,
    pub path: String,
    pub version_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MoveSnapshot {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CopySnapshot {
    pub original_id: i32,
    pub copy_id: i32,
    pub recursive: bool,
}
