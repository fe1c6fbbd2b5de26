//! Publish and unpublish guards.
//!
//! Guards never fail with an error for business reasons; a refused
//! transition is reported as a failed [`PublishOutcome`].

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::notifications::ContentEvent;
use crate::application::repos::{ContentStore, RepoError};
use crate::application::scope::ContentScope;
use crate::domain::{
    entities::ContentEntity,
    types::{ContentStatus, PublishState},
};

use super::types::{PublishOutcome, PublishResult};

/// Point reads used by the path checks.
#[async_trait]
pub trait ContentLookup: Send + Sync {
    async fn lookup(&self, id: i32) -> Result<Option<ContentEntity>, RepoError>;
}

#[async_trait]
impl ContentLookup for ContentScope {
    async fn lookup(&self, id: i32) -> Result<Option<ContentEntity>, RepoError> {
        self.get(id).await
    }
}

#[async_trait]
impl ContentLookup for dyn ContentStore {
    async fn lookup(&self, id: i32) -> Result<Option<ContentEntity>, RepoError> {
        self.get(id).await
    }
}

/// The item and every ancestor are published and outside the recycle bin.
pub async fn is_path_published(
    lookup: &(impl ContentLookup + ?Sized),
    entity: &ContentEntity,
) -> Result<bool, RepoError> {
    if !entity.is_published() || entity.trashed {
        return Ok(false);
    }
    for ancestor_id in entity.path.ancestor_ids() {
        match lookup.lookup(*ancestor_id).await? {
            Some(ancestor) if ancestor.is_published() && !ancestor.trashed => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Whether publishing the item would make it reachable.
pub async fn is_path_publishable(
    lookup: &(impl ContentLookup + ?Sized),
    entity: &ContentEntity,
) -> Result<bool, RepoError> {
    if entity.is_root() {
        return Ok(true);
    }
    if entity.trashed {
        return Ok(false);
    }
    match lookup.lookup(entity.parent_id).await? {
        None => Ok(false),
        Some(parent) => is_path_published(lookup, &parent).await,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PublishStrategy;

impl PublishStrategy {
    /// Checks run in a fixed order: cancellation, publishable values,
    /// schedule and trash status, then (optionally) the ancestor path.
    pub async fn can_publish(
        &self,
        scope: &ContentScope,
        content: &ContentEntity,
        check_path: bool,
        now: OffsetDateTime,
    ) -> Result<PublishResult, RepoError> {
        let refuse = |outcome: PublishOutcome| -> Result<PublishResult, RepoError> {
            debug!(
                content_id = content.id,
                outcome = outcome.as_str(),
                "Publish refused"
            );
            Ok(PublishResult::new(outcome, content.clone()))
        };

        let notification = scope
            .notifications()
            .raise_cancellable(ContentEvent::Publishing, vec![content.clone()]);
        if notification.is_cancelled() {
            return refuse(PublishOutcome::FailedCancelledByEvent);
        }

        if content.publish_state != PublishState::Publishing && content.published_version_id == 0
        {
            return refuse(PublishOutcome::FailedNoPublishedValues);
        }

        match content.status(now) {
            ContentStatus::Expired => return refuse(PublishOutcome::FailedHasExpired),
            ContentStatus::AwaitingRelease => {
                return refuse(PublishOutcome::FailedAwaitingRelease);
            }
            ContentStatus::Trashed => return refuse(PublishOutcome::FailedIsTrashed),
            ContentStatus::Published | ContentStatus::Unpublished => {}
        }

        if check_path && !is_path_publishable(scope, content).await? {
            return refuse(PublishOutcome::FailedPathNotPublished);
        }

        Ok(PublishResult::new(
            PublishOutcome::SuccessPublish,
            content.clone(),
        ))
    }

    pub fn publish(&self, content: &mut ContentEntity) -> PublishOutcome {
        content.publish_state = PublishState::Publishing;
        PublishOutcome::SuccessPublish
    }

    pub fn can_unpublish(&self, scope: &ContentScope, content: &ContentEntity) -> PublishResult {
        let notification = scope
            .notifications()
            .raise_cancellable(ContentEvent::Unpublishing, vec![content.clone()]);
        if notification.is_cancelled() {
            return PublishResult::new(PublishOutcome::FailedCancelledByEvent, content.clone());
        }
        PublishResult::new(PublishOutcome::SuccessUnpublish, content.clone())
    }

    /// Also clears a release date that is already due.
    pub fn unpublish(&self, content: &mut ContentEntity, now: OffsetDateTime) -> PublishOutcome {
        if content.release_date.is_some_and(|release| release <= now) {
            content.release_date = None;
        }
        content.publish_state = PublishState::Unpublishing;
        PublishOutcome::SuccessUnpublish
    }
}
