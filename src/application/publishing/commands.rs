use std::collections::BTreeSet;

use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::application::audit::audit_entry;
use crate::application::notifications::{ContentEvent, ContentNotification};
use crate::application::scope::ContentScope;
use crate::domain::{
    entities::{AuditAction, ContentEntity},
    types::{PublishState, TreeChangeKind},
};

use super::service::ContentService;
use super::types::{
    ContentServiceError, OperationResult, PublishOutcome, PublishResult, PublishSnapshot,
    next_sort_order,
};

fn snapshot(entity: &ContentEntity) -> PublishSnapshot<'_> {
    PublishSnapshot {
        name: entity.name.as_str(),
        path: entity.path.to_string(),
        version_id: entity.version_id,
    }
}

fn settled(entity: &ContentEntity) -> ContentEntity {
    let mut entity = entity.clone();
    entity.settle();
    entity
}

impl ContentService {
    /// Persist a draft without changing its publish state.
    #[instrument(skip(self, content), fields(content_id = content.id))]
    pub async fn save(
        &self,
        content: ContentEntity,
        user_id: i32,
    ) -> Result<OperationResult, ContentServiceError> {
        let now = OffsetDateTime::now_utc();
        let mut scope = self.scope().await;

        let saving = scope
            .notifications()
            .raise_cancellable(ContentEvent::Saving, vec![content.clone()]);
        if saving.is_cancelled() {
            return Ok(OperationResult::cancelled());
        }

        let previous = self.previous_version(&scope, &content).await?;
        let mut entity = content;
        self.prepare_for_save(&scope, &mut entity, previous.as_ref(), user_id, now)
            .await?;
        self.stage_save(&mut scope, entity.clone(), user_id)?;
        scope.complete().await?;

        info!(content_id = entity.id, "Content saved");
        Ok(OperationResult::success(vec![entity]))
    }

    /// Save, then publish if the guards allow it. A refused publish still
    /// persists the draft.
    #[instrument(skip(self, content), fields(content_id = content.id))]
    pub async fn save_and_publish(
        &self,
        content: ContentEntity,
        user_id: i32,
    ) -> Result<PublishResult, ContentServiceError> {
        let now = OffsetDateTime::now_utc();
        let mut scope = self.scope().await;

        let previous = self.previous_version(&scope, &content).await?;
        if let Some(previous) = &previous
            && previous.publish_state == PublishState::Published
            && !previous.edited
            && *previous == content
        {
            return Ok(PublishResult::new(
                PublishOutcome::SuccessPublishAlready,
                content,
            ));
        }

        let saving = scope
            .notifications()
            .raise_cancellable(ContentEvent::Saving, vec![content.clone()]);
        if saving.is_cancelled() {
            return Ok(PublishResult::new(
                PublishOutcome::FailedCancelledByEvent,
                content,
            ));
        }

        let mut entity = content;
        self.prepare_for_save(&scope, &mut entity, previous.as_ref(), user_id, now)
            .await?;
        let was_published = previous.as_ref().is_some_and(ContentEntity::is_published);

        let mut candidate = entity.clone();
        candidate.publish_state = PublishState::Publishing;
        let check = self
            .strategy
            .can_publish(&scope, &candidate, true, now)
            .await?;
        if !check.is_success() {
            self.stage_save(&mut scope, entity.clone(), user_id)?;
            scope.complete().await?;
            return Ok(PublishResult::new(check.outcome, entity));
        }

        self.strategy.publish(&mut candidate);
        scope.stage(candidate.clone());
        scope.record_audit(audit_entry(
            user_id,
            AuditAction::Publish,
            candidate.id,
            "Content saved and published",
            Some(&snapshot(&candidate)),
        )?);

        let kind = if was_published {
            TreeChangeKind::RefreshNode
        } else {
            TreeChangeKind::RefreshBranch
        };
        scope.push_change(candidate.id, candidate.path.clone(), kind);

        let published = settled(&candidate);
        let mut exposed = vec![published.clone()];
        if !was_published {
            exposed.extend(self.reexposed_descendants(&scope, candidate.id).await?);
        }
        scope.defer(ContentNotification::new(
            ContentEvent::Saved,
            vec![published.clone()],
        ));
        scope.defer(ContentNotification::new(ContentEvent::Published, exposed));
        scope.complete().await?;

        info!(content_id = published.id, was_published, "Content published");
        Ok(PublishResult::new(PublishOutcome::SuccessPublish, published))
    }

    #[instrument(skip(self))]
    pub async fn unpublish(
        &self,
        id: i32,
        user_id: i32,
    ) -> Result<PublishResult, ContentServiceError> {
        self.unpublish_item(id, user_id, false).await
    }

    pub(crate) async fn unpublish_item(
        &self,
        id: i32,
        user_id: i32,
        clear_expire_date: bool,
    ) -> Result<PublishResult, ContentServiceError> {
        let now = OffsetDateTime::now_utc();
        let mut scope = self.scope().await;
        let mut entity = scope
            .get(id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(id))?;

        if !entity.is_published() {
            return Ok(PublishResult::new(
                PublishOutcome::SuccessUnpublishAlready,
                entity,
            ));
        }

        let check = self.strategy.can_unpublish(&scope, &entity);
        if !check.is_success() {
            return Ok(check);
        }

        if clear_expire_date {
            entity.expire_date = None;
        }
        self.strategy.unpublish(&mut entity, now);
        entity.update_date = now;
        entity.writer_id = user_id;

        scope.stage(entity.clone());
        scope.record_audit(audit_entry(
            user_id,
            AuditAction::Unpublish,
            entity.id,
            "Content unpublished",
            Some(&snapshot(&entity)),
        )?);
        scope.push_change(entity.id, entity.path.clone(), TreeChangeKind::RefreshBranch);

        let unpublished = settled(&entity);
        scope.defer(ContentNotification::new(
            ContentEvent::Unpublished,
            vec![unpublished.clone()],
        ));
        scope.complete().await?;

        info!(content_id = id, "Content unpublished");
        Ok(PublishResult::new(
            PublishOutcome::SuccessUnpublish,
            unpublished,
        ))
    }

    /// Publish `id` and its descendants, parents first.
    ///
    /// Unpublished descendants are only published when `force` is set. A
    /// descendant that is skipped or refused excludes its whole subtree.
    #[instrument(skip(self))]
    pub async fn publish_branch(
        &self,
        id: i32,
        force: bool,
        user_id: i32,
    ) -> Result<Vec<PublishResult>, ContentServiceError> {
        let now = OffsetDateTime::now_utc();
        let mut scope = self.scope().await;
        let root = scope
            .get(id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(id))?;
        let descendants = scope.descendants(id).await?;
        let root_path = root.path.clone();

        let mut results = Vec::new();
        let mut published = Vec::new();

        let root_result = self
            .publish_branch_item(&mut scope, root, true, user_id, now, id)
            .await?;
        let root_ok = root_result.is_success();
        if root_result.outcome == PublishOutcome::SuccessPublish {
            published.push(root_result.content.clone());
        }
        results.push(root_result);
        if !root_ok {
            return Ok(results);
        }

        let mut excluded = BTreeSet::new();
        for item in descendants {
            if excluded.contains(&item.parent_id) || !(force || item.is_published()) {
                excluded.insert(item.id);
                continue;
            }
            let result = self
                .publish_branch_item(&mut scope, item, false, user_id, now, id)
                .await?;
            match result.outcome {
                PublishOutcome::SuccessPublish => published.push(result.content.clone()),
                PublishOutcome::SuccessPublishAlready => {}
                _ => {
                    excluded.insert(result.content.id);
                }
            }
            results.push(result);
        }

        if !published.is_empty() {
            scope.push_change(id, root_path, TreeChangeKind::RefreshBranch);
            scope.defer(ContentNotification::new(
                ContentEvent::Published,
                published.iter().map(settled).collect(),
            ));
        }
        scope.complete().await?;

        for result in &mut results {
            if result.outcome == PublishOutcome::SuccessPublish {
                result.content.settle();
            }
        }
        info!(
            root_id = id,
            published = published.len(),
            excluded = excluded.len(),
            "Branch published"
        );
        Ok(results)
    }

    async fn publish_branch_item(
        &self,
        scope: &mut ContentScope,
        item: ContentEntity,
        check_path: bool,
        user_id: i32,
        now: OffsetDateTime,
        branch_root: i32,
    ) -> Result<PublishResult, ContentServiceError> {
        if item.publish_state == PublishState::Published && !item.edited {
            return Ok(PublishResult::new(
                PublishOutcome::SuccessPublishAlready,
                item,
            ));
        }

        let previous_state = item.publish_state;
        let mut candidate = item;
        candidate.publish_state = PublishState::Publishing;
        let check = self
            .strategy
            .can_publish(scope, &candidate, check_path, now)
            .await?;
        if !check.is_success() {
            let mut refused = check.content;
            refused.publish_state = previous_state;
            return Ok(PublishResult::new(check.outcome, refused));
        }

        self.strategy.publish(&mut candidate);
        candidate.update_date = now;
        candidate.writer_id = user_id;
        scope.stage(candidate.clone());
        scope.record_audit(audit_entry(
            user_id,
            AuditAction::Publish,
            candidate.id,
            format!("Content published with branch {branch_root}"),
            Some(&snapshot(&candidate)),
        )?);
        Ok(PublishResult::new(PublishOutcome::SuccessPublish, candidate))
    }

    /// Published descendants that become reachable once `id` is published.
    async fn reexposed_descendants(
        &self,
        scope: &ContentScope,
        id: i32,
    ) -> Result<Vec<ContentEntity>, ContentServiceError> {
        let mut reachable = BTreeSet::from([id]);
        let mut exposed = Vec::new();
        for item in scope.descendants(id).await? {
            if reachable.contains(&item.parent_id)
                && item.publish_state == PublishState::Published
                && !item.trashed
            {
                reachable.insert(item.id);
                exposed.push(item);
            }
        }
        Ok(exposed)
    }

    async fn previous_version(
        &self,
        scope: &ContentScope,
        content: &ContentEntity,
    ) -> Result<Option<ContentEntity>, ContentServiceError> {
        if !content.has_identity() {
            return Ok(None);
        }
        let previous = scope
            .get(content.id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(content.id))?;
        Ok(Some(previous))
    }

    /// Assign identity and placement, and keep state the caller may not change.
    async fn prepare_for_save(
        &self,
        scope: &ContentScope,
        entity: &mut ContentEntity,
        previous: Option<&ContentEntity>,
        user_id: i32,
        now: OffsetDateTime,
    ) -> Result<(), ContentServiceError> {
        if entity.name.trim().is_empty() {
            return Err(ContentServiceError::validation("content name must not be empty"));
        }
        let schema = self
            .types
            .get_by_id(entity.content_type_id)
            .await?
            .ok_or_else(|| {
                ContentServiceError::validation(format!(
                    "content type {} does not exist",
                    entity.content_type_id
                ))
            })?;
        entity.content_type_alias = schema.alias;

        match previous {
            None => {
                let parent_path = scope
                    .parent_path(entity.parent_id)
                    .await?
                    .ok_or_else(|| ContentServiceError::not_found(entity.parent_id))?;
                entity.id = scope.next_id().await?;
                let siblings = scope.children(entity.parent_id).await?.len();
                entity.sort_order = next_sort_order(siblings)?;
                entity.place_under(&parent_path);
                entity.create_date = now;
                entity.creator_id = user_id;
                entity.publish_state = PublishState::Unpublished;
                entity.published_version_id = 0;
            }
            Some(previous) => {
                entity.key = previous.key;
                entity.parent_id = previous.parent_id;
                entity.path = previous.path.clone();
                entity.level = previous.level;
                entity.trashed = previous.trashed;
                entity.create_date = previous.create_date;
                entity.creator_id = previous.creator_id;
                entity.publish_state = previous.publish_state;
                entity.published_version_id = previous.published_version_id;
                entity.version_id = previous.version_id;
                // a published item gets a fresh draft version on its first edit
                if previous.is_published() && previous.version_id == previous.published_version_id
                {
                    entity.version_id += 1;
                }
            }
        }

        entity.edited = true;
        entity.update_date = now;
        entity.writer_id = user_id;
        Ok(())
    }

    fn stage_save(
        &self,
        scope: &mut ContentScope,
        entity: ContentEntity,
        user_id: i32,
    ) -> Result<(), ContentServiceError> {
        scope.record_audit(audit_entry(
            user_id,
            AuditAction::Save,
            entity.id,
            "Content saved",
            Some(&snapshot(&entity)),
        )?);
        scope.push_change(entity.id, entity.path.clone(), TreeChangeKind::RefreshNode);
        scope.defer(ContentNotification::new(
            ContentEvent::Saved,
            vec![entity.clone()],
        ));
        scope.stage(entity);
        Ok(())
    }
}
