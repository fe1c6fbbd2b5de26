use std::collections::BTreeMap;

use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::application::audit::audit_entry;
use crate::application::notifications::{ContentEvent, ContentNotification};
use crate::application::scope::ContentScope;
use crate::domain::{
    entities::{AuditAction, ContentEntity},
    error::DomainError,
    path::{ContentPath, RECYCLE_BIN_ID},
    types::{PublishState, TreeChangeKind},
};

use super::service::ContentService;
use super::types::{
    ContentServiceError, CopySnapshot, MoveSnapshot, OperationResult, next_sort_order,
};

impl ContentService {
    /// Re-home `id` and its subtree below `parent_id`.
    #[instrument(skip(self))]
    pub async fn move_to(
        &self,
        id: i32,
        parent_id: i32,
        user_id: i32,
    ) -> Result<OperationResult, ContentServiceError> {
        if parent_id == RECYCLE_BIN_ID {
            return self.move_to_recycle_bin(id, user_id).await;
        }

        let now = OffsetDateTime::now_utc();
        let mut scope = self.scope().await;
        let entity = scope
            .get(id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(id))?;
        let parent_path = scope
            .parent_path(parent_id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(parent_id))?;
        if parent_path.segments().contains(&id) {
            return Err(ContentServiceError::validation(
                "content cannot be moved below itself",
            ));
        }
        if parent_path.is_trashed() {
            return Err(ContentServiceError::validation(
                "content cannot be moved below a trashed item",
            ));
        }

        let moving = scope
            .notifications()
            .raise_cancellable(ContentEvent::Moving, vec![entity.clone()]);
        if moving.is_cancelled() {
            return Ok(OperationResult::cancelled());
        }

        let sort_order = next_sort_order(scope.children(parent_id).await?.len())?;
        let old_path = entity.path.clone();
        let affected = self
            .relocate(&mut scope, entity, &parent_path, sort_order, user_id, now)
            .await?;
        let new_path = affected[0].path.clone();

        let snapshot = MoveSnapshot {
            from: old_path.to_string(),
            to: new_path.to_string(),
        };
        scope.record_audit(audit_entry(
            user_id,
            AuditAction::Move,
            id,
            format!("Content moved below {parent_id}"),
            Some(&snapshot),
        )?);
        scope.push_change(id, new_path, TreeChangeKind::RefreshBranch);
        scope.defer(ContentNotification::new(
            ContentEvent::Moved,
            affected.clone(),
        ));
        scope.complete().await?;

        info!(content_id = id, parent_id, moved = affected.len(), "Content moved");
        Ok(OperationResult::success(affected))
    }

    /// Move `id` and its subtree into the recycle bin, unpublishing `id`.
    #[instrument(skip(self))]
    pub async fn move_to_recycle_bin(
        &self,
        id: i32,
        user_id: i32,
    ) -> Result<OperationResult, ContentServiceError> {
        let now = OffsetDateTime::now_utc();
        let mut scope = self.scope().await;
        let mut entity = scope
            .get(id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(id))?;
        if entity.trashed {
            return Ok(OperationResult::success(vec![entity]));
        }

        let trashing = scope
            .notifications()
            .raise_cancellable(ContentEvent::Trashing, vec![entity.clone()]);
        if trashing.is_cancelled() {
            return Ok(OperationResult::cancelled());
        }

        if entity.is_published() {
            self.strategy.unpublish(&mut entity, now);
        }
        let sort_order = next_sort_order(scope.children(RECYCLE_BIN_ID).await?.len())?;
        let old_path = entity.path.clone();
        let mut affected = self
            .relocate(
                &mut scope,
                entity,
                &ContentPath::recycle_bin(),
                sort_order,
                user_id,
                now,
            )
            .await?;
        let new_path = affected[0].path.clone();

        let snapshot = MoveSnapshot {
            from: old_path.to_string(),
            to: new_path.to_string(),
        };
        scope.record_audit(audit_entry(
            user_id,
            AuditAction::Move,
            id,
            "Content moved to the recycle bin",
            Some(&snapshot),
        )?);
        scope.push_change(id, new_path, TreeChangeKind::RefreshBranch);
        for entity in &mut affected {
            entity.settle();
        }
        scope.defer(ContentNotification::new(
            ContentEvent::Trashed,
            affected.clone(),
        ));
        scope.complete().await?;

        info!(content_id = id, trashed = affected.len(), "Content moved to recycle bin");
        Ok(OperationResult::success(affected))
    }

    /// Permanently delete everything in the recycle bin.
    #[instrument(skip(self))]
    pub async fn empty_recycle_bin(
        &self,
        user_id: i32,
    ) -> Result<OperationResult, ContentServiceError> {
        let mut scope = self.scope().await;
        let items = scope.descendants(RECYCLE_BIN_ID).await?;
        if items.is_empty() {
            return Ok(OperationResult::success(Vec::new()));
        }

        let emptying = scope
            .notifications()
            .raise_cancellable(ContentEvent::EmptyingRecycleBin, items.clone());
        if emptying.is_cancelled() {
            return Ok(OperationResult::cancelled());
        }

        let removed = self.remove_bottom_up(&mut scope, &items, user_id)?;
        scope.defer(ContentNotification::new(ContentEvent::Deleted, removed));
        scope.defer(ContentNotification::new(
            ContentEvent::EmptiedRecycleBin,
            items.clone(),
        ));
        scope.complete().await?;

        info!(deleted = items.len(), "Recycle bin emptied");
        Ok(OperationResult::success(items))
    }

    /// Permanently delete `id` and its subtree, deepest items first.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        id: i32,
        user_id: i32,
    ) -> Result<OperationResult, ContentServiceError> {
        let mut scope = self.scope().await;
        let entity = scope
            .get(id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(id))?;

        let deleting = scope
            .notifications()
            .raise_cancellable(ContentEvent::Deleting, vec![entity.clone()]);
        if deleting.is_cancelled() {
            return Ok(OperationResult::cancelled());
        }

        let mut doomed = vec![entity];
        doomed.extend(scope.descendants(id).await?);
        let removed = self.remove_bottom_up(&mut scope, &doomed, user_id)?;
        scope.defer(ContentNotification::new(ContentEvent::Deleted, removed));
        scope.complete().await?;

        info!(content_id = id, deleted = doomed.len(), "Content deleted");
        Ok(OperationResult::success(doomed))
    }

    /// Duplicate `id` below `parent_id`; copies start unpublished.
    #[instrument(skip(self))]
    pub async fn copy(
        &self,
        id: i32,
        parent_id: i32,
        recursive: bool,
        user_id: i32,
    ) -> Result<OperationResult, ContentServiceError> {
        let now = OffsetDateTime::now_utc();
        let mut scope = self.scope().await;
        let original = scope
            .get(id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(id))?;
        let parent_path = scope
            .parent_path(parent_id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(parent_id))?;
        if parent_path.is_trashed() {
            return Err(ContentServiceError::validation(
                "content cannot be copied into the recycle bin",
            ));
        }

        let copying = scope
            .notifications()
            .raise_cancellable(ContentEvent::Copying, vec![original.clone()]);
        if copying.is_cancelled() {
            return Ok(OperationResult::cancelled());
        }

        let descendants = if recursive {
            scope.descendants(id).await?
        } else {
            Vec::new()
        };

        let mut root = fresh_copy(&original, scope.next_id().await?, &parent_path, user_id, now);
        root.sort_order = next_sort_order(scope.children(parent_id).await?.len())?;
        let mut placed: BTreeMap<i32, ContentPath> = BTreeMap::from([(id, root.path.clone())]);
        let mut copies = vec![root];

        for item in &descendants {
            let Some(parent_path) = placed.get(&item.parent_id).cloned() else {
                continue;
            };
            let copy = fresh_copy(item, scope.next_id().await?, &parent_path, user_id, now);
            placed.insert(item.id, copy.path.clone());
            copies.push(copy);
        }

        let copy_id = copies[0].id;
        let snapshot = CopySnapshot {
            original_id: id,
            copy_id,
            recursive,
        };
        scope.record_audit(audit_entry(
            user_id,
            AuditAction::Copy,
            copy_id,
            format!("Copied from {id}"),
            Some(&snapshot),
        )?);
        scope.push_change(copy_id, copies[0].path.clone(), TreeChangeKind::RefreshBranch);
        for copy in &copies {
            scope.stage(copy.clone());
        }
        scope.defer(ContentNotification::new(
            ContentEvent::Copied,
            copies.clone(),
        ));
        scope.complete().await?;

        info!(original_id = id, copy_id, copied = copies.len(), "Content copied");
        Ok(OperationResult::success(copies))
    }

    /// Stage `entity` under `parent_path` and rebase its subtree.
    async fn relocate(
        &self,
        scope: &mut ContentScope,
        mut entity: ContentEntity,
        parent_path: &ContentPath,
        sort_order: i32,
        user_id: i32,
        now: OffsetDateTime,
    ) -> Result<Vec<ContentEntity>, ContentServiceError> {
        let descendants = scope.descendants(entity.id).await?;
        let old_path = entity.path.clone();

        entity.place_under(parent_path);
        entity.sort_order = sort_order;
        entity.update_date = now;
        entity.writer_id = user_id;
        let new_path = entity.path.clone();

        let mut affected = vec![entity];
        for mut item in descendants {
            item.path = item.path.rebase(&old_path, &new_path).ok_or_else(|| {
                DomainError::invariant(format!(
                    "descendant {} is not below {old_path}",
                    item.id
                ))
            })?;
            item.level = item.path.level();
            item.trashed = item.path.is_trashed();
            affected.push(item);
        }
        for item in &affected {
            scope.stage(item.clone());
        }
        Ok(affected)
    }

    /// Stage deletes deepest first; returns the removed items in that order.
    fn remove_bottom_up(
        &self,
        scope: &mut ContentScope,
        items: &[ContentEntity],
        user_id: i32,
    ) -> Result<Vec<ContentEntity>, ContentServiceError> {
        let mut removed = Vec::with_capacity(items.len());
        for item in items.iter().rev() {
            scope.stage_delete(item.id);
            scope.push_change(item.id, item.path.clone(), TreeChangeKind::Remove);
            scope.record_audit(audit_entry::<()>(
                user_id,
                AuditAction::Delete,
                item.id,
                format!("Content {} deleted", item.name),
                None,
            )?);
            removed.push(item.clone());
        }
        Ok(removed)
    }
}

fn fresh_copy(
    original: &ContentEntity,
    id: i32,
    parent_path: &ContentPath,
    user_id: i32,
    now: OffsetDateTime,
) -> ContentEntity {
    let mut copy = original.clone();
    copy.id = id;
    copy.key = Uuid::new_v4();
    copy.place_under(parent_path);
    copy.publish_state = PublishState::Unpublished;
    copy.version_id = 1;
    copy.published_version_id = 0;
    copy.edited = true;
    copy.create_date = now;
    copy.update_date = now;
    copy.creator_id = user_id;
    copy.writer_id = user_id;
    copy
}
