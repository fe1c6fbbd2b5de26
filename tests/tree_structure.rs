mod support;

use arbor::application::audit::ContentAuditService;
use arbor::application::notifications::ContentEvent;
use arbor::application::publishing::{ContentServiceError, OperationOutcome};
use arbor::domain::entities::AuditAction;
use arbor::domain::error::DomainError;
use arbor::domain::types::{PublishState, TreeChangeKind};

use support::{RecordingHandler, Site};

#[tokio::test]
async fn delete_removes_the_subtree_deepest_first() {
    let site = Site::new().await;

    let result = site.service.delete(42, 7).await.expect("delete");

    assert!(result.is_success());
    assert!(site.repo.entity(42).await.is_none());
    assert!(site.repo.entity(43).await.is_none());
    assert_eq!(
        site.changes(),
        vec![(43, TreeChangeKind::Remove), (42, TreeChangeKind::Remove)]
    );
    assert_eq!(
        site.recorder.ids_for(ContentEvent::Deleted),
        vec![vec![43, 42]]
    );

    let audit = site.repo.audit_records().await;
    let deleted: Vec<i32> = audit
        .iter()
        .filter(|record| record.action == AuditAction::Delete)
        .map(|record| record.content_id)
        .collect();
    assert_eq!(deleted, vec![43, 42]);
}

#[tokio::test]
async fn move_rebases_descendant_paths() {
    let site = Site::new().await;

    let result = site.service.move_to(42, 20, 7).await.expect("move");

    assert!(result.is_success());
    let about = site.repo.entity(42).await.expect("about");
    let team = site.repo.entity(43).await.expect("team");
    assert_eq!(about.parent_id, 20);
    assert_eq!(about.path.to_string(), "-1,20,42");
    assert_eq!(about.sort_order, 1);
    assert_eq!(team.path.to_string(), "-1,20,42,43");
    assert_eq!(team.level, about.level + 1);
    assert_eq!(site.changes(), vec![(42, TreeChangeKind::RefreshBranch)]);
    assert_eq!(site.recorder.ids_for(ContentEvent::Moved), vec![vec![42, 43]]);

    let audit = ContentAuditService::new(site.repo.clone());
    let history = audit.list_for_content(42).await.expect("audit");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, AuditAction::Move);
    let payload = history[0].payload_text.as_deref().expect("payload");
    assert!(payload.contains("\"from\":\"-1,10,42\""));
    assert!(payload.contains("\"to\":\"-1,20,42\""));
}

#[tokio::test]
async fn content_cannot_move_below_itself() {
    let site = Site::new().await;

    let err = site
        .service
        .move_to(42, 43, 7)
        .await
        .err()
        .expect("move rejected");

    assert!(matches!(
        err,
        ContentServiceError::Domain(DomainError::Validation { .. })
    ));
    assert_eq!(site.repo.commit_count(), 0);
}

#[tokio::test]
async fn cancelled_move_leaves_the_tree_alone() {
    let site = Site::with_recorder(RecordingHandler::cancelling(ContentEvent::Moving)).await;

    let result = site.service.move_to(42, 20, 7).await.expect("move");

    assert_eq!(result.outcome, OperationOutcome::FailedCancelledByEvent);
    assert_eq!(
        site.repo.entity(42).await.expect("about").path.to_string(),
        "-1,10,42"
    );
    assert!(site.queue.is_empty());
}

#[tokio::test]
async fn recycle_bin_round_trip() {
    let site = Site::new().await;

    let trashed = site.service.move_to(42, -20, 7).await.expect("trash");
    assert!(trashed.is_success());

    let about = site.repo.entity(42).await.expect("about");
    let team = site.repo.entity(43).await.expect("team");
    assert!(about.trashed);
    assert!(team.trashed);
    assert_eq!(about.publish_state, PublishState::Unpublished);
    assert_eq!(about.parent_id, -20);
    assert_eq!(
        site.recorder.ids_for(ContentEvent::Trashed),
        vec![vec![42, 43]]
    );

    let commits = site.repo.commit_count();
    let again = site.service.move_to_recycle_bin(42, 7).await.expect("trash");
    assert!(again.is_success());
    assert_eq!(site.repo.commit_count(), commits);

    let emptied = site.service.empty_recycle_bin(7).await.expect("empty");
    assert_eq!(emptied.affected.len(), 2);
    assert!(site.repo.entity(42).await.is_none());
    assert!(site.repo.entity(43).await.is_none());
    assert_eq!(
        site.recorder.ids_for(ContentEvent::Deleted),
        vec![vec![43, 42]]
    );
    assert_eq!(
        site.recorder.ids_for(ContentEvent::EmptiedRecycleBin),
        vec![vec![42, 43]]
    );

    let nothing = site.service.empty_recycle_bin(7).await.expect("empty");
    assert!(nothing.is_success());
    assert!(nothing.affected.is_empty());
}

#[tokio::test]
async fn trashed_parents_refuse_new_children() {
    let site = Site::new().await;
    site.service.move_to_recycle_bin(20, 7).await.expect("trash");

    let moved = site.service.move_to(42, 20, 7).await;
    let copied = site.service.copy(42, -20, false, 7).await;

    assert!(moved.is_err());
    assert!(copied.is_err());
}

#[tokio::test]
async fn recursive_copy_creates_unpublished_duplicates() {
    let site = Site::new().await;

    let result = site.service.copy(42, 20, true, 7).await.expect("copy");

    let copies = &result.affected;
    assert_eq!(copies.len(), 2);
    let (root, child) = (&copies[0], &copies[1]);
    assert_ne!(root.id, 42);
    assert_ne!(root.key, site.repo.entity(42).await.expect("about").key);
    assert_eq!(root.path.to_string(), format!("-1,20,{}", root.id));
    assert_eq!(child.parent_id, root.id);
    assert_eq!(
        child.path.to_string(),
        format!("-1,20,{},{}", root.id, child.id)
    );
    for copy in copies {
        let stored = site.repo.entity(copy.id).await.expect("stored copy");
        assert_eq!(stored.publish_state, PublishState::Unpublished);
        assert_eq!(stored.published_version_id, 0);
        assert!(stored.edited);
        assert_eq!(stored.creator_id, 7);
    }
    assert_eq!(
        site.repo.entity(42).await.expect("about").publish_state,
        PublishState::Published
    );
    assert_eq!(site.changes(), vec![(root.id, TreeChangeKind::RefreshBranch)]);
}

#[tokio::test]
async fn shallow_copy_leaves_children_behind() {
    let site = Site::new().await;

    let result = site.service.copy(42, 10, false, 7).await.expect("copy");

    assert_eq!(result.affected.len(), 1);
    let copy = result.primary().expect("copy");
    assert_eq!(copy.parent_id, 10);
    assert_eq!(copy.sort_order, 2);
    assert_eq!(copy.properties.get("title").map(String::as_str), Some("About"));
}
