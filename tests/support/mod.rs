#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use arbor::application::notifications::{
    ContentEvent, ContentNotification, NotificationHandler, Notifications,
};
use arbor::application::publishing::ContentService;
use arbor::cache::{CacheConfig, CacheConsumer, SourceArbitrator, TreeChangeQueue};
use arbor::domain::types::TreeChangeKind;
use arbor::infra::memory::{MemoryRepository, MemorySearchIndex};
use arbor::infra::seed::seed_from_str;

/// ```text
/// 10 Home (published)
/// ├── 42 About (published)
/// │   └── 43 Team (published)
/// └── 44 Draft
///     └── 45 Draft child
/// 20 Blog
/// └── 21 Post
/// ```
pub const SITE: &str = r#"
[[content_types]]
id = 1
alias = "page"
property_types = [
    { alias = "title", editor_alias = "text" },
    { alias = "bodyText", editor_alias = "richtext" },
]

[[items]]
id = 10
parent_id = -1
name = "Home"
content_type = "page"
published = true
properties = { title = "Welcome", bodyText = "<p>Hello & welcome</p>" }

[[items]]
id = 42
parent_id = 10
name = "About Us"
content_type = "page"
published = true
properties = { title = "About" }

[[items]]
id = 43
parent_id = 42
name = "Team"
content_type = "page"
published = true

[[items]]
id = 44
parent_id = 10
name = "Draft"
content_type = "page"

[[items]]
id = 45
parent_id = 44
name = "Draft child"
content_type = "page"

[[items]]
id = 20
parent_id = -1
name = "Blog"
content_type = "page"

[[items]]
id = 21
parent_id = 20
name = "Post"
content_type = "page"
"#;

/// Records every notification it sees, in dispatch order.
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<(ContentEvent, Vec<i32>)>>,
    cancel: Option<ContentEvent>,
}

impl RecordingHandler {
    pub fn cancelling(event: ContentEvent) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            cancel: Some(event),
        }
    }

    pub fn seen(&self) -> Vec<(ContentEvent, Vec<i32>)> {
        self.seen.lock().expect("recording lock").clone()
    }

    pub fn ids_for(&self, event: ContentEvent) -> Vec<Vec<i32>> {
        self.seen()
            .into_iter()
            .filter(|(seen, _)| *seen == event)
            .map(|(_, ids)| ids)
            .collect()
    }
}

impl NotificationHandler for RecordingHandler {
    fn handle(&self, notification: &mut ContentNotification) {
        if self.cancel == Some(notification.event()) {
            notification.cancel("blocked by test handler");
        }
        self.seen
            .lock()
            .expect("recording lock")
            .push((notification.event(), notification.ids()));
    }
}

pub struct Site {
    pub repo: Arc<MemoryRepository>,
    pub index: Arc<MemorySearchIndex>,
    pub queue: Arc<TreeChangeQueue>,
    pub service: ContentService,
    pub recorder: Arc<RecordingHandler>,
}

impl Site {
    pub async fn new() -> Self {
        Self::with_recorder(RecordingHandler::default()).await
    }

    pub async fn with_recorder(recorder: RecordingHandler) -> Self {
        let seeded = seed_from_str(SITE, Path::new("site.toml"))
            .await
            .expect("valid seed");
        let recorder = Arc::new(recorder);
        let queue = Arc::new(TreeChangeQueue::new());
        let notifications = Notifications::new().with_handler(recorder.clone());
        let service = ContentService::new(
            seeded.repository.clone(),
            seeded.repository.clone(),
            seeded.repository.clone(),
            queue.clone(),
            notifications,
        );
        Self {
            repo: seeded.repository,
            index: seeded.index,
            queue,
            service,
            recorder,
        }
    }

    /// Arbitrator reading through the seeded search index.
    pub fn indexed_arbitrator(&self, config: &CacheConfig) -> SourceArbitrator {
        SourceArbitrator::new(
            config,
            self.repo.clone(),
            self.repo.clone(),
            Some(self.index.clone()),
        )
    }

    /// Arbitrator that only consults the store.
    pub fn store_arbitrator(&self, config: &CacheConfig) -> SourceArbitrator {
        SourceArbitrator::new(config, self.repo.clone(), self.repo.clone(), None)
    }

    pub fn consumer(&self, arbitrator: &SourceArbitrator) -> CacheConsumer {
        CacheConsumer::new(CacheConfig::default(), self.queue.clone(), arbitrator.clone())
    }

    /// Pending tree changes as `(content id, kind)` pairs.
    pub fn changes(&self) -> Vec<(i32, TreeChangeKind)> {
        self.queue
            .pending()
            .into_iter()
            .map(|change| (change.content_id, change.kind))
            .collect()
    }
}
