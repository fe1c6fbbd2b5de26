//! Domain entities mirrored from the authoritative store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    path::{ContentPath, ROOT_ID},
    types::{ContentStatus, PublishState},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntity {
    pub id: i32,
    pub key: Uuid,
    pub parent_id: i32,
    pub path: ContentPath,
    pub level: i32,
    pub sort_order: i32,
    pub name: String,
    pub content_type_id: i32,
    pub content_type_alias: String,
    pub template_id: Option<i32>,
    pub creator_id: i32,
    pub creator_name: String,
    pub writer_id: i32,
    pub writer_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub create_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub update_date: OffsetDateTime,
    pub trashed: bool,
    pub publish_state: PublishState,
    /// Current draft version; bumped when a published item is edited.
    pub version_id: i64,
    /// Version visible to readers; zero when the item was never published.
    pub published_version_id: i64,
    /// True when the draft differs from the published version.
    pub edited: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub release_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expire_date: Option<OffsetDateTime>,
    pub properties: BTreeMap<String, String>,
}

impl ContentEntity {
    /// A new, unsaved item below `parent`.
    pub fn new(name: impl Into<String>, parent: &ContentPath, content_type: &ContentTypeSchema) -> Self {
        let now = OffsetDateTime::now_utc();
        let path = parent.child(0);
        Self {
            id: 0,
            key: Uuid::new_v4(),
            parent_id: parent.id(),
            level: path.level(),
            path,
            sort_order: 0,
            name: name.into(),
            content_type_id: content_type.id,
            content_type_alias: content_type.alias.clone(),
            template_id: None,
            creator_id: 0,
            creator_name: String::new(),
            writer_id: 0,
            writer_name: String::new(),
            create_date: now,
            update_date: now,
            trashed: false,
            publish_state: PublishState::Unpublished,
            version_id: 1,
            published_version_id: 0,
            edited: true,
            release_date: None,
            expire_date: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn has_identity(&self) -> bool {
        self.id > 0
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_ID
    }

    /// Published once any pending transition settles.
    pub fn is_published(&self) -> bool {
        self.publish_state.is_published()
    }

    pub fn status(&self, now: OffsetDateTime) -> ContentStatus {
        if self.trashed {
            return ContentStatus::Trashed;
        }
        if self.expire_date.is_some_and(|expire| now > expire) {
            return ContentStatus::Expired;
        }
        if self.release_date.is_some_and(|release| release > now) {
            return ContentStatus::AwaitingRelease;
        }
        if self.is_published() {
            ContentStatus::Published
        } else {
            ContentStatus::Unpublished
        }
    }

    /// Collapse a transient publish state into the state a commit persists.
    pub fn settle(&mut self) {
        match self.publish_state {
            PublishState::Publishing => {
                self.published_version_id = self.version_id;
                self.edited = false;
            }
            PublishState::Unpublishing => {}
            _ => return,
        }
        self.publish_state = self.publish_state.settled();
    }

    /// Re-home the entity under `parent`, recomputing path and level.
    pub fn place_under(&mut self, parent: &ContentPath) {
        self.parent_id = parent.id();
        self.path = parent.child(self.id);
        self.level = self.path.level();
        self.trashed = self.path.is_trashed();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyType {
    pub alias: String,
    #[serde(default)]
    pub editor_alias: String,
}

/// Live schema of a content type, used to decide which values become properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeSchema {
    pub id: i32,
    pub alias: String,
    #[serde(default)]
    pub property_types: Vec<PropertyType>,
}

impl ContentTypeSchema {
    pub fn property_type(&self, alias: &str) -> Option<&PropertyType> {
        self.property_types
            .iter()
            .find(|property| property.alias == alias)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Save,
    Publish,
    Unpublish,
    Move,
    Copy,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Save => "content.save",
            AuditAction::Publish => "content.publish",
            AuditAction::Unpublish => "content.unpublish",
            AuditAction::Move => "content.move",
            AuditAction::Copy => "content.copy",
            AuditAction::Delete => "content.delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogRecord {
    pub id: Uuid,
    pub user_id: i32,
    pub action: AuditAction,
    pub content_id: i32,
    pub message: String,
    pub payload_text: Option<String>,
    pub created_at: OffsetDateTime,
}
