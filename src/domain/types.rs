//! Shared domain enumerations for content state and tree changes.

use serde::{Deserialize, Serialize};

/// Persisted publish state of a content item.
///
/// `Publishing` and `Unpublishing` are transient: they only exist between a
/// strategy call and the commit of the enclosing scope, which collapses them
/// to `Published` and `Unpublished` respectively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    #[default]
    Unpublished,
    Publishing,
    Published,
    Unpublishing,
}

impl PublishState {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishState::Unpublished => "unpublished",
            PublishState::Publishing => "publishing",
            PublishState::Published => "published",
            PublishState::Unpublishing => "unpublishing",
        }
    }

    /// Whether the item counts as published once the pending transition settles.
    pub fn is_published(self) -> bool {
        matches!(self, PublishState::Published | PublishState::Publishing)
    }

    pub fn is_transient(self) -> bool {
        matches!(self, PublishState::Publishing | PublishState::Unpublishing)
    }

    /// Terminal state reached when a scope commits.
    pub fn settled(self) -> Self {
        match self {
            PublishState::Publishing => PublishState::Published,
            PublishState::Unpublishing => PublishState::Unpublished,
            other => other,
        }
    }
}

/// Status derived from the trashed flag, schedule dates and publish state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Unpublished,
    Published,
    Expired,
    AwaitingRelease,
    Trashed,
}

/// Kind of structural change raised after a scope commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeChangeKind {
    RefreshNode,
    RefreshBranch,
    Remove,
}

impl TreeChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TreeChangeKind::RefreshNode => "refresh_node",
            TreeChangeKind::RefreshBranch => "refresh_branch",
            TreeChangeKind::Remove => "remove",
        }
    }
}

/// Where a set of cache values was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    SearchIndex,
    Document,
    Store,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::SearchIndex => "search_index",
            Provenance::Document => "document",
            Provenance::Store => "store",
        }
    }
}

impl TryFrom<&str> for PublishState {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "unpublished" => Ok(PublishState::Unpublished),
            "publishing" => Ok(PublishState::Publishing),
            "published" => Ok(PublishState::Published),
            "unpublishing" => Ok(PublishState::Unpublishing),
            _ => Err(()),
        }
    }
}
