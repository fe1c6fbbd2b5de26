//! TOML seed files for the in-memory infrastructure.
//!
//! ```toml
//! [[content_types]]
//! id = 1
//! alias = "page"
//! property_types = [{ alias = "title", editor_alias = "text" }]
//!
//! [[items]]
//! id = 10
//! parent_id = -1
//! name = "Home"
//! content_type = "page"
//! published = true
//! properties = { title = "Welcome" }
//! ```
//!
//! Items must appear after their parent. Published items outside the
//! recycle bin are also written to the search index.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::info;

use crate::domain::{
    entities::{ContentEntity, ContentTypeSchema, PropertyType},
    path::{ContentPath, RECYCLE_BIN_ID, ROOT_ID},
    types::PublishState,
};

use super::error::InfraError;
use super::memory::{MemoryRepository, MemorySearchIndex};

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    content_types: Vec<ContentTypeSeed>,
    #[serde(default)]
    items: Vec<ItemSeed>,
}

#[derive(Debug, Deserialize)]
struct ContentTypeSeed {
    id: i32,
    alias: String,
    #[serde(default)]
    property_types: Vec<PropertyType>,
}

#[derive(Debug, Deserialize)]
struct ItemSeed {
    id: i32,
    parent_id: i32,
    name: String,
    content_type: String,
    #[serde(default)]
    published: bool,
    #[serde(default)]
    template_id: Option<i32>,
    #[serde(default)]
    writer_name: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    release_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    expire_date: Option<OffsetDateTime>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

/// Store and index populated from one seed file.
pub struct SeededContent {
    pub repository: Arc<MemoryRepository>,
    pub index: Arc<MemorySearchIndex>,
}

pub async fn load_seed(path: &Path) -> Result<SeededContent, InfraError> {
    let source = tokio::fs::read_to_string(path).await?;
    let seeded = seed_from_str(&source, path).await?;
    info!(
        seed = %path.display(),
        items = seeded.repository.entity_count().await,
        "Seed loaded"
    );
    Ok(seeded)
}

/// `origin` is only used in error messages.
pub async fn seed_from_str(source: &str, origin: &Path) -> Result<SeededContent, InfraError> {
    let file: SeedFile =
        toml::from_str(source).map_err(|err| InfraError::seed(origin, err.to_string()))?;

    let repository = Arc::new(MemoryRepository::new());
    let index = Arc::new(MemorySearchIndex::new());

    let mut types: BTreeMap<String, ContentTypeSchema> = BTreeMap::new();
    for seed in file.content_types {
        let schema = ContentTypeSchema {
            id: seed.id,
            alias: seed.alias,
            property_types: seed.property_types,
        };
        repository.insert_type(schema.clone()).await;
        types.insert(schema.alias.clone(), schema);
    }

    let now = OffsetDateTime::now_utc();
    let now = now.replace_nanosecond(0).unwrap_or(now);
    let mut paths: BTreeMap<i32, ContentPath> = BTreeMap::from([
        (ROOT_ID, ContentPath::root()),
        (RECYCLE_BIN_ID, ContentPath::recycle_bin()),
    ]);
    let mut sibling_counts: BTreeMap<i32, i32> = BTreeMap::new();

    for item in file.items {
        if item.id <= 0 {
            return Err(InfraError::seed(
                origin,
                format!("item id {} must be positive", item.id),
            ));
        }
        if paths.contains_key(&item.id) {
            return Err(InfraError::seed(
                origin,
                format!("item id {} appears twice", item.id),
            ));
        }
        let schema = types.get(&item.content_type).ok_or_else(|| {
            InfraError::seed(
                origin,
                format!(
                    "item {} uses unknown content type `{}`",
                    item.id, item.content_type
                ),
            )
        })?;
        let parent_path = paths.get(&item.parent_id).cloned().ok_or_else(|| {
            InfraError::seed(
                origin,
                format!(
                    "item {} appears before its parent {}",
                    item.id, item.parent_id
                ),
            )
        })?;

        let mut entity = ContentEntity::new(item.name, &parent_path, schema);
        entity.id = item.id;
        entity.place_under(&parent_path);
        let siblings = sibling_counts.entry(item.parent_id).or_insert(0);
        entity.sort_order = *siblings;
        *siblings += 1;
        entity.template_id = item.template_id;
        if let Some(writer) = item.writer_name {
            entity.creator_name = writer.clone();
            entity.writer_name = writer;
        }
        entity.create_date = now;
        entity.update_date = now;
        entity.release_date = item.release_date;
        entity.expire_date = item.expire_date;
        entity.properties = item.properties;
        if item.published {
            entity.publish_state = PublishState::Published;
            entity.published_version_id = entity.version_id;
            entity.edited = false;
        }

        if entity.is_published() && !entity.trashed {
            index.index_entity(&entity, schema).await;
        }
        paths.insert(entity.id, entity.path.clone());
        repository.put_entity(entity).await;
    }

    Ok(SeededContent { repository, index })
}

#[cfg(test)]
mod tests {
    use crate::application::repos::{ContentStore, SearchFilter, SearchIndex};

    use super::*;

    const SEED: &str = r#"
[[content_types]]
id = 1
alias = "page"
property_types = [{ alias = "title", editor_alias = "text" }]

[[items]]
id = 10
parent_id = -1
name = "Home"
content_type = "page"
published = true
properties = { title = "Welcome" }

[[items]]
id = 42
parent_id = 10
name = "Draft"
content_type = "page"
release_date = "2030-01-01T00:00:00Z"
"#;

    #[tokio::test]
    async fn seed_builds_tree_and_index() {
        let seeded = seed_from_str(SEED, Path::new("seed.toml"))
            .await
            .expect("valid seed");

        let draft = seeded.repository.entity(42).await.expect("draft");
        assert_eq!(draft.path.to_string(), "-1,10,42");
        assert_eq!(draft.publish_state, PublishState::Unpublished);
        assert!(draft.release_date.is_some());

        let home = seeded.repository.get(10).await.expect("get").expect("home");
        assert_eq!(home.published_version_id, 1);
        assert!(!home.edited);

        let indexed = seeded
            .index
            .search(&SearchFilter::by_parent(-1))
            .await
            .expect("search");
        assert_eq!(indexed.len(), 1);
        assert!(
            seeded
                .index
                .search(&SearchFilter::by_id(42))
                .await
                .expect("search")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn child_before_parent_is_rejected() {
        let source = r#"
[[content_types]]
id = 1
alias = "page"

[[items]]
id = 42
parent_id = 10
name = "Orphan"
content_type = "page"
"#;
        let err = seed_from_str(source, Path::new("seed.toml"))
            .await
            .err()
            .expect("orphan rejected");
        assert!(matches!(err, InfraError::Seed { .. }));
        assert!(err.to_string().contains("before its parent 10"));
    }
}
