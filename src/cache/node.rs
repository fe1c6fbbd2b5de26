//! Read-only content node built from a [`CacheValues`] map.
//!
//! Standard attributes are parsed once at construction. Parent and children
//! are resolved through a [`NodeResolver`] the first time they are asked for
//! and kept for the lifetime of the node.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    entities::ContentTypeSchema,
    path::ContentPath,
    types::Provenance,
};

use super::CacheError;
use super::values::{CacheValues, RAW_FIELD_PREFIX, ValuesError, fields, is_standard_key};

#[async_trait]
pub trait NodeResolver: Send + Sync {
    async fn resolve_parent(
        &self,
        node: &PublishedNode,
    ) -> Result<Option<Arc<PublishedNode>>, CacheError>;

    async fn resolve_children(
        &self,
        node: &PublishedNode,
    ) -> Result<Vec<Arc<PublishedNode>>, CacheError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedProperty {
    alias: String,
    editor_alias: String,
    value: Option<String>,
}

impl PublishedProperty {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn editor_alias(&self) -> &str {
        &self.editor_alias
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn has_value(&self) -> bool {
        self.value
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty())
    }
}

pub struct PublishedNode {
    id: i32,
    key: Uuid,
    name: String,
    url_name: String,
    parent_id: i32,
    path: ContentPath,
    level: i32,
    sort_order: i32,
    content_type_alias: String,
    content_type_id: i32,
    template_id: i32,
    creator_id: i32,
    creator_name: String,
    writer_id: i32,
    writer_name: String,
    create_date: Option<OffsetDateTime>,
    update_date: Option<OffsetDateTime>,
    properties: Vec<PublishedProperty>,
    values: Arc<CacheValues>,
    resolver: Arc<dyn NodeResolver>,
    parent: OnceCell<Option<Arc<PublishedNode>>>,
    children: OnceCell<Vec<Arc<PublishedNode>>>,
}

impl PublishedNode {
    pub fn new(
        values: Arc<CacheValues>,
        schema: &ContentTypeSchema,
        resolver: Arc<dyn NodeResolver>,
    ) -> Result<Self, ValuesError> {
        let id: i32 = values.parse_required(&fields::ID)?;
        let key: Uuid = values.parse_required(&fields::KEY)?;
        let parent_id: i32 = values.parse_required(&fields::PARENT_ID)?;
        let raw_path = values.require(&fields::PATH)?;
        let path: ContentPath = raw_path.parse().map_err(|err: crate::domain::path::PathError| {
            ValuesError::InvalidField {
                field: fields::PATH.name,
                value: raw_path.to_string(),
                reason: err.to_string(),
            }
        })?;
        let sort_order: i32 = values.parse_required(&fields::SORT_ORDER)?;
        let level: i32 = values.parse_required(&fields::LEVEL)?;
        let content_type_alias = values.require(&fields::TYPE_ALIAS)?.to_string();

        if path.id() != id || path.parent_id() != Some(parent_id) {
            return Err(ValuesError::Inconsistent {
                message: format!("path `{path}` does not end with parent {parent_id} and node {id}"),
            });
        }
        if path.level() != level {
            return Err(ValuesError::Inconsistent {
                message: format!("level {level} does not match path `{path}`"),
            });
        }

        let properties = build_properties(&values, schema, id);

        Ok(Self {
            id,
            key,
            name: values.lookup(&fields::NAME).unwrap_or_default().to_string(),
            url_name: values
                .lookup(&fields::URL_NAME)
                .unwrap_or_default()
                .to_string(),
            parent_id,
            path,
            level,
            sort_order,
            content_type_alias,
            content_type_id: values.parse_optional(&fields::TYPE_ID)?.unwrap_or(schema.id),
            template_id: values.parse_optional(&fields::TEMPLATE_ID)?.unwrap_or(0),
            creator_id: values.parse_optional(&fields::CREATOR_ID)?.unwrap_or(0),
            creator_name: values
                .lookup(&fields::CREATOR_NAME)
                .unwrap_or_default()
                .to_string(),
            writer_id: values.parse_optional(&fields::WRITER_ID)?.unwrap_or(0),
            writer_name: values
                .lookup(&fields::WRITER_NAME)
                .unwrap_or_default()
                .to_string(),
            create_date: values.parse_date(&fields::CREATE_DATE)?,
            update_date: values.parse_date(&fields::UPDATE_DATE)?,
            properties,
            values,
            resolver,
            parent: OnceCell::new(),
            children: OnceCell::new(),
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url_name(&self) -> &str {
        &self.url_name
    }

    pub fn parent_id(&self) -> i32 {
        self.parent_id
    }

    pub fn path(&self) -> &ContentPath {
        &self.path
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    pub fn content_type_alias(&self) -> &str {
        &self.content_type_alias
    }

    pub fn content_type_id(&self) -> i32 {
        self.content_type_id
    }

    pub fn template_id(&self) -> i32 {
        self.template_id
    }

    pub fn creator_id(&self) -> i32 {
        self.creator_id
    }

    pub fn creator_name(&self) -> &str {
        &self.creator_name
    }

    pub fn writer_id(&self) -> i32 {
        self.writer_id
    }

    pub fn writer_name(&self) -> &str {
        &self.writer_name
    }

    pub fn create_date(&self) -> Option<OffsetDateTime> {
        self.create_date
    }

    pub fn update_date(&self) -> Option<OffsetDateTime> {
        self.update_date
    }

    pub fn provenance(&self) -> Provenance {
        self.values.provenance()
    }

    pub fn values(&self) -> &Arc<CacheValues> {
        &self.values
    }

    pub fn properties(&self) -> &[PublishedProperty] {
        &self.properties
    }

    pub fn property(&self, alias: &str) -> Option<&PublishedProperty> {
        self.properties
            .iter()
            .find(|property| property.alias == alias)
    }

    /// Parent node, or `None` at the root. Resolved once.
    pub async fn parent(&self) -> Result<Option<Arc<PublishedNode>>, CacheError> {
        let parent = self
            .parent
            .get_or_try_init(|| self.resolver.resolve_parent(self))
            .await?;
        Ok(parent.clone())
    }

    /// Children ordered by sort order. Resolved once.
    pub async fn children(&self) -> Result<&[Arc<PublishedNode>], CacheError> {
        let children = self
            .children
            .get_or_try_init(|| async {
                let mut children = self.resolver.resolve_children(self).await?;
                children.sort_by_key(|child| child.sort_order());
                Ok::<_, CacheError>(children)
            })
            .await?;
        Ok(children.as_slice())
    }
}

fn build_properties(
    values: &CacheValues,
    schema: &ContentTypeSchema,
    id: i32,
) -> Vec<PublishedProperty> {
    let prefer_raw = values.provenance() == Provenance::SearchIndex;

    let properties = schema
        .property_types
        .iter()
        .map(|property_type| {
            let raw_alias = format!("{RAW_FIELD_PREFIX}{}", property_type.alias);
            let value = if prefer_raw {
                values
                    .get(&raw_alias)
                    .or_else(|| values.get(&property_type.alias))
            } else {
                values.get(&property_type.alias)
            };
            PublishedProperty {
                alias: property_type.alias.clone(),
                editor_alias: property_type.editor_alias.clone(),
                value: value.map(str::to_string),
            }
        })
        .collect();

    for (key, _) in values.iter() {
        if is_standard_key(key) || schema.property_type(key).is_some() {
            continue;
        }
        warn!(
            node_id = id,
            content_type = %schema.alias,
            property = key,
            "Dropping value with no matching property type"
        );
    }

    properties
}

impl PartialEq for PublishedNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.key == other.key
            && self.name == other.name
            && self.url_name == other.url_name
            && self.parent_id == other.parent_id
            && self.path == other.path
            && self.level == other.level
            && self.sort_order == other.sort_order
            && self.content_type_alias == other.content_type_alias
            && self.content_type_id == other.content_type_id
            && self.template_id == other.template_id
            && self.creator_id == other.creator_id
            && self.creator_name == other.creator_name
            && self.writer_id == other.writer_id
            && self.writer_name == other.writer_name
            && self.create_date == other.create_date
            && self.update_date == other.update_date
            && self.properties == other.properties
    }
}

impl fmt::Debug for PublishedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishedNode")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("name", &self.name)
            .field("path", &self.path.to_string())
            .field("content_type_alias", &self.content_type_alias)
            .field("provenance", &self.values.provenance())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::domain::entities::PropertyType;

    use super::*;

    #[derive(Default)]
    struct CountingResolver {
        parent_calls: AtomicUsize,
        children_calls: AtomicUsize,
    }

    #[async_trait]
    impl NodeResolver for CountingResolver {
        async fn resolve_parent(
            &self,
            _node: &PublishedNode,
        ) -> Result<Option<Arc<PublishedNode>>, CacheError> {
            self.parent_calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn resolve_children(
            &self,
            _node: &PublishedNode,
        ) -> Result<Vec<Arc<PublishedNode>>, CacheError> {
            self.children_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn schema() -> ContentTypeSchema {
        ContentTypeSchema {
            id: 5,
            alias: "article".to_string(),
            property_types: vec![PropertyType {
                alias: "bodyText".to_string(),
                editor_alias: "richtext".to_string(),
            }],
        }
    }

    fn values(provenance: Provenance) -> CacheValues {
        let mut values = CacheValues::new(provenance);
        values.insert("id", "42");
        values.insert("key", "8a4f5f0e-4f77-4a53-9b62-6cf7f6d0e8a1");
        values.insert("parentID", "10");
        values.insert("path", "-1,10,42");
        values.insert("sortOrder", "1");
        values.insert("level", "2");
        values.insert("nodeTypeAlias", "article");
        values.insert("nodeName", "Hello");
        values
    }

    fn node(values: CacheValues, resolver: Arc<dyn NodeResolver>) -> PublishedNode {
        PublishedNode::new(Arc::new(values), &schema(), resolver).expect("valid node")
    }

    #[tokio::test]
    async fn parent_and_children_are_resolved_once() {
        let resolver = Arc::new(CountingResolver::default());
        let node = node(values(Provenance::Store), resolver.clone());

        assert!(node.parent().await.expect("parent").is_none());
        assert!(node.parent().await.expect("parent").is_none());
        assert!(node.children().await.expect("children").is_empty());
        assert!(node.children().await.expect("children").is_empty());

        assert_eq!(resolver.parent_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.children_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn index_nodes_prefer_raw_property_values() {
        let mut raw = values(Provenance::SearchIndex);
        raw.insert("bodyText", "&lt;p&gt;hi&lt;/p&gt;");
        raw.insert("__Raw_bodyText", "<p>hi</p>");

        let node = node(raw, Arc::new(CountingResolver::default()));
        assert_eq!(
            node.property("bodyText").and_then(PublishedProperty::value),
            Some("<p>hi</p>")
        );
    }

    #[test]
    fn store_nodes_ignore_raw_property_values() {
        let mut plain = values(Provenance::Store);
        plain.insert("bodyText", "plain");
        plain.insert("__Raw_bodyText", "raw");

        let node = node(plain, Arc::new(CountingResolver::default()));
        assert_eq!(
            node.property("bodyText").and_then(PublishedProperty::value),
            Some("plain")
        );
    }

    #[test]
    fn unknown_properties_are_dropped() {
        let mut extra = values(Provenance::Store);
        extra.insert("legacyField", "value");

        let node = node(extra, Arc::new(CountingResolver::default()));
        assert!(node.property("legacyField").is_none());
        assert_eq!(node.properties().len(), 1);
        assert!(!node.properties()[0].has_value());
    }

    #[test]
    fn missing_mandatory_field_is_a_format_error() {
        let mut incomplete = CacheValues::new(Provenance::Store);
        incomplete.insert("id", "42");

        let err = PublishedNode::new(
            Arc::new(incomplete),
            &schema(),
            Arc::new(CountingResolver::default()),
        )
        .expect_err("key is missing");
        assert!(matches!(err, ValuesError::MissingField { field: "key", .. }));
    }

    #[test]
    fn level_must_match_path() {
        let mut skewed = values(Provenance::Store);
        skewed.insert("level", "5");

        let err = PublishedNode::new(
            Arc::new(skewed),
            &schema(),
            Arc::new(CountingResolver::default()),
        )
        .expect_err("level disagrees with path");
        assert!(matches!(err, ValuesError::Inconsistent { .. }));
    }

    #[test]
    fn equal_values_build_equal_nodes() {
        let first = node(values(Provenance::Store), Arc::new(CountingResolver::default()));
        let second = node(values(Provenance::Store), Arc::new(CountingResolver::default()));
        assert_eq!(first, second);
    }
}
