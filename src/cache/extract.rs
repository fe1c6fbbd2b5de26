//! Normalise index hits, document elements and store entities into [`CacheValues`].

use std::sync::Arc;

use slug::slugify;

use crate::application::repos::SearchHit;
use crate::domain::{
    document::{DocumentNode, IS_DOC_ATTRIBUTE},
    entities::{ContentEntity, ContentTypeSchema},
    types::Provenance,
};

use super::values::{CacheValues, fields, format_store_date};

/// Copy an index hit, filling fields the index omits for template-less items.
pub fn from_search_hit(hit: &SearchHit) -> CacheValues {
    let mut values = CacheValues::from_map(Provenance::SearchIndex, hit.fields.clone());
    if values.lookup(&fields::TEMPLATE_ID).is_none() {
        values.insert("template", "0");
    }
    values
}

/// Attributes win over child elements; structured elements are kept verbatim
/// as their outer markup.
pub fn from_document(node: &Arc<DocumentNode>) -> CacheValues {
    let mut values = CacheValues::new(Provenance::Document).with_document(Arc::clone(node));

    for (name, value) in node.attributes() {
        if name == IS_DOC_ATTRIBUTE {
            continue;
        }
        values.insert(name, value);
    }

    for element in node.elements() {
        if element.is_doc() {
            continue;
        }
        let value = if element.is_structured() {
            element.outer_markup()
        } else {
            element.text()
        };
        values.insert_if_absent(element.name(), value);
    }

    if values.lookup(&fields::TYPE_ALIAS).is_none() {
        values.insert("nodeTypeAlias", node.name());
    }
    values
}

/// Every schema property is written, even when the entity has no value for it.
pub fn from_entity(entity: &ContentEntity, schema: &ContentTypeSchema) -> CacheValues {
    let mut values = CacheValues::new(Provenance::Store);

    values.insert("id", entity.id.to_string());
    values.insert("key", entity.key.to_string());
    values.insert("parentID", entity.parent_id.to_string());
    values.insert("path", entity.path.to_string());
    values.insert("level", entity.level.to_string());
    values.insert("sortOrder", entity.sort_order.to_string());
    values.insert("nodeName", entity.name.clone());
    values.insert("urlName", slugify(&entity.name));
    values.insert("nodeTypeAlias", entity.content_type_alias.clone());
    values.insert("nodeType", entity.content_type_id.to_string());
    values.insert("template", entity.template_id.unwrap_or(0).to_string());
    values.insert("writerName", entity.writer_name.clone());
    values.insert("writerID", entity.writer_id.to_string());
    values.insert("creatorName", entity.creator_name.clone());
    values.insert("creatorID", entity.creator_id.to_string());
    values.insert("createDate", format_store_date(entity.create_date));
    values.insert("updateDate", format_store_date(entity.update_date));

    for property in &schema.property_types {
        let value = entity
            .properties
            .get(&property.alias)
            .cloned()
            .unwrap_or_default();
        values.insert(property.alias.clone(), value);
    }

    values
}
