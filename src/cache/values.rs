//! Flat attribute maps read from the index, the document tree or the store.
//!
//! Field names drift between sources (`id` in the store, `__NodeId` in the
//! index, ...), so each logical field carries an ordered alias list.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use time::{
    OffsetDateTime, PrimitiveDateTime, format_description::FormatItem, macros::format_description,
};

use crate::domain::{document::DocumentNode, types::Provenance};

/// Prefix marking the unescaped variant of an index field.
pub const RAW_FIELD_PREFIX: &str = "__Raw_";

/// Format used for dates written by the store and the document tree.
pub const STORE_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Ticks (100 ns units) between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: i128 = 621_355_968_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

impl Field {
    const fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases }
    }
}

pub mod fields {
    use super::Field;

    pub const ID: Field = Field::new("id", &["id", "nodeId", "__NodeId"]);
    pub const KEY: Field = Field::new("key", &["key", "__key", "__Key"]);
    pub const PARENT_ID: Field = Field::new("parent id", &["parentID", "__ParentId"]);
    pub const PATH: Field = Field::new("path", &["path", "__Path"]);
    pub const SORT_ORDER: Field = Field::new("sort order", &["sortOrder"]);
    pub const LEVEL: Field = Field::new("level", &["level"]);
    pub const TYPE_ALIAS: Field =
        Field::new("type alias", &["nodeTypeAlias", "__NodeTypeAlias"]);

    pub const NAME: Field = Field::new("name", &["nodeName", "__nodeName"]);
    pub const URL_NAME: Field = Field::new("url name", &["urlName"]);
    pub const TYPE_ID: Field = Field::new("type id", &["nodeType"]);
    pub const TEMPLATE_ID: Field = Field::new("template id", &["template", "templateId"]);
    pub const WRITER_NAME: Field = Field::new("writer name", &["writerName"]);
    pub const WRITER_ID: Field = Field::new("writer id", &["writerID"]);
    // creator falls back to the writer when the source never recorded one
    pub const CREATOR_NAME: Field = Field::new("creator name", &["creatorName", "writerName"]);
    pub const CREATOR_ID: Field = Field::new("creator id", &["creatorID", "writerID"]);
    pub const CREATE_DATE: Field = Field::new("create date", &["createDate"]);
    pub const UPDATE_DATE: Field = Field::new("update date", &["updateDate"]);

    pub const MANDATORY: &[Field] = &[ID, KEY, PARENT_ID, PATH, SORT_ORDER, LEVEL, TYPE_ALIAS];

    pub const ALL: &[Field] = &[
        ID,
        KEY,
        PARENT_ID,
        PATH,
        SORT_ORDER,
        LEVEL,
        TYPE_ALIAS,
        NAME,
        URL_NAME,
        TYPE_ID,
        TEMPLATE_ID,
        WRITER_NAME,
        WRITER_ID,
        CREATOR_NAME,
        CREATOR_ID,
        CREATE_DATE,
        UPDATE_DATE,
    ];
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValuesError {
    #[error("values are missing the mandatory {field} field (tried {})", .aliases.join(", "))]
    MissingField {
        field: &'static str,
        aliases: &'static [&'static str],
    },
    #[error("value `{value}` for the {field} field is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("values are inconsistent: {message}")]
    Inconsistent { message: String },
}

impl ValuesError {
    fn invalid(field: &Field, value: &str, reason: impl ToString) -> Self {
        Self::InvalidField {
            field: field.name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// String-keyed attribute map plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValues {
    values: BTreeMap<String, String>,
    provenance: Provenance,
    document: Option<Arc<DocumentNode>>,
}

impl CacheValues {
    pub fn new(provenance: Provenance) -> Self {
        Self {
            values: BTreeMap::new(),
            provenance,
            document: None,
        }
    }

    pub fn from_map(provenance: Provenance, values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            provenance,
            document: None,
        }
    }

    pub fn with_document(mut self, document: Arc<DocumentNode>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn document(&self) -> Option<&Arc<DocumentNode>> {
        self.document.as_ref()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn insert_if_absent(&mut self, key: &str, value: impl Into<String>) {
        if !self.values.contains_key(key) {
            self.values.insert(key.to_string(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First value found under any of the field's aliases.
    pub fn lookup(&self, field: &Field) -> Option<&str> {
        field.aliases.iter().find_map(|alias| self.get(alias))
    }

    pub fn require(&self, field: &Field) -> Result<&str, ValuesError> {
        self.lookup(field).ok_or(ValuesError::MissingField {
            field: field.name,
            aliases: field.aliases,
        })
    }

    pub fn parse_required<T>(&self, field: &Field) -> Result<T, ValuesError>
    where
        T: FromStr,
        T::Err: ToString,
    {
        let raw = self.require(field)?;
        raw.trim()
            .parse()
            .map_err(|err: T::Err| ValuesError::invalid(field, raw, err))
    }

    pub fn parse_optional<T>(&self, field: &Field) -> Result<Option<T>, ValuesError>
    where
        T: FromStr,
        T::Err: ToString,
    {
        match self.lookup(field) {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|err: T::Err| ValuesError::invalid(field, raw, err)),
        }
    }

    /// Parse a date field according to this map's provenance.
    pub fn parse_date(&self, field: &Field) -> Result<Option<OffsetDateTime>, ValuesError> {
        match self.lookup(field) {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_date(raw, self.provenance)
                .map(Some)
                .map_err(|reason| ValuesError::invalid(field, raw, reason)),
        }
    }

    /// Path value, used by the memoizer to evict descendants.
    pub fn path(&self) -> Option<&str> {
        self.lookup(&fields::PATH)
    }
}

/// True for keys that map onto node attributes rather than properties.
pub fn is_standard_key(key: &str) -> bool {
    key.starts_with("__")
        || fields::ALL
            .iter()
            .any(|field| field.aliases.contains(&key))
}

/// Index dates are tick counts; other sources use [`STORE_DATE_FORMAT`].
pub fn parse_date(raw: &str, provenance: Provenance) -> Result<OffsetDateTime, String> {
    let trimmed = raw.trim();
    if provenance == Provenance::SearchIndex {
        if let Ok(ticks) = trimmed.parse::<i64>() {
            return from_ticks(ticks);
        }
    }
    PrimitiveDateTime::parse(trimmed, STORE_DATE_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|err| err.to_string())
}

pub fn from_ticks(ticks: i64) -> Result<OffsetDateTime, String> {
    let nanos = (i128::from(ticks) - UNIX_EPOCH_TICKS) * 100;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|err| err.to_string())
}

pub fn to_ticks(value: OffsetDateTime) -> i64 {
    let ticks = value.unix_timestamp_nanos() / 100 + UNIX_EPOCH_TICKS;
    i64::try_from(ticks).unwrap_or(i64::MAX)
}

pub fn format_store_date(value: OffsetDateTime) -> String {
    value
        .format(STORE_DATE_FORMAT)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn lookup_tries_aliases_in_order() {
        let mut values = CacheValues::new(Provenance::SearchIndex);
        values.insert("__NodeId", "12");
        assert_eq!(values.lookup(&fields::ID), Some("12"));

        values.insert("id", "13");
        assert_eq!(values.lookup(&fields::ID), Some("13"));
    }

    #[test]
    fn missing_field_names_every_alias() {
        let values = CacheValues::new(Provenance::Store);
        let err = values.require(&fields::KEY).expect_err("key is missing");

        assert_eq!(
            err,
            ValuesError::MissingField {
                field: "key",
                aliases: &["key", "__key", "__Key"],
            }
        );
        assert_eq!(
            err.to_string(),
            "values are missing the mandatory key field (tried key, __key, __Key)"
        );
    }

    #[test]
    fn index_dates_are_ticks_and_store_dates_are_formatted() {
        let expected = datetime!(2024-03-01 12:30:00 UTC);
        let ticks = to_ticks(expected).to_string();

        assert_eq!(parse_date(&ticks, Provenance::SearchIndex), Ok(expected));
        assert_eq!(
            parse_date("2024-03-01T12:30:00", Provenance::Store),
            Ok(expected)
        );
        // a store-formatted value inside an index hit still parses
        assert_eq!(
            parse_date("2024-03-01T12:30:00", Provenance::SearchIndex),
            Ok(expected)
        );
        // ticks are never accepted from the store
        assert!(parse_date(&ticks, Provenance::Store).is_err());
    }

    #[test]
    fn creator_falls_back_to_writer() {
        let mut values = CacheValues::new(Provenance::Store);
        values.insert("writerName", "editor");
        assert_eq!(values.lookup(&fields::CREATOR_NAME), Some("editor"));
    }

    #[test]
    fn standard_keys_are_recognised() {
        assert!(is_standard_key("nodeName"));
        assert!(is_standard_key("__IndexType"));
        assert!(!is_standard_key("bodyText"));
    }
}
