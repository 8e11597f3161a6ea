//! Invalidation tags.
//!
//! A tag names either a whole collection (`EventList`) or one entity
//! (`Event:42`). Query endpoints *provide* tags for the data they return;
//! mutation endpoints *invalidate* tags once the server confirms the write.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Invalidation tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Tag {
    /// A whole collection, e.g. `EventList`
    Collection(String),
    /// One entity, e.g. `Event:42`
    Entity {
        /// Entity type, e.g. `Event`
        kind: String,
        /// Entity id as text
        id: String,
    },
}

impl Tag {
    /// Collection tag
    #[must_use]
    pub fn collection(name: impl Into<String>) -> Self {
        Self::Collection(name.into())
    }

    /// Entity tag; string ids are used verbatim, other JSON ids by their text
    #[must_use]
    pub fn entity(kind: impl Into<String>, id: &Value) -> Self {
        Self::Entity {
            kind: kind.into(),
            id: id_text(id),
        }
    }
}

/// Text form of an entity id (`"7"` and `7` name the same entity)
#[must_use]
pub fn id_text(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection(name) => f.write_str(name),
            Self::Entity { kind, id } => write!(f, "{kind}:{id}"),
        }
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

/// Error parsing a tag from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid tag: {0:?}")]
pub struct ParseTagError(String);

impl FromStr for Tag {
    type Err = ParseTagError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.split_once(':') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() => Ok(Self::Entity {
                kind: kind.to_string(),
                id: id.to_string(),
            }),
            None if !text.is_empty() => Ok(Self::Collection(text.to_string())),
            _ => Err(ParseTagError(text.to_string())),
        }
    }
}

impl TryFrom<String> for Tag {
    type Error = ParseTagError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

/// Items of a list result: a bare array, or the `items` array of a page object
#[must_use]
pub fn list_items(result: &Value) -> Option<&Vec<Value>> {
    match result {
        Value::Array(items) => Some(items),
        Value::Object(page) => page.get("items").and_then(Value::as_array),
        _ => None,
    }
}

/// Tags for a list result: the collection plus one entity tag per item `id`
#[must_use]
pub fn list_tags(collection: &str, kind: &str, result: &Value) -> Vec<Tag> {
    let mut tags = vec![Tag::collection(collection)];
    if let Some(items) = list_items(result) {
        tags.extend(
            items
                .iter()
                .filter_map(|item| item.get("id"))
                .map(|id| Tag::entity(kind, id)),
        );
    }
    tags
}
