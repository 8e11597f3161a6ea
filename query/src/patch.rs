//! Optimistic patches over cached JSON data.
//!
//! A patch is a pure description of an edit. Applying it never mutates the
//! input, so the cache can keep the pre-patch value as a rollback snapshot.
//!
//! List patches work on a bare array or on the `items` array of a page
//! object, and find items by their `id` field (`"7"` matches `7`).

use crate::tag::id_text;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Edit applied to a cache entry before the server confirms a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Patch {
    /// Append `item` to the list, or replace the item with the same `id`
    InsertItem {
        /// New list item
        item: Value,
    },
    /// Shallow-merge `fields` into the list item with `id`
    UpdateItem {
        /// Item id
        id: Value,
        /// Fields to overwrite
        fields: Value,
    },
    /// Remove the list item with `id`
    RemoveItem {
        /// Item id
        id: Value,
    },
    /// Shallow-merge `fields` into an object result
    Merge {
        /// Fields to overwrite
        fields: Value,
    },
    /// Replace the whole result
    Replace {
        /// New result
        value: Value,
    },
}

impl Patch {
    /// Apply the patch to `target`, returning the edited copy
    ///
    /// A patch that does not fit the target's shape (a list patch on an
    /// object without `items`, a merge into a scalar) leaves it unchanged.
    #[must_use]
    pub fn apply(&self, target: &Value) -> Value {
        let mut next = target.clone();
        match self {
            Self::InsertItem { item } => {
                if let Some(items) = list_items_mut(&mut next) {
                    let position = item
                        .get("id")
                        .and_then(|id| items.iter().position(|existing| has_id(existing, id)));
                    match position {
                        Some(index) => items[index] = item.clone(),
                        None => items.push(item.clone()),
                    }
                }
            },
            Self::UpdateItem { id, fields } => {
                if let Some(existing) = list_items_mut(&mut next)
                    .and_then(|items| items.iter_mut().find(|existing| has_id(existing, id)))
                {
                    merge_fields(existing, fields);
                }
            },
            Self::RemoveItem { id } => {
                if let Some(items) = list_items_mut(&mut next) {
                    items.retain(|existing| !has_id(existing, id));
                }
            },
            Self::Merge { fields } => merge_fields(&mut next, fields),
            Self::Replace { value } => next = value.clone(),
        }
        next
    }
}

fn has_id(item: &Value, id: &Value) -> bool {
    item.get("id").is_some_and(|own| own == id || id_text(own) == id_text(id))
}

fn merge_fields(target: &mut Value, fields: &Value) {
    if let (Value::Object(target), Value::Object(fields)) = (target, fields) {
        for (name, value) in fields {
            target.insert(name.clone(), value.clone());
        }
    }
}

fn list_items_mut(value: &mut Value) -> Option<&mut Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(page) => page.get_mut("items").and_then(Value::as_array_mut),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events() -> Value {
        json!([
            { "id": 1, "title": "Fado Night" },
            { "id": 2, "title": "Jazz Brunch" },
            { "id": 3, "title": "Techno Cave" }
        ])
    }

    #[test]
    fn test_insert_appends() {
        let patched = Patch::InsertItem {
            item: json!({ "id": 4, "title": "Opera" }),
        }
        .apply(&events());

        assert_eq!(patched.as_array().map(Vec::len), Some(4));
        assert_eq!(events().as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let patched = Patch::InsertItem {
            item: json!({ "id": "2", "title": "Late Jazz" }),
        }
        .apply(&events());

        assert_eq!(patched.as_array().map(Vec::len), Some(3));
        assert_eq!(patched[1]["title"], "Late Jazz");
    }

    #[test]
    fn test_update_and_remove_in_page_object() {
        let page = json!({ "items": events(), "total": 3 });

        let updated = Patch::UpdateItem {
            id: json!(2),
            fields: json!({ "soldOut": true }),
        }
        .apply(&page);
        assert_eq!(updated["items"][1]["soldOut"], true);
        assert_eq!(updated["items"][1]["title"], "Jazz Brunch");

        let removed = Patch::RemoveItem { id: json!(1) }.apply(&updated);
        assert_eq!(removed["items"].as_array().map(Vec::len), Some(2));
        assert_eq!(removed["total"], 3);
    }

    #[test]
    fn test_merge_and_replace() {
        let event = json!({ "id": 9, "seatsLeft": 10 });
        let merged = Patch::Merge {
            fields: json!({ "seatsLeft": 8 }),
        }
        .apply(&event);
        assert_eq!(merged, json!({ "id": 9, "seatsLeft": 8 }));

        let replaced = Patch::Replace { value: json!(null) }.apply(&event);
        assert_eq!(replaced, Value::Null);
    }

    #[test]
    fn test_mismatched_shape_is_a_noop() {
        let scalar = json!("not a list");
        assert_eq!(Patch::RemoveItem { id: json!(1) }.apply(&scalar), scalar);
        assert_eq!(
            Patch::Merge {
                fields: json!({ "a": 1 })
            }
            .apply(&scalar),
            scalar
        );
    }

    #[test]
    fn test_serde_tagging() -> Result<(), serde_json::Error> {
        let patch: Patch = serde_json::from_value(json!({ "op": "remove_item", "id": 3 }))?;
        assert_eq!(patch, Patch::RemoveItem { id: json!(3) });
        Ok(())
    }
}
