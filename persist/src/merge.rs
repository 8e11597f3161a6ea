//! Two-level state reconciliation.
//!
//! Persisted state is written by an older session and may lack fields that
//! the current defaults introduce. Merging fills those gaps:
//!
//! - level 1 (slices): every slice of the default is kept; persisted slices
//!   override it
//! - level 2 (slice fields): when both sides hold an object, fields are
//!   merged key by key and the persisted field wins
//! - anything deeper (arrays, nested objects inside a field, primitives)
//!   is taken from the persisted side wholesale

use serde_json::{Map, Value};

/// Merge `persisted` over `default`, two levels deep
///
/// # Example
///
/// ```
/// use marquee_persist::merge::merge_level2;
/// use serde_json::json;
///
/// let default = json!({ "cities": { "selected": null, "list": [] } });
/// let persisted = json!({ "cities": { "selected": "sf" } });
///
/// assert_eq!(
///     merge_level2(&default, &persisted),
///     json!({ "cities": { "selected": "sf", "list": [] } })
/// );
/// ```
#[must_use]
pub fn merge_level2(default: &Value, persisted: &Value) -> Value {
    let (Value::Object(defaults), Value::Object(saved)) = (default, persisted) else {
        return persisted.clone();
    };

    let mut merged = defaults.clone();
    for (slice, saved_slice) in saved {
        let value = match (defaults.get(slice), saved_slice) {
            (Some(Value::Object(default_fields)), Value::Object(saved_fields)) => {
                Value::Object(shallow_merge(default_fields, saved_fields))
            },
            _ => saved_slice.clone(),
        };
        merged.insert(slice.clone(), value);
    }
    Value::Object(merged)
}

fn shallow_merge(defaults: &Map<String, Value>, saved: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (field, value) in saved {
        merged.insert(field.clone(), value.clone());
    }
    merged
}
