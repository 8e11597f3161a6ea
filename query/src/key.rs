//! Canonical cache keys.
//!
//! A key is `endpoint(<canonical args>)` where the arguments are serialized as
//! JSON with object fields sorted by name at every depth. Two argument
//! records that are structurally equal always produce the same key, whatever
//! order their fields were built in.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Identity of one query cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Key for `endpoint` called with `args`
    #[must_use]
    pub fn new(endpoint: &str, args: &Value) -> Self {
        let mut key = String::with_capacity(endpoint.len() + 2);
        key.push_str(endpoint);
        key.push('(');
        write_canonical(&mut key, args);
        key.push(')');
        Self(key.into())
    }

    /// Endpoint part of the key
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.0.split_once('(').map_or(&self.0, |(endpoint, _)| endpoint)
    }

    /// Full key text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical JSON text of `value`
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(fields) => {
            let mut names: Vec<&String> = fields.keys().collect();
            names.sort_unstable();
            out.push('{');
            for (index, name) in names.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(out, name);
                out.push(':');
                if let Some(field) = fields.get(name) {
                    write_canonical(out, field);
                }
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        },
        Value::String(text) => write_string(out, text),
        Value::Null | Value::Bool(_) | Value::Number(_) => {
            let _ = write!(out, "{value}");
        },
    }
}

fn write_string(out: &mut String, text: &str) {
    // Display on a JSON string value escapes it
    let _ = write!(out, "{}", Value::String(text.to_string()));
}
