//! Persistence configuration.

use crate::error::PersistError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to persist and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistConfig {
    /// Prefix of every storage key
    pub root_key: String,
    /// Schema version written into each record
    pub version: u32,
    /// Slices to persist, by field name in the application state
    pub whitelist: Vec<String>,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            root_key: "persist:root".to_string(),
            version: 1,
            whitelist: Vec::new(),
        }
    }
}

impl PersistConfig {
    /// Defaults with the given whitelist
    #[must_use]
    pub fn new<I, T>(whitelist: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            whitelist: whitelist.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the key prefix
    #[must_use]
    pub fn with_root_key(mut self, root_key: impl Into<String>) -> Self {
        self.root_key = root_key.into();
        self
    }

    /// Set the schema version
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Storage key of `slice`
    #[must_use]
    pub fn storage_key(&self, slice: &str) -> String {
        format!("{}:{slice}", self.root_key)
    }
}

/// Stored record: the slice state tagged with the schema version
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    state: Value,
}

/// Wrap `state` for storage
pub(crate) fn seal(version: u32, state: &Value) -> Result<String, PersistError> {
    Ok(serde_json::to_string(&Envelope {
        version,
        state: state.clone(),
    })?)
}

/// Unwrap a stored record, checking its version
pub(crate) fn open(expected: u32, text: &str) -> Result<Value, PersistError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if envelope.version != expected {
        return Err(PersistError::VersionMismatch {
            expected,
            found: envelope.version,
        });
    }
    Ok(envelope.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_storage_key() {
        let config = PersistConfig::new(["cities"]).with_root_key("persist:app");
        assert_eq!(config.storage_key("cities"), "persist:app:cities");
        assert_eq!(config.whitelist, vec!["cities".to_string()]);
    }

    #[test]
    fn test_seal_and_open() -> Result<(), PersistError> {
        let text = seal(3, &json!({ "selected": "sf" }))?;
        assert_eq!(text, r#"{"version":3,"state":{"selected":"sf"}}"#);
        assert_eq!(open(3, &text)?, json!({ "selected": "sf" }));
        Ok(())
    }

    #[test]
    fn test_open_rejects_other_versions_and_garbage() {
        let text = r#"{"version":1,"state":{}}"#;
        assert!(matches!(
            open(2, text),
            Err(PersistError::VersionMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(open(1, "{not json"), Err(PersistError::Serialization(_))));
        assert!(matches!(open(1, r#"{"selected":"sf"}"#), Err(PersistError::Serialization(_))));
    }
}
