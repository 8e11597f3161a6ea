//! File-backed [`PersistentStorage`].
//!
//! One file per key under a directory. Writes go to a temporary file that is
//! then renamed over the record, so a crash mid-write leaves the previous
//! record intact.

use futures::future::BoxFuture;
use marquee_core::environment::PersistentStorage;
use marquee_core::error::StorageError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Storage rooted at a directory, created on first write
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage under `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the records
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `key`
    ///
    /// Characters that are not portable in file names (`:` in
    /// `persist:root:cities`) are replaced with `_`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl PersistentStorage for FileStorage {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        Box::pin(async move {
            match tokio::fs::read_to_string(self.path_for(key)).await {
                Ok(text) => Ok(Some(text)),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
                Err(error) => Err(error.into()),
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir).await?;
            let path = self.path_for(key);
            let staging = path.with_extension("json.tmp");
            tokio::fs::write(&staging, value).await?;
            tokio::fs::rename(&staging, &path).await?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.path_for(key)).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
                Err(error) => Err(error.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_map_to_portable_names() {
        let storage = FileStorage::new("/tmp/marquee");
        assert_eq!(
            storage.path_for("persist:root:cities"),
            PathBuf::from("/tmp/marquee/persist_root_cities.json")
        );
    }

    #[tokio::test]
    async fn test_round_trip_and_remove() -> Result<(), StorageError> {
        let dir = tempfile::tempdir().map_err(StorageError::from)?;
        let storage = FileStorage::new(dir.path().join("state"));

        assert_eq!(storage.get("persist:root:cities").await?, None);

        storage.set("persist:root:cities", r#"{"version":1}"#.to_string()).await?;
        storage.set("persist:root:cities", r#"{"version":2}"#.to_string()).await?;
        assert_eq!(
            storage.get("persist:root:cities").await?.as_deref(),
            Some(r#"{"version":2}"#)
        );

        storage.remove("persist:root:cities").await?;
        storage.remove("persist:root:cities").await?;
        assert_eq!(storage.get("persist:root:cities").await?, None);
        Ok(())
    }
}
