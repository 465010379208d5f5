use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::backend::StateStore;
use crate::error::StoreError;
use crate::path::document_path;

/// One `serde_yaml` document per entity, on disk under `<root>/state/...`.
/// Directories are created on demand with group-read permissions; writes
/// truncate, so a partial write never leaves a document that mixes old and
/// new content.
#[derive(Debug, Clone)]
pub struct DurableStore {
    root: PathBuf,
}

impl DurableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DurableStore { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl StateStore for DurableStore {
    async fn put(&self, hierarchy: &[String], suffix: &str, value: &serde_yaml::Value) -> Result<(), StoreError> {
        let path = document_path(&self.root, hierarchy, suffix);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| StoreError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o750);
                let _ = tokio::fs::set_permissions(parent, perms).await;
            }
        }

        let content = serde_yaml::to_string(value).map_err(|e| StoreError::Serialization {
            path: path.display().to_string(),
            source: e,
        })?;

        debug!(path = %path.display(), "writing state document");

        tokio::fs::write(&path, content).await.map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    async fn get(&self, hierarchy: &[String], suffix: &str) -> Result<Option<serde_yaml::Value>, StoreError> {
        let path = document_path(&self.root, hierarchy, suffix);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        let value = serde_yaml::from_str(&content).map_err(|e| StoreError::Serialization {
            path: path.display().to_string(),
            source: e,
        })?;

        Ok(Some(value))
    }

    async fn has(&self, hierarchy: &[String], suffix: &str) -> Result<bool, StoreError> {
        let path = document_path(&self.root, hierarchy, suffix);
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::new(dir.path());
        let hier = vec!["image".to_string(), "fp123".to_string(), "centos".to_string()];

        let doc: Value = serde_yaml::from_str("status: 2\nname: centos").unwrap();
        store.put(&hier, "yaml", &doc).await.unwrap();

        assert!(store.has(&hier, "yaml").await.unwrap());
        let got = store.get(&hier, "yaml").await.unwrap().unwrap();
        assert_eq!(got, doc);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::new(dir.path());
        let hier = vec!["image".to_string(), "fp123".to_string(), "nope".to_string()];
        assert!(store.get(&hier, "yaml").await.unwrap().is_none());
        assert!(!store.has(&hier, "yaml").await.unwrap());
    }

    #[tokio::test]
    async fn reopening_the_same_root_survives() {
        let dir = tempfile::tempdir().unwrap();
        let hier = vec!["cluster".to_string(), "fp1".to_string(), "dev".to_string()];

        {
            let store = DurableStore::new(dir.path());
            let doc: Value = serde_yaml::from_str("status: 1").unwrap();
            store.put(&hier, "yaml", &doc).await.unwrap();
        }

        let reopened = DurableStore::new(dir.path());
        let got = reopened.get(&hier, "yaml").await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn writes_truncate_rather_than_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::new(dir.path());
        let hier = vec!["image".to_string(), "fp".to_string(), "a".to_string()];

        let first: Value = serde_yaml::from_str("status: 1\nextra_field: present").unwrap();
        store.put(&hier, "yaml", &first).await.unwrap();

        let second: Value = serde_yaml::from_str("status: 2").unwrap();
        store.put(&hier, "yaml", &second).await.unwrap();

        let got = store.get(&hier, "yaml").await.unwrap().unwrap();
        assert_eq!(got, second);
    }
}
