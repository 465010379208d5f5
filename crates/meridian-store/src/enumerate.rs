use crate::error::StoreError;
use crate::path::hierarchy_from_path;
use crate::registry::HandlerRegistry;

/// One document found while walking `state/`, already matched to a
/// registered entity kind.
pub struct EnumeratedDocument {
    pub id: String,
    pub kind: &'static str,
    pub hierarchy: Vec<String>,
    pub raw: serde_yaml::Value,
}

/// Walk `root/state`, compute each document's id, run `filter` against it,
/// and for every hit resolve the owning kind via `registry`. Documents whose
/// hierarchy no registered handler accepts are silently skipped — the same
/// behavior as finding no accepting handler upstream.
pub async fn enumerate(
    root: &std::path::Path,
    registry: &HandlerRegistry,
    filter: impl Fn(&str) -> bool,
) -> Result<Vec<EnumeratedDocument>, StoreError> {
    let state_root = root.join("state");
    let mut out = Vec::new();

    if tokio::fs::metadata(&state_root).await.is_err() {
        return Ok(out);
    }

    let mut stack = vec![state_root.clone()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| StoreError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::Io {
            path: dir.display().to_string(),
            source: e,
        })? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                source: e,
            })?;

            if file_type.is_dir() {
                stack.push(path);
                continue;
            }

            let Some((hierarchy, id)) = hierarchy_from_path(root, &path) else {
                continue;
            };

            if !filter(&id) {
                continue;
            }

            let Some(kind) = registry.resolve(&hierarchy) else {
                continue;
            };

            let content = tokio::fs::read_to_string(&path).await.map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                source: e,
            })?;

            let raw = serde_yaml::from_str(&content).map_err(|e| StoreError::Serialization {
                path: path.display().to_string(),
                source: e,
            })?;

            out.push(EnumeratedDocument { id, kind, hierarchy, raw });
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StateStore;
    use crate::durable::DurableStore;

    #[tokio::test]
    async fn enumerate_finds_registered_kinds_and_skips_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::new(dir.path());

        let image_hier = vec!["image".to_string(), "fp1".to_string(), "centos".to_string()];
        let doc: serde_yaml::Value = serde_yaml::from_str("status: 2").unwrap();
        store.put(&image_hier, "yaml", &doc).await.unwrap();

        let mystery_hier = vec!["mystery".to_string(), "fp1".to_string(), "x".to_string()];
        store.put(&mystery_hier, "yaml", &doc).await.unwrap();

        let mut registry = HandlerRegistry::new();
        registry.register("image", Box::new(|h| h.first().map(String::as_str) == Some("image")));

        let found = enumerate(dir.path(), &registry, |_| true).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, "image");
        assert_eq!(found[0].id, "image/fp1/centos");
    }

    #[tokio::test]
    async fn enumerate_on_missing_state_dir_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HandlerRegistry::new();
        let found = enumerate(dir.path(), &registry, |_| true).await.unwrap();
        assert!(found.is_empty());
    }
}
