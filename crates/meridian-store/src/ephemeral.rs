use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::StateStore;
use crate::durable::DurableStore;
use crate::error::StoreError;

fn key(hierarchy: &[String], suffix: &str) -> String {
    format!("{}.{}", hierarchy.join("/"), suffix)
}

/// In-process map used for `--simulate` runs. Writes never touch disk; reads
/// and existence checks that miss the in-process map fall through to the
/// durable backend *read-only*, so a simulated run can see real state
/// without being able to mutate it.
#[derive(Clone)]
pub struct EphemeralStore {
    memory: Arc<RwLock<HashMap<String, serde_yaml::Value>>>,
    fallback: Arc<DurableStore>,
}

impl EphemeralStore {
    pub fn new(fallback: Arc<DurableStore>) -> Self {
        EphemeralStore {
            memory: Arc::new(RwLock::new(HashMap::new())),
            fallback,
        }
    }
}

#[async_trait]
impl StateStore for EphemeralStore {
    async fn put(&self, hierarchy: &[String], suffix: &str, value: &serde_yaml::Value) -> Result<(), StoreError> {
        let mut guard = self.memory.write().await;
        guard.insert(key(hierarchy, suffix), value.clone());
        Ok(())
    }

    async fn get(&self, hierarchy: &[String], suffix: &str) -> Result<Option<serde_yaml::Value>, StoreError> {
        {
            let guard = self.memory.read().await;
            if let Some(v) = guard.get(&key(hierarchy, suffix)) {
                return Ok(Some(v.clone()));
            }
        }
        self.fallback.get(hierarchy, suffix).await
    }

    async fn has(&self, hierarchy: &[String], suffix: &str) -> Result<bool, StoreError> {
        {
            let guard = self.memory.read().await;
            if guard.contains_key(&key(hierarchy, suffix)) {
                return Ok(true);
            }
        }
        self.fallback.has(hierarchy, suffix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    #[tokio::test]
    async fn writes_stay_local_and_do_not_touch_durable() {
        let dir = tempfile::tempdir().unwrap();
        let durable = Arc::new(DurableStore::new(dir.path()));
        let ephemeral = EphemeralStore::new(durable.clone());

        let hier = vec!["image".to_string(), "fp".to_string(), "a".to_string()];
        let doc: Value = serde_yaml::from_str("status: 2").unwrap();
        ephemeral.put(&hier, "yaml", &doc).await.unwrap();

        assert!(ephemeral.has(&hier, "yaml").await.unwrap());
        assert!(!durable.has(&hier, "yaml").await.unwrap());
    }

    #[tokio::test]
    async fn reads_fall_through_to_durable_on_miss() {
        let dir = tempfile::tempdir().unwrap();
        let durable = Arc::new(DurableStore::new(dir.path()));

        let hier = vec!["cluster".to_string(), "fp".to_string(), "dev".to_string()];
        let doc: Value = serde_yaml::from_str("status: 1").unwrap();
        durable.put(&hier, "yaml", &doc).await.unwrap();

        let ephemeral = EphemeralStore::new(durable);
        let got = ephemeral.get(&hier, "yaml").await.unwrap();
        assert_eq!(got, Some(doc));
    }

    #[tokio::test]
    async fn local_write_shadows_durable_value() {
        let dir = tempfile::tempdir().unwrap();
        let durable = Arc::new(DurableStore::new(dir.path()));

        let hier = vec!["cluster".to_string(), "fp".to_string(), "dev".to_string()];
        let on_disk: Value = serde_yaml::from_str("status: 1").unwrap();
        durable.put(&hier, "yaml", &on_disk).await.unwrap();

        let ephemeral = EphemeralStore::new(durable.clone());
        let simulated: Value = serde_yaml::from_str("status: 2").unwrap();
        ephemeral.put(&hier, "yaml", &simulated).await.unwrap();

        assert_eq!(ephemeral.get(&hier, "yaml").await.unwrap(), Some(simulated));
        assert_eq!(durable.get(&hier, "yaml").await.unwrap(), Some(on_disk));
    }
}
