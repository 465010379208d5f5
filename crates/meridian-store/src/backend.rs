use async_trait::async_trait;

use crate::error::StoreError;

/// A document store keyed by hierarchy path. Entity kinds decide what
/// `suffix` and `hierarchy` mean; this trait only knows how to put, get, and
/// test for a YAML document at the path they describe.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, hierarchy: &[String], suffix: &str, value: &serde_yaml::Value) -> Result<(), StoreError>;
    async fn get(&self, hierarchy: &[String], suffix: &str) -> Result<Option<serde_yaml::Value>, StoreError>;
    async fn has(&self, hierarchy: &[String], suffix: &str) -> Result<bool, StoreError>;
}

/// Typed convenience wrapper around [`StateStore::put`]. A free function
/// rather than a trait method, so `StateStore` itself stays object-safe for
/// use as `Arc<dyn StateStore>`.
pub async fn put_typed<T>(
    store: &dyn StateStore,
    hierarchy: &[String],
    suffix: &str,
    value: &T,
) -> Result<(), StoreError>
where
    T: serde::Serialize + Sync,
{
    let doc = serde_yaml::to_value(value).map_err(|e| StoreError::Serialization {
        path: hierarchy.join("/"),
        source: e,
    })?;
    store.put(hierarchy, suffix, &doc).await
}

/// Typed convenience wrapper around [`StateStore::get`].
pub async fn get_typed<T>(
    store: &dyn StateStore,
    hierarchy: &[String],
    suffix: &str,
) -> Result<Option<T>, StoreError>
where
    T: serde::de::DeserializeOwned,
{
    match store.get(hierarchy, suffix).await? {
        Some(doc) => {
            let value = serde_yaml::from_value(doc).map_err(|e| StoreError::Serialization {
                path: hierarchy.join("/"),
                source: e,
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}
