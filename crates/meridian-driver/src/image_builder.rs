use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::DriverError;

/// Everything a builder needs to produce (or tear down) one cloud image.
#[derive(Debug, Clone)]
pub struct ImageBuildSpec {
    pub name: String,
    pub template_path: PathBuf,
    pub config_path: PathBuf,
    pub user_variables: BTreeMap<String, String>,
}

/// Identifying metadata the builder emits — including the configuration
/// hash the image-exists check (spec §4.7) compares against.
#[derive(Debug, Clone)]
pub struct ImageBuildResult {
    pub image_id: String,
    pub config_hash: String,
}

/// Consumed contract for the external image builder (Packer in the system
/// this was modeled on). Invoked as a subprocess; produces a named cloud
/// image plus identifying metadata.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, spec: &ImageBuildSpec) -> Result<ImageBuildResult, DriverError>;
    async fn destroy(&self, spec: &ImageBuildSpec) -> Result<(), DriverError>;

    /// Compares `spec`'s variables against whatever is already built,
    /// returning the remote config hash if a matching image already exists.
    async fn existing_config_hash(&self, spec: &ImageBuildSpec) -> Result<Option<String>, DriverError>;
}

/// Stub used under `--simulate` and in tests: never shells out, fabricates
/// plausible identifiers.
#[derive(Debug, Default, Clone)]
pub struct LocalImageBuilder;

impl LocalImageBuilder {
    pub fn new() -> Self {
        LocalImageBuilder
    }
}

#[async_trait]
impl ImageBuilder for LocalImageBuilder {
    async fn build(&self, spec: &ImageBuildSpec) -> Result<ImageBuildResult, DriverError> {
        Ok(ImageBuildResult {
            image_id: format!("local-image-{}", spec.name),
            config_hash: config_hash(&spec.user_variables),
        })
    }

    async fn destroy(&self, _spec: &ImageBuildSpec) -> Result<(), DriverError> {
        Ok(())
    }

    async fn existing_config_hash(&self, _spec: &ImageBuildSpec) -> Result<Option<String>, DriverError> {
        Ok(None)
    }
}

/// Canonical-JSON-then-hash config fingerprint, shared by the local stub and
/// the real builder so both agree on what "unchanged" means.
pub fn config_hash(vars: &BTreeMap<String, String>) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for (k, v) in vars {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
