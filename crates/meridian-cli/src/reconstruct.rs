//! Rehydrating entities purely from persisted state, for `destroy <id>` —
//! the only command that doesn't get a fresh provisioning context from the
//! CLI. Everything else (`create`, `run`) builds entities directly via
//! their own `load_or_create`, using the provider/variables resolved from
//! the current invocation's flags.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use meridian_config::UserVariables;
use meridian_driver::{ImageBuilder, InfraTool};
use meridian_entities::{hierarchy, Cluster, Image, ProviderIdentity};
use meridian_store::{get_typed, StateStore};

use crate::layout;

#[derive(serde::Deserialize)]
pub struct PersistedImage {
    pub name: String,
    pub provider: ProviderIdentity,
    pub template_path: String,
    pub config_path: String,
    pub user_vars: UserVariables,
}

#[derive(serde::Deserialize)]
pub struct PersistedCluster {
    pub name: String,
    pub image_name: String,
    pub provider: ProviderIdentity,
    pub template_path: String,
    pub config_path: String,
    pub user_vars: UserVariables,
}

#[derive(serde::Deserialize)]
pub struct PersistedStorage {
    pub name: String,
    pub image_name: String,
    pub cluster_name: String,
    pub disk_size: String,
    pub provider: ProviderIdentity,
    pub template_path: String,
    pub attached_template_path: String,
    pub config_path: String,
    pub user_vars: UserVariables,
}

pub async fn load_persisted_image(
    store: &Arc<dyn StateStore>,
    builder: &Arc<dyn ImageBuilder>,
    provider: &ProviderIdentity,
    credential_bytes: &[u8],
    name: &str,
) -> Result<Arc<Image>> {
    let fingerprint = provider.fingerprint(credential_bytes);
    let doc: PersistedImage = get_typed(&**store, &hierarchy("image", &fingerprint, name), "yaml")
        .await?
        .ok_or_else(|| anyhow!("image '{}' not found in persisted state", name))?;

    Image::load_or_create(
        doc.name,
        provider.clone(),
        doc.template_path,
        doc.config_path,
        doc.user_vars,
        credential_bytes,
        store.clone(),
        builder.clone(),
    )
    .await
    .map_err(Into::into)
}

#[allow(clippy::too_many_arguments)]
pub async fn load_persisted_cluster(
    store: &Arc<dyn StateStore>,
    builder: &Arc<dyn ImageBuilder>,
    infra: &Arc<dyn InfraTool>,
    root: &Path,
    provider: &ProviderIdentity,
    credential_bytes: &[u8],
    name: &str,
) -> Result<Arc<Cluster>> {
    let fingerprint = provider.fingerprint(credential_bytes);
    let doc: PersistedCluster = get_typed(&**store, &hierarchy("cluster", &fingerprint, name), "yaml")
        .await?
        .ok_or_else(|| anyhow!("cluster '{}' not found in persisted state", name))?;

    let image = load_persisted_image(store, builder, provider, credential_bytes, &doc.image_name)
        .await
        .with_context(|| format!("loading image '{}' for cluster '{}'", doc.image_name, name))?;

    Cluster::load_or_create(
        doc.name,
        doc.image_name,
        image,
        provider.clone(),
        doc.template_path,
        doc.config_path,
        layout::workspace_dir(root, "cluster", &fingerprint, name),
        doc.user_vars,
        credential_bytes,
        store.clone(),
        infra.clone(),
    )
    .await
    .map_err(Into::into)
}
