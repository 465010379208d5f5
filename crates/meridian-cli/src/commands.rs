use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use meridian_config::{load_parameters, merge_vars, parse_vars_flag, ServiceParams, UserVariables};
use meridian_domain::Target;
use meridian_driver::{ImageBuilder, InfraTool, LocalImageBuilder, LocalInfraTool, SubprocessInfraTool};
use meridian_engine::reach_target;
use meridian_entities::{
    Cluster, ClusterStatus, Image, ImageStatus, ProviderIdentity, RunTask, RunTaskStatus, Ssh2Connector,
    SshConnector, Storage, StorageStatus,
};
use meridian_store::{DurableStore, EphemeralStore, HandlerRegistry, StateStore};
use tracing::info;

use crate::cli::{CreateKind, ProvisioningArgs, RunArgs};
use crate::layout;
use crate::output;
use crate::reconstruct::{self, PersistedCluster, PersistedImage, PersistedStorage};

struct Resolved {
    provider: ProviderIdentity,
    credential_bytes: Vec<u8>,
    user_vars: UserVariables,
    service_params: ServiceParams,
}

fn resolve_provisioning(args: &ProvisioningArgs) -> Result<Resolved> {
    let credential_bytes = std::fs::read(&args.credentials)
        .with_context(|| format!("reading credentials file {}", args.credentials.display()))?;

    let provider = ProviderIdentity {
        name: args.provider.clone(),
        region: args.region.clone(),
        zone: args.zone.clone(),
        credentials_path: args.credentials.display().to_string(),
    };

    let from_file = match &args.parameters {
        Some(path) => {
            load_parameters(path).with_context(|| format!("loading parameters file {}", path.display()))?
        }
        None => UserVariables::new(),
    };
    let overlay = match &args.vars {
        Some(raw) => parse_vars_flag(raw)?,
        None => UserVariables::new(),
    };
    let user_vars = merge_vars(from_file, overlay);

    let service_params = if ServiceParams::socks_enabled_by_env() {
        ServiceParams::new(args.socks_host.clone(), args.socks_port)
    } else {
        ServiceParams::default()
    };

    Ok(Resolved { provider, credential_bytes, user_vars, service_params })
}

fn build_store(root: &Path, simulate: bool) -> Arc<dyn StateStore> {
    let durable = Arc::new(DurableStore::new(root));
    if simulate {
        Arc::new(EphemeralStore::new(durable))
    } else {
        durable
    }
}

fn build_infra_tool(root: &Path, simulate: bool) -> Arc<dyn InfraTool> {
    if simulate {
        Arc::new(LocalInfraTool::new())
    } else {
        Arc::new(SubprocessInfraTool::new("terraform", layout::logs_dir(root)))
    }
}

fn build_image_builder(_simulate: bool) -> Arc<dyn ImageBuilder> {
    // No concrete (subprocess) image builder exists yet; both real and
    // simulated runs use the local stub until one is grounded.
    Arc::new(LocalImageBuilder::new())
}

pub async fn create(root: &Path, simulate: bool, kind: CreateKind) -> Result<()> {
    match kind {
        CreateKind::Image { provisioning, name } => create_image(root, simulate, &provisioning, &name).await,
        CreateKind::Cluster { provisioning, name, image_name } => {
            create_cluster(root, simulate, &provisioning, &name, &image_name).await
        }
        CreateKind::Storage { provisioning, name, image_name, cluster_name, disk_size } => {
            create_storage(root, simulate, &provisioning, &name, &image_name, &cluster_name, &disk_size).await
        }
    }
}

async fn create_image(root: &Path, simulate: bool, provisioning: &ProvisioningArgs, name: &str) -> Result<()> {
    let resolved = resolve_provisioning(provisioning)?;
    let store = build_store(root, simulate);
    let builder = build_image_builder(simulate);
    let fingerprint = resolved.provider.fingerprint(&resolved.credential_bytes);

    let image = Image::load_or_create(
        name.to_string(),
        resolved.provider.clone(),
        layout::template_path(root, "image"),
        layout::config_path(root, "image", &fingerprint, name),
        resolved.user_vars,
        &resolved.credential_bytes,
        store,
        builder,
    )
    .await?;

    reach_target(Target::new(image, Box::new(ImageStatus::Created), false), simulate).await?;
    info!(image = name, "image reached Created");
    Ok(())
}

async fn create_cluster(
    root: &Path,
    simulate: bool,
    provisioning: &ProvisioningArgs,
    name: &str,
    image_name: &str,
) -> Result<()> {
    let resolved = resolve_provisioning(provisioning)?;
    let store = build_store(root, simulate);
    let builder = build_image_builder(simulate);
    let infra = build_infra_tool(root, simulate);
    let fingerprint = resolved.provider.fingerprint(&resolved.credential_bytes);

    let image = Image::load_or_create(
        image_name.to_string(),
        resolved.provider.clone(),
        layout::template_path(root, "image"),
        layout::config_path(root, "image", &fingerprint, image_name),
        resolved.user_vars.clone(),
        &resolved.credential_bytes,
        store.clone(),
        builder,
    )
    .await?;

    let cluster = Cluster::load_or_create(
        name.to_string(),
        image_name.to_string(),
        image,
        resolved.provider.clone(),
        layout::template_path(root, "cluster"),
        layout::config_path(root, "cluster", &fingerprint, name),
        layout::workspace_dir(root, "cluster", &fingerprint, name),
        resolved.user_vars,
        &resolved.credential_bytes,
        store,
        infra,
    )
    .await?;

    reach_target(Target::new(cluster, Box::new(ClusterStatus::Spawned), false), simulate).await?;
    info!(cluster = name, "cluster reached Spawned");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn create_storage(
    root: &Path,
    simulate: bool,
    provisioning: &ProvisioningArgs,
    name: &str,
    image_name: &str,
    cluster_name: &str,
    disk_size: &str,
) -> Result<()> {
    let resolved = resolve_provisioning(provisioning)?;
    let store = build_store(root, simulate);
    let builder = build_image_builder(simulate);
    let infra = build_infra_tool(root, simulate);
    let fingerprint = resolved.provider.fingerprint(&resolved.credential_bytes);

    let image = Image::load_or_create(
        image_name.to_string(),
        resolved.provider.clone(),
        layout::template_path(root, "image"),
        layout::config_path(root, "image", &fingerprint, image_name),
        resolved.user_vars.clone(),
        &resolved.credential_bytes,
        store.clone(),
        builder.clone(),
    )
    .await?;

    let cluster = Cluster::load_or_create(
        cluster_name.to_string(),
        image_name.to_string(),
        image.clone(),
        resolved.provider.clone(),
        layout::template_path(root, "cluster"),
        layout::config_path(root, "cluster", &fingerprint, cluster_name),
        layout::workspace_dir(root, "cluster", &fingerprint, cluster_name),
        resolved.user_vars.clone(),
        &resolved.credential_bytes,
        store.clone(),
        infra.clone(),
    )
    .await?;

    let storage = Storage::load_or_create(
        name.to_string(),
        image_name.to_string(),
        image,
        cluster_name.to_string(),
        cluster,
        disk_size.to_string(),
        resolved.provider.clone(),
        layout::template_path(root, "storage"),
        layout::attached_template_path(root),
        layout::config_path(root, "storage", &fingerprint, name),
        layout::storage_standalone_workspace(root, &fingerprint, name),
        layout::storage_attached_workspace(root, &fingerprint, name),
        resolved.user_vars,
        &resolved.credential_bytes,
        store,
        infra,
    )
    .await?;

    reach_target(Target::new(storage, Box::new(StorageStatus::Detached), false), simulate).await?;
    info!(storage = name, "storage node reached Detached");
    Ok(())
}

pub async fn run(root: &Path, simulate: bool, args: RunArgs) -> Result<()> {
    let resolved = resolve_provisioning(&args.provisioning)?;
    let store = build_store(root, simulate);
    let builder = build_image_builder(simulate);
    let infra = build_infra_tool(root, simulate);
    let fingerprint = resolved.provider.fingerprint(&resolved.credential_bytes);

    let image = Image::load_or_create(
        args.image_name.clone(),
        resolved.provider.clone(),
        layout::template_path(root, "image"),
        layout::config_path(root, "image", &fingerprint, &args.image_name),
        resolved.user_vars.clone(),
        &resolved.credential_bytes,
        store.clone(),
        builder.clone(),
    )
    .await?;

    let cluster = Cluster::load_or_create(
        args.cluster_name.clone(),
        args.image_name.clone(),
        image.clone(),
        resolved.provider.clone(),
        layout::template_path(root, "cluster"),
        layout::config_path(root, "cluster", &fingerprint, &args.cluster_name),
        layout::workspace_dir(root, "cluster", &fingerprint, &args.cluster_name),
        resolved.user_vars.clone(),
        &resolved.credential_bytes,
        store.clone(),
        infra.clone(),
    )
    .await?;

    let storage = if args.use_storage {
        let storage_name =
            args.storage_name.as_deref().ok_or_else(|| anyhow!("--storage-name is required with --use-storage"))?;

        Some(
            Storage::load_or_create(
                storage_name.to_string(),
                args.image_name.clone(),
                image,
                args.cluster_name.clone(),
                cluster.clone(),
                args.storage_disk_size.clone(),
                resolved.provider.clone(),
                layout::template_path(root, "storage"),
                layout::attached_template_path(root),
                layout::config_path(root, "storage", &fingerprint, storage_name),
                layout::storage_standalone_workspace(root, &fingerprint, storage_name),
                layout::storage_attached_workspace(root, &fingerprint, storage_name),
                resolved.user_vars.clone(),
                &resolved.credential_bytes,
                store.clone(),
                infra.clone(),
            )
            .await?,
        )
    } else {
        None
    };

    let upload_files =
        args.upload_files.iter().map(|spec| parse_local_remote_pair(spec)).collect::<Result<Vec<_>>>()?;

    let script_name = args
        .script
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("script path has no file name: {}", args.script.display()))?
        .to_string();

    let socks_proxy = match (&resolved.service_params.socks_proxy_host, resolved.service_params.socks_proxy_port) {
        (Some(host), Some(port)) => Some((host.clone(), port)),
        _ => None,
    };
    let connector: Arc<dyn SshConnector> =
        Arc::new(Ssh2Connector { port: 22, user_override: None, socks_proxy });

    let task = RunTask::new(
        script_name,
        cluster,
        storage,
        args.script.clone(),
        args.remote_path.clone(),
        args.args.clone(),
        upload_files,
        args.download_files.clone(),
        args.overwrite,
        args.newline_conversion,
        connector,
    );

    let desired = if args.keep_cluster { RunTaskStatus::ResultsDownloaded } else { RunTaskStatus::ClusterCleaned };
    reach_target(Target::new(task, Box::new(desired), false), simulate).await?;
    info!(script = %args.script.display(), "run finished");
    Ok(())
}

fn parse_local_remote_pair(spec: &str) -> Result<(PathBuf, String)> {
    let (local, remote) =
        spec.split_once(':').ok_or_else(|| anyhow!("malformed --upload-file '{}', expected local:remote", spec))?;
    Ok((PathBuf::from(local), remote.to_string()))
}

pub async fn destroy(root: &Path, simulate: bool, id: &str) -> Result<()> {
    let store = build_store(root, simulate);
    let builder = build_image_builder(simulate);
    let infra = build_infra_tool(root, simulate);

    let mut registry = HandlerRegistry::new();
    registry.register("image", Box::new(|h: &[String]| h.first().map(String::as_str) == Some("image")));
    registry.register("cluster", Box::new(|h: &[String]| h.first().map(String::as_str) == Some("cluster")));
    registry.register("storage", Box::new(|h: &[String]| h.first().map(String::as_str) == Some("storage")));

    let wanted = id.to_string();
    let mut matches = meridian_store::enumerate(root, &registry, move |found| found == wanted).await?;

    let doc = match matches.len() {
        0 => bail!("destroy: no object found matching id '{}'", id),
        1 => matches.remove(0),
        _ => {
            let ids: Vec<_> = matches.iter().map(|d| d.id.clone()).collect();
            bail!("destroy: id '{}' is ambiguous, matches: {}", id, ids.join(", "));
        }
    };

    let target = match doc.kind {
        "image" => {
            let persisted: PersistedImage = serde_yaml::from_value(doc.raw)?;
            let credential_bytes = std::fs::read(&persisted.provider.credentials_path).with_context(|| {
                format!("reading credentials file {}", persisted.provider.credentials_path)
            })?;

            let image = Image::load_or_create(
                persisted.name,
                persisted.provider,
                persisted.template_path,
                persisted.config_path,
                persisted.user_vars,
                &credential_bytes,
                store.clone(),
                builder.clone(),
            )
            .await?;

            image.destroyed_target()
        }
        "cluster" => {
            let persisted: PersistedCluster = serde_yaml::from_value(doc.raw)?;
            let credential_bytes = std::fs::read(&persisted.provider.credentials_path).with_context(|| {
                format!("reading credentials file {}", persisted.provider.credentials_path)
            })?;
            let fingerprint = persisted.provider.fingerprint(&credential_bytes);

            let image = reconstruct::load_persisted_image(
                &store,
                &builder,
                &persisted.provider,
                &credential_bytes,
                &persisted.image_name,
            )
            .await
            .with_context(|| format!("loading image for cluster '{}'", persisted.name))?;

            let cluster = Cluster::load_or_create(
                persisted.name.clone(),
                persisted.image_name,
                image,
                persisted.provider,
                persisted.template_path,
                persisted.config_path,
                layout::workspace_dir(root, "cluster", &fingerprint, &persisted.name),
                persisted.user_vars,
                &credential_bytes,
                store.clone(),
                infra.clone(),
            )
            .await?;

            cluster.destroyed_target()
        }
        "storage" => {
            let persisted: PersistedStorage = serde_yaml::from_value(doc.raw)?;
            let credential_bytes = std::fs::read(&persisted.provider.credentials_path).with_context(|| {
                format!("reading credentials file {}", persisted.provider.credentials_path)
            })?;
            let fingerprint = persisted.provider.fingerprint(&credential_bytes);

            let image = reconstruct::load_persisted_image(
                &store,
                &builder,
                &persisted.provider,
                &credential_bytes,
                &persisted.image_name,
            )
            .await
            .with_context(|| format!("loading image for storage '{}'", persisted.name))?;

            let cluster = reconstruct::load_persisted_cluster(
                &store,
                &builder,
                &infra,
                root,
                &persisted.provider,
                &credential_bytes,
                &persisted.cluster_name,
            )
            .await
            .with_context(|| format!("loading cluster for storage '{}'", persisted.name))?;

            let storage = Storage::load_or_create(
                persisted.name.clone(),
                persisted.image_name,
                image,
                persisted.cluster_name,
                cluster,
                persisted.disk_size,
                persisted.provider,
                persisted.template_path,
                persisted.attached_template_path,
                persisted.config_path,
                layout::storage_standalone_workspace(root, &fingerprint, &persisted.name),
                layout::storage_attached_workspace(root, &fingerprint, &persisted.name),
                persisted.user_vars,
                &credential_bytes,
                store.clone(),
                infra.clone(),
            )
            .await?;

            storage.destroyed_target()
        }
        other => bail!("destroy: unsupported entity kind '{}'", other),
    };

    if target.is_done().await {
        println!("destroy: already destroyed: {}", id);
        return Ok(());
    }

    reach_target(target, simulate).await?;
    println!("destroy: {} destroyed", id);
    Ok(())
}

pub async fn state(root: &Path) -> Result<()> {
    let mut registry = HandlerRegistry::new();
    registry.register("image", Box::new(|h: &[String]| h.first().map(String::as_str) == Some("image")));
    registry.register("cluster", Box::new(|h: &[String]| h.first().map(String::as_str) == Some("cluster")));
    registry.register("storage", Box::new(|h: &[String]| h.first().map(String::as_str) == Some("storage")));

    let documents = meridian_store::enumerate(root, &registry, |_| true).await?;
    for doc in &documents {
        output::print_state_entry(doc);
    }
    Ok(())
}

pub fn print_vars(kinds: &[String]) -> Result<()> {
    for kind in kinds {
        output::print_vars(kind)?;
    }
    Ok(())
}
