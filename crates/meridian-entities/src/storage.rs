use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use meridian_config::{recognized_variables, UserVariables};
use meridian_domain::{downcast_compare, Action, DomainError, StatusValue, Target, Thing};
use meridian_driver::{InfraTool, ResourceDescriptor};
use meridian_store::{get_typed, put_typed, StateStore};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cluster::{Cluster, ClusterStatus};
use crate::common::{hierarchy, ConnectDetails, ProviderIdentity};
use crate::image::{Image, ImageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StorageStatus {
    Nothing,
    Configured,
    Detached,
    Attached,
}

impl StorageStatus {
    fn rank(self) -> u8 {
        match self {
            StorageStatus::Nothing => 0,
            StorageStatus::Configured => 1,
            StorageStatus::Detached => 2,
            StorageStatus::Attached => 3,
        }
    }
}

impl fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageStatus::Nothing => "nothing",
            StorageStatus::Configured => "configured",
            StorageStatus::Detached => "standalone access",
            StorageStatus::Attached => "attached to cluster",
        };
        write!(f, "{}", s)
    }
}

impl StatusValue for StorageStatus {
    /// Attached only satisfies Attached; a disk can't simultaneously be
    /// standalone and cluster-attached, so the ordinary `>=` ordering is
    /// broken once `Attached` is involved on either side.
    fn satisfies(&self, other: &dyn StatusValue) -> bool {
        downcast_compare::<StorageStatus, _>(other, |o| {
            (*self == StorageStatus::Attached && *self == *o)
                || (*self != StorageStatus::Attached && self.rank() >= o.rank())
        })
    }

    fn equals(&self, other: &dyn StatusValue) -> bool {
        downcast_compare::<StorageStatus, _>(other, |o| self == o)
    }

    fn clone_box(&self) -> Box<dyn StatusValue> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn transitions_to(to: StorageStatus) -> Vec<StorageStatus> {
    use StorageStatus::*;
    match to {
        Nothing => vec![],
        Configured => vec![Nothing, Detached, Attached],
        Detached => vec![Configured, Attached],
        Attached => vec![Detached, Configured],
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Persisted {
    status: StorageStatus,
    name: String,
    image_name: String,
    cluster_name: String,
    disk_size: String,
    provider: ProviderIdentity,
    template_path: String,
    attached_template_path: String,
    config_path: String,
    user_vars: BTreeMap<String, String>,
    imported_resources: Vec<ResourceDescriptor>,
    connection: ConnectDetails,
}

struct Inner {
    status: StorageStatus,
    imported_resources: Vec<ResourceDescriptor>,
    connection: ConnectDetails,
}

/// A managed network-attached disk: spawned standalone (`Detached`), or
/// imported into a cluster's Terraform state (`Attached`) so the cluster can
/// mount it.
pub struct Storage {
    name: String,
    image_name: String,
    image: Arc<Image>,
    cluster_name: String,
    cluster: Arc<Cluster>,
    disk_size: String,
    provider: ProviderIdentity,
    template_path: String,
    attached_template_path: String,
    config_path: String,
    standalone_workspace: PathBuf,
    attached_workspace: PathBuf,
    user_variables: UserVariables,
    store: Arc<dyn StateStore>,
    infra: Arc<dyn InfraTool>,
    fingerprint: String,
    inner: RwLock<Inner>,
    self_weak: Weak<Storage>,
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Storage(name={}, size={})", self.name, self.disk_size)
    }
}

impl Storage {
    #[allow(clippy::too_many_arguments)]
    pub async fn load_or_create(
        name: impl Into<String>,
        image_name: impl Into<String>,
        image: Arc<Image>,
        cluster_name: impl Into<String>,
        cluster: Arc<Cluster>,
        disk_size: impl Into<String>,
        provider: ProviderIdentity,
        template_path: impl Into<String>,
        attached_template_path: impl Into<String>,
        config_path: impl Into<String>,
        standalone_workspace: impl Into<PathBuf>,
        attached_workspace: impl Into<PathBuf>,
        user_variables: UserVariables,
        credential_bytes: &[u8],
        store: Arc<dyn StateStore>,
        infra: Arc<dyn InfraTool>,
    ) -> Result<Arc<Self>, DomainError> {
        let name = name.into();
        let fingerprint = provider.fingerprint(credential_bytes);

        let mut inner =
            Inner { status: StorageStatus::Nothing, imported_resources: Vec::new(), connection: ConnectDetails::default() };

        let doc: Option<Persisted> = get_typed(&*store, &hierarchy("storage", &fingerprint, &name), "yaml")
            .await
            .map_err(|e| DomainError::Persistence(e.to_string()))?;

        if let Some(persisted) = doc {
            if persisted.user_vars == persisted_vars(&user_variables) {
                inner.status = persisted.status;
                inner.imported_resources = persisted.imported_resources;
                inner.connection = persisted.connection;
                info!(storage = %name, status = %inner.status, "storage node state loaded from disk");
            } else {
                info!(storage = %name, "stored storage variables differ from current, starting fresh");
            }
        }

        Ok(Arc::new_cyclic(|self_weak| Storage {
            name,
            image_name: image_name.into(),
            image,
            cluster_name: cluster_name.into(),
            cluster,
            disk_size: disk_size.into(),
            provider,
            template_path: template_path.into(),
            attached_template_path: attached_template_path.into(),
            config_path: config_path.into(),
            standalone_workspace: standalone_workspace.into(),
            attached_workspace: attached_workspace.into(),
            user_variables,
            store,
            infra,
            fingerprint,
            inner: RwLock::new(inner),
            self_weak: self_weak.clone(),
        }))
    }

    async fn persist(&self) -> Result<(), DomainError> {
        let inner = self.inner.read().await;
        let doc = Persisted {
            status: inner.status,
            name: self.name.clone(),
            image_name: self.image_name.clone(),
            cluster_name: self.cluster_name.clone(),
            disk_size: self.disk_size.clone(),
            provider: self.provider.clone(),
            template_path: self.template_path.clone(),
            attached_template_path: self.attached_template_path.clone(),
            config_path: self.config_path.clone(),
            user_vars: persisted_vars(&self.user_variables),
            imported_resources: inner.imported_resources.clone(),
            connection: inner.connection.clone(),
        };
        put_typed(&*self.store, &hierarchy("storage", &self.fingerprint, &self.name), "yaml", &doc)
            .await
            .map_err(|e| DomainError::Persistence(e.to_string()))
    }

    pub async fn connect_details(&self) -> ConnectDetails {
        self.inner.read().await.connection.clone()
    }

    async fn refresh_connect_details(&self, workspace: &PathBuf) -> Result<(), DomainError> {
        let outputs = self.infra.output(workspace).await.map_err(|e| DomainError::Other(e.to_string()))?;

        let address = outputs.get("internal_address").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let user = outputs.get("username").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let key = outputs.get("pkey_file").and_then(|v| v.as_str()).unwrap_or_default().to_string();

        self.inner.write().await.connection =
            ConnectDetails { public_address: address, user_name: user, private_key_path: key };

        Ok(())
    }

    pub fn destroyed_target(self: &Arc<Self>) -> Target {
        Target::new(self.clone(), Box::new(StorageStatus::Configured), true)
    }
}

fn persisted_vars(vars: &UserVariables) -> BTreeMap<String, String> {
    let keys = recognized_variables("storage").unwrap_or(&[]);
    vars.iter().filter(|(k, _)| keys.contains(&k.as_str())).map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[async_trait]
impl Thing for Storage {
    async fn status(&self) -> Box<dyn StatusValue> {
        Box::new(self.inner.read().await.status)
    }

    async fn set_status(&self, status: Box<dyn StatusValue>) -> Result<(), DomainError> {
        let casted = *status
            .as_any()
            .downcast_ref::<StorageStatus>()
            .ok_or_else(|| DomainError::WrongStatusKind(status.to_string()))?;

        self.inner.write().await.status = casted;
        self.persist().await?;
        info!(storage = %self.name, new_status = %casted, "status saved");
        Ok(())
    }

    fn get_transitions(&self, to: &dyn StatusValue) -> Result<Vec<Box<dyn StatusValue>>, DomainError> {
        let casted = to
            .as_any()
            .downcast_ref::<StorageStatus>()
            .ok_or_else(|| DomainError::UnexpectedStatus(to.to_string()))?;

        Ok(transitions_to(*casted).into_iter().map(|s| Box::new(s) as Box<dyn StatusValue>).collect())
    }

    async fn get_action(
        &self,
        current: &dyn StatusValue,
        target: &dyn StatusValue,
    ) -> Result<Arc<dyn Action>, DomainError> {
        let current = *current
            .as_any()
            .downcast_ref::<StorageStatus>()
            .ok_or_else(|| DomainError::UnexpectedStatus(current.to_string()))?;
        let target = *target
            .as_any()
            .downcast_ref::<StorageStatus>()
            .ok_or_else(|| DomainError::UnexpectedStatus(target.to_string()))?;

        let Some(storage) = self.self_weak.upgrade() else {
            return Err(DomainError::Other("storage node was dropped before its action could run".into()));
        };

        use StorageStatus::*;
        let action: Arc<dyn Action> = match (current, target) {
            (Nothing, Configured) => Arc::new(MakeConfig { storage }),
            (Configured, Detached) => Arc::new(Spawn { storage }),
            (Configured, Attached) | (Detached, Attached) => Arc::new(Attach { storage }),
            (Detached, Configured) | (Attached, Configured) => Arc::new(Destroy { storage }),
            (Attached, Detached) => Arc::new(Detach { storage }),
            _ => {
                return Err(DomainError::UnsupportedTransition {
                    from: current.to_string(),
                    to: target.to_string(),
                })
            }
        };

        Ok(action)
    }

    fn equals(&self, other: &dyn Thing) -> bool {
        let Some(other) = other.as_any().downcast_ref::<Storage>() else {
            return false;
        };

        self.name == other.name
            && self.image_name == other.image_name
            && self.cluster_name == other.cluster_name
            && self.disk_size == other.disk_size
            && self.provider == other.provider
            && self.template_path == other.template_path
            && self.config_path == other.config_path
            && persisted_vars(&self.user_variables) == persisted_vars(&other.user_variables)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MakeConfig {
    storage: Arc<Storage>,
}

impl fmt::Display for MakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configure for {}", self.storage)
    }
}

#[async_trait]
impl Action for MakeConfig {
    async fn apply(&self) -> Result<(), DomainError> {
        self.storage
            .infra
            .init(&self.storage.standalone_workspace)
            .await
            .map_err(|e| DomainError::Other(e.to_string()))?;
        self.storage
            .infra
            .init(&self.storage.attached_workspace)
            .await
            .map_err(|e| DomainError::Other(e.to_string()))
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![Target::new(self.storage.image.clone(), Box::new(ImageStatus::Configured), false)])
    }
}

struct Spawn {
    storage: Arc<Storage>,
}

impl fmt::Display for Spawn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spawn for {}", self.storage)
    }
}

#[async_trait]
impl Action for Spawn {
    async fn apply(&self) -> Result<(), DomainError> {
        let workspace = &self.storage.standalone_workspace;
        let disk_address = "storage_disk.storage";
        let disk_id = format!("{}-disk", self.storage.name);

        if let Err(e) = self.storage.infra.import(workspace, disk_address, &disk_id).await {
            info!(storage = %self.storage, error = %e, "cannot import existing disk, assuming none exists yet");
        }

        if let Err(e) = self.storage.infra.apply(workspace).await {
            warn!(storage = %self.storage, error = %e, "spawn failed, destroying half-spawned storage node");

            if let Err(rm_err) = self.storage.infra.state_rm(workspace, disk_address).await {
                warn!(storage = %self.storage, error = %rm_err, "could not exclude disk from cleanup destroy");
            }

            if let Err(destroy_err) = self.storage.infra.destroy(workspace).await {
                warn!(
                    storage = %self.storage,
                    error = %destroy_err,
                    "could not clean up half-spawned storage node either; manual intervention needed"
                );
            }

            return Err(DomainError::Other(e.to_string()));
        }

        self.storage.refresh_connect_details(workspace).await
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![Target::new(self.storage.image.clone(), Box::new(ImageStatus::Created), false)])
    }
}

struct Destroy {
    storage: Arc<Storage>,
}

impl fmt::Display for Destroy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Destroy for {}", self.storage)
    }
}

#[async_trait]
impl Action for Destroy {
    async fn apply(&self) -> Result<(), DomainError> {
        let status = self.storage.inner.read().await.status;
        let (workspace, mut unmanaged) = match status {
            StorageStatus::Attached => {
                let resources: Vec<String> =
                    self.storage.inner.read().await.imported_resources.iter().map(|r| r.address.clone()).collect();
                (&self.storage.attached_workspace, resources)
            }
            StorageStatus::Detached => (&self.storage.standalone_workspace, Vec::new()),
            other => return Err(DomainError::Other(format!("unexpected storage node status: {}", other))),
        };

        unmanaged.push("storage_disk.storage".to_string());

        self.storage.inner.write().await.connection = ConnectDetails::default();

        for address in &unmanaged {
            if let Err(e) = self.storage.infra.state_rm(workspace, address).await {
                warn!(storage = %self.storage, resource = %address, error = %e, "cannot exclude unmanaged resource");
                return Err(DomainError::Other(e.to_string()));
            }
        }

        self.storage.infra.destroy(workspace).await.map_err(|e| DomainError::Other(e.to_string()))
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![])
    }
}

struct Attach {
    storage: Arc<Storage>,
}

impl fmt::Display for Attach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attach for {}", self.storage)
    }
}

#[async_trait]
impl Action for Attach {
    async fn apply(&self) -> Result<(), DomainError> {
        let resources = self.storage.cluster.network_resources().await?;
        let workspace = &self.storage.attached_workspace;

        let status = self.storage.inner.read().await.status;
        if status == StorageStatus::Configured {
            let disk_id = format!("{}-disk", self.storage.name);
            if let Err(e) = self.storage.infra.import(workspace, "storage_disk.storage", &disk_id).await {
                info!(storage = %self.storage, error = %e, "cannot import disk");
            }
        }

        for resource in &resources {
            self.storage
                .infra
                .import(workspace, &resource.address, &resource.id)
                .await
                .map_err(|e| DomainError::Other(e.to_string()))?;
        }

        self.storage.infra.apply(workspace).await.map_err(|e| DomainError::Other(e.to_string()))?;

        self.storage.refresh_connect_details(workspace).await?;
        self.storage.inner.write().await.imported_resources = resources;

        Ok(())
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![
            Target::new(self.storage.image.clone(), Box::new(ImageStatus::Created), false),
            Target::new(self.storage.cluster.clone(), Box::new(ClusterStatus::Spawned), false),
        ])
    }
}

struct Detach {
    storage: Arc<Storage>,
}

impl fmt::Display for Detach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Detach for {}", self.storage)
    }
}

#[async_trait]
impl Action for Detach {
    async fn apply(&self) -> Result<(), DomainError> {
        let workspace = &self.storage.attached_workspace;
        let resources = self.storage.inner.read().await.imported_resources.clone();

        for resource in &resources {
            self.storage
                .infra
                .state_rm(workspace, &resource.address)
                .await
                .map_err(|e| DomainError::Other(e.to_string()))?;
        }

        self.storage.infra.apply(&self.storage.standalone_workspace).await.map_err(|e| DomainError::Other(e.to_string()))?;

        self.storage.refresh_connect_details(&self.storage.standalone_workspace).await?;
        self.storage.inner.write().await.imported_resources = Vec::new();

        Ok(())
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![Target::new(self.storage.cluster.clone(), Box::new(ClusterStatus::Spawned), false)])
    }
}
