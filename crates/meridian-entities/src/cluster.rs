use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use meridian_config::{recognized_variables, UserVariables};
use meridian_domain::{downcast_compare, Action, DomainError, StatusValue, Target, Thing};
use meridian_driver::{parse_network_resources, InfraTool, ResourceDescriptor};
use meridian_store::{get_typed, put_typed, StateStore};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::common::{hierarchy, ConnectDetails, ProviderIdentity};
use crate::image::{Image, ImageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ClusterStatus {
    Nothing,
    Configured,
    Spawned,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterStatus::Nothing => "nothing",
            ClusterStatus::Configured => "configured",
            ClusterStatus::Spawned => "spawned",
        };
        write!(f, "{}", s)
    }
}

impl StatusValue for ClusterStatus {
    fn satisfies(&self, other: &dyn StatusValue) -> bool {
        downcast_compare::<ClusterStatus, _>(other, |o| self >= o)
    }

    fn equals(&self, other: &dyn StatusValue) -> bool {
        downcast_compare::<ClusterStatus, _>(other, |o| self == o)
    }

    fn clone_box(&self) -> Box<dyn StatusValue> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn transitions_to(to: ClusterStatus) -> Vec<ClusterStatus> {
    match to {
        ClusterStatus::Nothing => vec![],
        ClusterStatus::Configured => vec![ClusterStatus::Nothing, ClusterStatus::Spawned],
        ClusterStatus::Spawned => vec![ClusterStatus::Configured],
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Persisted {
    status: ClusterStatus,
    name: String,
    image_name: String,
    provider: ProviderIdentity,
    template_path: String,
    config_path: String,
    user_vars: BTreeMap<String, String>,
    connection: ConnectDetails,
}

struct Inner {
    status: ClusterStatus,
    connection: ConnectDetails,
}

/// A managed compute cluster: a login node plus worker pool spawned from an
/// [`crate::image::Image`], reachable over SSH once `Spawned`.
pub struct Cluster {
    name: String,
    image_name: String,
    image: Arc<Image>,
    provider: ProviderIdentity,
    template_path: String,
    config_path: String,
    workspace: PathBuf,
    user_variables: UserVariables,
    store: Arc<dyn StateStore>,
    infra: Arc<dyn InfraTool>,
    fingerprint: String,
    inner: RwLock<Inner>,
    self_weak: Weak<Cluster>,
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cluster(name={}, image={})", self.name, self.image_name)
    }
}

impl Cluster {
    #[allow(clippy::too_many_arguments)]
    pub async fn load_or_create(
        name: impl Into<String>,
        image_name: impl Into<String>,
        image: Arc<Image>,
        provider: ProviderIdentity,
        template_path: impl Into<String>,
        config_path: impl Into<String>,
        workspace: impl Into<PathBuf>,
        user_variables: UserVariables,
        credential_bytes: &[u8],
        store: Arc<dyn StateStore>,
        infra: Arc<dyn InfraTool>,
    ) -> Result<Arc<Self>, DomainError> {
        let name = name.into();
        let fingerprint = provider.fingerprint(credential_bytes);

        let mut inner = Inner { status: ClusterStatus::Nothing, connection: ConnectDetails::default() };

        let doc: Option<Persisted> = get_typed(&*store, &hierarchy("cluster", &fingerprint, &name), "yaml")
            .await
            .map_err(|e| DomainError::Persistence(e.to_string()))?;

        if let Some(persisted) = doc {
            if persisted.user_vars == persisted_vars(&user_variables) {
                inner.status = persisted.status;
                inner.connection = persisted.connection;
                info!(cluster = %name, status = %inner.status, "cluster state loaded from disk");
            } else {
                info!(cluster = %name, "stored cluster variables differ from current, starting fresh");
            }
        }

        Ok(Arc::new_cyclic(|self_weak| Cluster {
            name,
            image_name: image_name.into(),
            image,
            provider,
            template_path: template_path.into(),
            config_path: config_path.into(),
            workspace: workspace.into(),
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
            provider: self.provider.clone(),
            template_path: self.template_path.clone(),
            config_path: self.config_path.clone(),
            user_vars: persisted_vars(&self.user_variables),
            connection: inner.connection.clone(),
        };
        put_typed(&*self.store, &hierarchy("cluster", &self.fingerprint, &self.name), "yaml", &doc)
            .await
            .map_err(|e| DomainError::Persistence(e.to_string()))
    }

    /// SSH connect hint for `state`, once spawned.
    pub async fn connect_details(&self) -> ConnectDetails {
        self.inner.read().await.connection.clone()
    }

    async fn refresh_connect_details(&self) -> Result<(), DomainError> {
        let outputs = self.infra.output(&self.workspace).await.map_err(|e| DomainError::Other(e.to_string()))?;

        let address = output_string(&outputs, "login_address")?;
        let user = output_string(&outputs, "username")?;
        let key = output_string(&outputs, "pkey_file")?;

        self.inner.write().await.connection =
            ConnectDetails { public_address: address, user_name: user, private_key_path: key };

        Ok(())
    }

    /// Network resources (subnet/network) this cluster manages, consumed by
    /// storage's attach step.
    pub async fn network_resources(&self) -> Result<Vec<ResourceDescriptor>, DomainError> {
        if self.inner.read().await.status != ClusterStatus::Spawned {
            return Err(DomainError::Other("cluster must be spawned to expose network resources".into()));
        }

        let outputs = self.infra.output(&self.workspace).await.map_err(|e| DomainError::Other(e.to_string()))?;
        Ok(parse_network_resources(&outputs))
    }

    /// The target this cluster self-declares for `destroy` — "back to
    /// Configured", matched exactly.
    pub fn destroyed_target(self: &Arc<Self>) -> Target {
        Target::new(self.clone(), Box::new(ClusterStatus::Configured), true)
    }
}

fn output_string(outputs: &std::collections::HashMap<String, serde_json::Value>, key: &str) -> Result<String, DomainError> {
    outputs
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| DomainError::Other(format!("output '{}' missing from infrastructure tool", key)))
}

fn persisted_vars(vars: &UserVariables) -> BTreeMap<String, String> {
    let keys = recognized_variables("cluster").unwrap_or(&[]);
    vars.iter().filter(|(k, _)| keys.contains(&k.as_str())).map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[async_trait]
impl Thing for Cluster {
    async fn status(&self) -> Box<dyn StatusValue> {
        Box::new(self.inner.read().await.status)
    }

    async fn set_status(&self, status: Box<dyn StatusValue>) -> Result<(), DomainError> {
        let casted = *status
            .as_any()
            .downcast_ref::<ClusterStatus>()
            .ok_or_else(|| DomainError::WrongStatusKind(status.to_string()))?;

        self.inner.write().await.status = casted;
        self.persist().await?;
        info!(cluster = %self.name, new_status = %casted, "status saved");
        Ok(())
    }

    fn get_transitions(&self, to: &dyn StatusValue) -> Result<Vec<Box<dyn StatusValue>>, DomainError> {
        let casted = to
            .as_any()
            .downcast_ref::<ClusterStatus>()
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
            .downcast_ref::<ClusterStatus>()
            .ok_or_else(|| DomainError::UnexpectedStatus(current.to_string()))?;
        let target = *target
            .as_any()
            .downcast_ref::<ClusterStatus>()
            .ok_or_else(|| DomainError::UnexpectedStatus(target.to_string()))?;

        let Some(cluster) = self.self_weak.upgrade() else {
            return Err(DomainError::Other("cluster was dropped before its action could run".into()));
        };

        use ClusterStatus::*;
        let action: Arc<dyn Action> = match (current, target) {
            (Nothing, Configured) => Arc::new(MakeConfig { cluster }),
            (Configured, Spawned) => Arc::new(Spawn { cluster }),
            (Spawned, Configured) => Arc::new(Destroy { cluster }),
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
        let Some(other) = other.as_any().downcast_ref::<Cluster>() else {
            return false;
        };

        self.name == other.name
            && self.image_name == other.image_name
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
    cluster: Arc<Cluster>,
}

impl fmt::Display for MakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configure for {}", self.cluster)
    }
}

#[async_trait]
impl Action for MakeConfig {
    async fn apply(&self) -> Result<(), DomainError> {
        self.cluster.infra.init(&self.cluster.workspace).await.map_err(|e| DomainError::Other(e.to_string()))
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![Target::new(self.cluster.image.clone(), Box::new(ImageStatus::Configured), false)])
    }
}

struct Spawn {
    cluster: Arc<Cluster>,
}

impl fmt::Display for Spawn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spawn for {}", self.cluster)
    }
}

#[async_trait]
impl Action for Spawn {
    async fn apply(&self) -> Result<(), DomainError> {
        if let Err(e) = self.cluster.infra.apply(&self.cluster.workspace).await {
            warn!(cluster = %self.cluster, error = %e, "spawn failed, destroying half-spawned cluster");

            if let Err(destroy_err) = self.cluster.infra.destroy(&self.cluster.workspace).await {
                warn!(
                    cluster = %self.cluster,
                    error = %destroy_err,
                    "could not clean up half-spawned cluster either; manual intervention needed"
                );
            }

            return Err(DomainError::Other(e.to_string()));
        }

        self.cluster.refresh_connect_details().await
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![Target::new(self.cluster.image.clone(), Box::new(ImageStatus::Created), false)])
    }
}

struct Destroy {
    cluster: Arc<Cluster>,
}

impl fmt::Display for Destroy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Destroy for {}", self.cluster)
    }
}

#[async_trait]
impl Action for Destroy {
    async fn apply(&self) -> Result<(), DomainError> {
        self.cluster.inner.write().await.connection = ConnectDetails::default();
        self.cluster.infra.destroy(&self.cluster.workspace).await.map_err(|e| DomainError::Other(e.to_string()))
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![])
    }
}
