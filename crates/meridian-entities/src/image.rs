use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use meridian_config::{recognized_variables, UserVariables};
use meridian_domain::{downcast_compare, Action, DomainError, StatusValue, Target, Thing};
use meridian_driver::{config_hash, ImageBuildSpec, ImageBuilder};
use meridian_store::{get_typed, put_typed, StateStore};
use tokio::sync::RwLock;
use tracing::info;

use crate::common::{hierarchy, ProviderIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ImageStatus {
    Nothing,
    Configured,
    Created,
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageStatus::Nothing => "nothing",
            ImageStatus::Configured => "configured",
            ImageStatus::Created => "created",
        };
        write!(f, "{}", s)
    }
}

impl StatusValue for ImageStatus {
    fn satisfies(&self, other: &dyn StatusValue) -> bool {
        downcast_compare::<ImageStatus, _>(other, |o| self >= o)
    }

    fn equals(&self, other: &dyn StatusValue) -> bool {
        downcast_compare::<ImageStatus, _>(other, |o| self == o)
    }

    fn clone_box(&self) -> Box<dyn StatusValue> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn transitions_to(to: ImageStatus) -> Vec<ImageStatus> {
    match to {
        ImageStatus::Nothing => vec![],
        ImageStatus::Configured => vec![ImageStatus::Nothing, ImageStatus::Created],
        ImageStatus::Created => vec![ImageStatus::Configured],
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Persisted {
    status: ImageStatus,
    name: String,
    provider: ProviderIdentity,
    template_path: String,
    config_path: String,
    user_vars: BTreeMap<String, String>,
    image_id: Option<String>,
    remote_config_hash: Option<String>,
}

struct Inner {
    status: ImageStatus,
    image_id: Option<String>,
    remote_config_hash: Option<String>,
}

/// A managed cloud image: a versioned, config-hashed build artifact that
/// clusters and storage nodes boot from.
pub struct Image {
    name: String,
    provider: ProviderIdentity,
    template_path: String,
    config_path: String,
    user_variables: UserVariables,
    store: Arc<dyn StateStore>,
    builder: Arc<dyn ImageBuilder>,
    fingerprint: String,
    inner: RwLock<Inner>,
    self_weak: Weak<Image>,
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image(name={})", self.name)
    }
}

impl Image {
    pub async fn load_or_create(
        name: impl Into<String>,
        provider: ProviderIdentity,
        template_path: impl Into<String>,
        config_path: impl Into<String>,
        user_variables: UserVariables,
        credential_bytes: &[u8],
        store: Arc<dyn StateStore>,
        builder: Arc<dyn ImageBuilder>,
    ) -> Result<Arc<Self>, DomainError> {
        let name = name.into();
        let fingerprint = provider.fingerprint(credential_bytes);

        let mut inner = Inner { status: ImageStatus::Nothing, image_id: None, remote_config_hash: None };

        let doc: Option<Persisted> = get_typed(&*store, &hierarchy("image", &fingerprint, &name), "yaml")
            .await
            .map_err(|e| DomainError::Persistence(e.to_string()))?;

        if let Some(persisted) = doc {
            if persisted.user_vars == persisted_vars(&user_variables) {
                inner.status = persisted.status;
                inner.image_id = persisted.image_id;
                inner.remote_config_hash = persisted.remote_config_hash;
                info!(image = %name, status = %inner.status, "image state loaded from disk");
            } else {
                info!(image = %name, "stored image variables differ from current, starting fresh");
            }
        }

        Ok(Arc::new_cyclic(|self_weak| Image {
            name,
            provider,
            template_path: template_path.into(),
            config_path: config_path.into(),
            user_variables,
            store,
            builder,
            fingerprint,
            inner: RwLock::new(inner),
            self_weak: self_weak.clone(),
        }))
    }

    fn build_spec(&self) -> ImageBuildSpec {
        ImageBuildSpec {
            name: self.name.clone(),
            template_path: self.template_path.clone().into(),
            config_path: self.config_path.clone().into(),
            user_variables: persisted_vars(&self.user_variables),
        }
    }

    async fn persist(&self) -> Result<(), DomainError> {
        let inner = self.inner.read().await;
        let doc = Persisted {
            status: inner.status,
            name: self.name.clone(),
            provider: self.provider.clone(),
            template_path: self.template_path.clone(),
            config_path: self.config_path.clone(),
            user_vars: persisted_vars(&self.user_variables),
            image_id: inner.image_id.clone(),
            remote_config_hash: inner.remote_config_hash.clone(),
        };
        put_typed(&*self.store, &hierarchy("image", &self.fingerprint, &self.name), "yaml", &doc)
            .await
            .map_err(|e| DomainError::Persistence(e.to_string()))
    }

    /// The target this image self-declares for `destroy` — "back to
    /// Configured", matched exactly.
    pub fn destroyed_target(self: &Arc<Self>) -> Target {
        Target::new(self.clone(), Box::new(ImageStatus::Configured), true)
    }
}

fn persisted_vars(vars: &UserVariables) -> BTreeMap<String, String> {
    let keys = recognized_variables("image").unwrap_or(&[]);
    vars.iter().filter(|(k, _)| keys.contains(&k.as_str())).map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[async_trait]
impl Thing for Image {
    async fn status(&self) -> Box<dyn StatusValue> {
        Box::new(self.inner.read().await.status)
    }

    async fn set_status(&self, status: Box<dyn StatusValue>) -> Result<(), DomainError> {
        let casted = *status
            .as_any()
            .downcast_ref::<ImageStatus>()
            .ok_or_else(|| DomainError::WrongStatusKind(status.to_string()))?;

        self.inner.write().await.status = casted;
        self.persist().await?;
        info!(image = %self.name, new_status = %casted, "status saved");
        Ok(())
    }

    fn get_transitions(&self, to: &dyn StatusValue) -> Result<Vec<Box<dyn StatusValue>>, DomainError> {
        let casted = to
            .as_any()
            .downcast_ref::<ImageStatus>()
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
            .downcast_ref::<ImageStatus>()
            .ok_or_else(|| DomainError::UnexpectedStatus(current.to_string()))?;
        let target = *target
            .as_any()
            .downcast_ref::<ImageStatus>()
            .ok_or_else(|| DomainError::UnexpectedStatus(target.to_string()))?;

        use ImageStatus::*;
        let action: Arc<dyn Action> = match (current, target) {
            (Nothing, Configured) => Arc::new(MakeConfig { name: self.name.clone() }),
            (Configured, Created) => Arc::new(BuildImage {
                name: self.name.clone(),
                spec: self.build_spec(),
                builder: self.builder.clone(),
                image: self.self_weak.clone(),
            }),
            (Created, Configured) => Arc::new(DestroyImage {
                name: self.name.clone(),
                spec: self.build_spec(),
                builder: self.builder.clone(),
            }),
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
        let Some(other) = other.as_any().downcast_ref::<Image>() else {
            return false;
        };

        self.name == other.name
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
    name: String,
}

impl fmt::Display for MakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configure for Image(name={})", self.name)
    }
}

#[async_trait]
impl Action for MakeConfig {
    async fn apply(&self) -> Result<(), DomainError> {
        info!(image = %self.name, "preparing image configuration");
        Ok(())
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![])
    }
}

struct BuildImage {
    name: String,
    spec: ImageBuildSpec,
    builder: Arc<dyn ImageBuilder>,
    image: Weak<Image>,
}

impl fmt::Display for BuildImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Build for Image(name={})", self.name)
    }
}

#[async_trait]
impl Action for BuildImage {
    async fn apply(&self) -> Result<(), DomainError> {
        let local_hash = config_hash(&self.spec.user_variables);

        if let Some(remote_hash) = self
            .builder
            .existing_config_hash(&self.spec)
            .await
            .map_err(|e| DomainError::Other(e.to_string()))?
        {
            if remote_hash == local_hash {
                info!(image = %self.name, hash = %local_hash, "image already up to date, skipping build");
                return Ok(());
            }
        }

        let result = self.builder.build(&self.spec).await.map_err(|e| DomainError::Other(e.to_string()))?;

        if let Some(image) = self.image.upgrade() {
            let mut inner = image.inner.write().await;
            inner.image_id = Some(result.image_id);
            inner.remote_config_hash = Some(result.config_hash);
        }

        Ok(())
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![])
    }
}

struct DestroyImage {
    name: String,
    spec: ImageBuildSpec,
    builder: Arc<dyn ImageBuilder>,
}

impl fmt::Display for DestroyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Destroy for Image(name={})", self.name)
    }
}

#[async_trait]
impl Action for DestroyImage {
    async fn apply(&self) -> Result<(), DomainError> {
        self.builder.destroy(&self.spec).await.map_err(|e| DomainError::Other(e.to_string()))
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![])
    }
}
