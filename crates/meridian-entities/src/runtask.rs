use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use meridian_domain::{Action, DomainError, StatusValue, Target, Thing};
use meridian_driver::{SshClient, SshConnectSpec};
use tokio::sync::RwLock;
use tracing::info;

use crate::cluster::{Cluster, ClusterStatus};
use crate::common::ConnectDetails;
use crate::storage::{Storage, StorageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum RunTaskStatus {
    NotRunning,
    Connected,
    DataUploaded,
    CommandFinished,
    ResultsDownloaded,
    ClusterCleaned,
}

impl fmt::Display for RunTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunTaskStatus::NotRunning => "not running",
            RunTaskStatus::Connected => "connected",
            RunTaskStatus::DataUploaded => "data uploaded",
            RunTaskStatus::CommandFinished => "command finished",
            RunTaskStatus::ResultsDownloaded => "results downloaded",
            RunTaskStatus::ClusterCleaned => "cluster cleaned",
        };
        write!(f, "{}", s)
    }
}

impl StatusValue for RunTaskStatus {
    fn satisfies(&self, other: &dyn StatusValue) -> bool {
        meridian_domain::downcast_compare::<RunTaskStatus, _>(other, |o| self >= o)
    }

    fn equals(&self, other: &dyn StatusValue) -> bool {
        meridian_domain::downcast_compare::<RunTaskStatus, _>(other, |o| self == o)
    }

    fn clone_box(&self) -> Box<dyn StatusValue> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn transitions_to(to: RunTaskStatus) -> Vec<RunTaskStatus> {
    use RunTaskStatus::*;
    match to {
        NotRunning => vec![],
        Connected => vec![NotRunning],
        DataUploaded => vec![Connected],
        CommandFinished => vec![DataUploaded],
        ResultsDownloaded => vec![CommandFinished],
        ClusterCleaned => vec![ResultsDownloaded],
    }
}

/// Connects to a cluster's login node once it's reachable. Kept separate
/// from [`RunTask`] so tests can hand in a stub instead of opening a real
/// socket.
pub trait SshConnector: Send + Sync {
    fn connect(&self, details: &ConnectDetails) -> Result<Arc<dyn SshClient>, DomainError>;
}

/// Opens an [`meridian_driver::Ssh2Client`] against a cluster's public
/// address, authenticating with the given private key.
pub struct Ssh2Connector {
    pub port: u16,
    pub user_override: Option<String>,
    pub socks_proxy: Option<(String, u16)>,
}

impl SshConnector for Ssh2Connector {
    fn connect(&self, details: &ConnectDetails) -> Result<Arc<dyn SshClient>, DomainError> {
        let spec = SshConnectSpec {
            host: details.public_address.clone(),
            port: self.port,
            user: self.user_override.clone().unwrap_or_else(|| details.user_name.clone()),
            private_key_path: PathBuf::from(&details.private_key_path),
            socks_proxy: self.socks_proxy.clone(),
        };
        meridian_driver::Ssh2Client::connect(&spec)
            .map(|c| Arc::new(c) as Arc<dyn SshClient>)
            .map_err(|e| DomainError::Other(e.to_string()))
    }
}

/// A single run-to-completion unit: connect, upload inputs, run a remote
/// command, download outputs, then release the cluster. Unlike the other
/// entities a task keeps no record on disk — restarting the process forgets
/// any task that was mid-flight.
pub struct RunTask {
    name: String,
    cluster: Arc<Cluster>,
    storage: Option<Arc<Storage>>,
    use_storage: bool,
    local_path: PathBuf,
    remote_path: String,
    args: Vec<String>,
    upload_files: Vec<(PathBuf, String)>,
    download_files: Vec<String>,
    overwrite: bool,
    convert_newline: bool,
    connector: Arc<dyn SshConnector>,
    status: RwLock<RunTaskStatus>,
    client: RwLock<Option<Arc<dyn SshClient>>>,
    self_weak: Weak<RunTask>,
}

impl fmt::Display for RunTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunTask(name={})", self.name)
    }
}

impl RunTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        cluster: Arc<Cluster>,
        storage: Option<Arc<Storage>>,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        args: Vec<String>,
        upload_files: Vec<(PathBuf, String)>,
        download_files: Vec<String>,
        overwrite: bool,
        convert_newline: bool,
        connector: Arc<dyn SshConnector>,
    ) -> Arc<Self> {
        let use_storage = storage.is_some();
        Arc::new_cyclic(|self_weak| RunTask {
            name: name.into(),
            cluster,
            storage,
            use_storage,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            args,
            upload_files,
            download_files,
            overwrite,
            convert_newline,
            connector,
            status: RwLock::new(RunTaskStatus::NotRunning),
            client: RwLock::new(None),
            self_weak: self_weak.clone(),
        })
    }
}

fn escape_arg(arg: &str) -> String {
    if arg.chars().all(|c| c.is_ascii_alphanumeric() || "_-./=".contains(c)) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

fn expand_exe(path: &str) -> String {
    if path.contains('/') {
        path.to_string()
    } else {
        format!("./{}", path)
    }
}

#[async_trait]
impl Thing for RunTask {
    async fn status(&self) -> Box<dyn StatusValue> {
        Box::new(*self.status.read().await)
    }

    async fn set_status(&self, status: Box<dyn StatusValue>) -> Result<(), DomainError> {
        let casted = *status
            .as_any()
            .downcast_ref::<RunTaskStatus>()
            .ok_or_else(|| DomainError::WrongStatusKind(status.to_string()))?;

        *self.status.write().await = casted;
        info!(task = %self.name, new_status = %casted, "task status updated");
        Ok(())
    }

    fn get_transitions(&self, to: &dyn StatusValue) -> Result<Vec<Box<dyn StatusValue>>, DomainError> {
        let casted = to
            .as_any()
            .downcast_ref::<RunTaskStatus>()
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
            .downcast_ref::<RunTaskStatus>()
            .ok_or_else(|| DomainError::UnexpectedStatus(current.to_string()))?;
        let target = *target
            .as_any()
            .downcast_ref::<RunTaskStatus>()
            .ok_or_else(|| DomainError::UnexpectedStatus(target.to_string()))?;

        let Some(task) = self.self_weak.upgrade() else {
            return Err(DomainError::Other("task was dropped before its action could run".into()));
        };

        use RunTaskStatus::*;
        let action: Arc<dyn Action> = match (current, target) {
            (NotRunning, Connected) => Arc::new(MakeConnection { task }),
            (Connected, DataUploaded) => Arc::new(UploadData { task }),
            (DataUploaded, CommandFinished) => Arc::new(RunRemote { task }),
            (CommandFinished, ResultsDownloaded) => Arc::new(DownloadResults { task }),
            (ResultsDownloaded, ClusterCleaned) => Arc::new(CleanCluster { task }),
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
        let Some(other) = other.as_any().downcast_ref::<RunTask>() else {
            return false;
        };
        self.name == other.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MakeConnection {
    task: Arc<RunTask>,
}

impl fmt::Display for MakeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connect for {}", self.task)
    }
}

#[async_trait]
impl Action for MakeConnection {
    async fn apply(&self) -> Result<(), DomainError> {
        let details = self.task.cluster.connect_details().await;
        if !details.is_set() {
            return Err(DomainError::Other("cluster has no connection details yet".into()));
        }

        let client = self.task.connector.connect(&details)?;
        *self.task.client.write().await = Some(client);
        info!(task = %self.task, host = %details.public_address, "connected to cluster login node");
        Ok(())
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![Target::new(self.task.cluster.clone(), Box::new(ClusterStatus::Spawned), false)])
    }
}

struct UploadData {
    task: Arc<RunTask>,
}

impl fmt::Display for UploadData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Upload for {}", self.task)
    }
}

#[async_trait]
impl Action for UploadData {
    async fn apply(&self) -> Result<(), DomainError> {
        let guard = self.task.client.read().await;
        let client = guard.as_ref().ok_or_else(|| DomainError::Other("no active ssh connection".into()))?;

        for (local, remote) in &self.task.upload_files {
            client
                .put_file(local, remote, self.task.convert_newline, self.task.overwrite, false)
                .await
                .map_err(|e| DomainError::Other(e.to_string()))?;
        }

        client
            .put_file(&self.task.local_path, &self.task.remote_path, self.task.convert_newline, self.task.overwrite, true)
            .await
            .map_err(|e| DomainError::Other(e.to_string()))
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        let mut targets = vec![Target::new(self.task.cluster.clone(), Box::new(ClusterStatus::Spawned), false)];
        if self.task.use_storage {
            if let Some(storage) = &self.task.storage {
                targets.push(Target::new(storage.clone(), Box::new(StorageStatus::Attached), false));
            }
        }
        Ok(targets)
    }
}

struct RunRemote {
    task: Arc<RunTask>,
}

impl fmt::Display for RunRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Run for {}", self.task)
    }
}

#[async_trait]
impl Action for RunRemote {
    async fn apply(&self) -> Result<(), DomainError> {
        let guard = self.task.client.read().await;
        let client = guard.as_ref().ok_or_else(|| DomainError::Other("no active ssh connection".into()))?;

        let mut command = expand_exe(&self.task.remote_path);
        for arg in &self.task.args {
            command.push(' ');
            command.push_str(&escape_arg(arg));
        }

        client.execute_command(&command, true).await.map_err(|e| DomainError::Other(e.to_string()))?;
        Ok(())
    }

    fn is_exclusive(&self) -> bool {
        true
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![Target::new(self.task.cluster.clone(), Box::new(ClusterStatus::Spawned), false)])
    }
}

struct DownloadResults {
    task: Arc<RunTask>,
}

impl fmt::Display for DownloadResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Download for {}", self.task)
    }
}

#[async_trait]
impl Action for DownloadResults {
    async fn apply(&self) -> Result<(), DomainError> {
        let guard = self.task.client.read().await;
        let client = guard.as_ref().ok_or_else(|| DomainError::Other("no active ssh connection".into()))?;

        for remote in &self.task.download_files {
            let (_, base) = client.split(remote);
            let destination = self.task.local_path.join(&base);
            client.get_file(remote, &destination, self.task.overwrite).await.map_err(|e| DomainError::Other(e.to_string()))?;
        }

        client.close().await.map_err(|e| DomainError::Other(e.to_string()))
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        let mut targets = vec![Target::new(self.task.cluster.clone(), Box::new(ClusterStatus::Spawned), false)];
        if self.task.use_storage {
            if let Some(storage) = &self.task.storage {
                targets.push(Target::new(storage.clone(), Box::new(StorageStatus::Detached), false));
            }
        }
        Ok(targets)
    }
}

struct CleanCluster {
    task: Arc<RunTask>,
}

impl fmt::Display for CleanCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Release for {}", self.task)
    }
}

#[async_trait]
impl Action for CleanCluster {
    async fn apply(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn is_exclusive(&self) -> bool {
        false
    }

    fn prerequisites(&self) -> Result<Vec<Target>, DomainError> {
        Ok(vec![self.task.cluster.destroyed_target()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_arg_quotes_only_when_needed() {
        assert_eq!(escape_arg("plain-arg_1.txt"), "plain-arg_1.txt");
        assert_eq!(escape_arg("has space"), "'has space'");
        assert_eq!(escape_arg("it's"), "'it'\\''s'");
    }

    #[test]
    fn expand_exe_adds_relative_prefix() {
        assert_eq!(expand_exe("run.sh"), "./run.sh");
        assert_eq!(expand_exe("bin/run.sh"), "bin/run.sh");
        assert_eq!(expand_exe("/opt/run.sh"), "/opt/run.sh");
    }
}
