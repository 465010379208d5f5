use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::action_log::run_logged;
use crate::error::DriverError;

/// One cloud resource a cluster's spawn exposed for another entity to
/// import (Storage's attach step needs these to later detach cleanly).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceDescriptor {
    pub address: String,
    pub id: String,
}

/// Extracts `network_resource_address_N` / `network_resource_id_N` output
/// pairs, starting at `N = 0` and stopping at the first index missing
/// either half of the pair.
pub fn parse_network_resources(outputs: &HashMap<String, serde_json::Value>) -> Vec<ResourceDescriptor> {
    let mut resources = Vec::new();
    let mut i = 0usize;
    loop {
        let address_key = format!("network_resource_address_{}", i);
        let id_key = format!("network_resource_id_{}", i);

        let (Some(address), Some(id)) = (
            outputs.get(&address_key).and_then(|v| v.as_str()),
            outputs.get(&id_key).and_then(|v| v.as_str()),
        ) else {
            break;
        };

        resources.push(ResourceDescriptor { address: address.to_string(), id: id.to_string() });
        i += 1;
    }
    resources
}

/// Consumed contract for the external infrastructure tool (Terraform/OpenTofu
/// in the system this was modeled on). The engine only requires that
/// `output` yields a mapping from declared variable names to objects with a
/// `value` field, and that exit code distinguishes tool failure from
/// subprocess-not-found.
#[async_trait]
pub trait InfraTool: Send + Sync {
    async fn init(&self, workspace: &Path) -> Result<(), DriverError>;
    async fn apply(&self, workspace: &Path) -> Result<(), DriverError>;
    async fn destroy(&self, workspace: &Path) -> Result<(), DriverError>;
    async fn import(&self, workspace: &Path, address: &str, id: &str) -> Result<(), DriverError>;
    async fn refresh(&self, workspace: &Path) -> Result<(), DriverError>;
    async fn output(&self, workspace: &Path) -> Result<HashMap<String, serde_json::Value>, DriverError>;
    async fn state_rm(&self, workspace: &Path, address: &str) -> Result<(), DriverError>;
}

/// Stub used under `--simulate`: no subprocess, no filesystem access beyond
/// what the caller already set up. Outputs are fabricated from the resource
/// addresses a caller asks about via `output`.
#[derive(Debug, Default, Clone)]
pub struct LocalInfraTool;

impl LocalInfraTool {
    pub fn new() -> Self {
        LocalInfraTool
    }
}

#[async_trait]
impl InfraTool for LocalInfraTool {
    async fn init(&self, _workspace: &Path) -> Result<(), DriverError> {
        Ok(())
    }

    async fn apply(&self, _workspace: &Path) -> Result<(), DriverError> {
        Ok(())
    }

    async fn destroy(&self, _workspace: &Path) -> Result<(), DriverError> {
        Ok(())
    }

    async fn import(&self, _workspace: &Path, _address: &str, _id: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn refresh(&self, _workspace: &Path) -> Result<(), DriverError> {
        Ok(())
    }

    async fn output(&self, _workspace: &Path) -> Result<HashMap<String, serde_json::Value>, DriverError> {
        Ok(HashMap::new())
    }

    async fn state_rm(&self, _workspace: &Path, _address: &str) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Drives `terraform` or `tofu` as a subprocess, capturing combined
/// stdout+stderr into a per-invocation log file under `log_dir`.
pub struct SubprocessInfraTool {
    pub binary: String,
    pub log_dir: PathBuf,
}

impl SubprocessInfraTool {
    pub fn new(binary: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        SubprocessInfraTool { binary: binary.into(), log_dir: log_dir.into() }
    }

    async fn run(&self, workspace: &Path, label: &str, args: &[&str]) -> Result<(), DriverError> {
        self.run_capturing_stdout(workspace, label, args).await?;
        Ok(())
    }

    /// Like `run`, but also hands back the subprocess's stdout on its own
    /// (not the combined log file) — needed by `output`, which parses JSON
    /// out of stdout and would otherwise choke on any diagnostic line
    /// Terraform prints to stderr during a successful run.
    async fn run_capturing_stdout(&self, workspace: &Path, label: &str, args: &[&str]) -> Result<String, DriverError> {
        let (code, log_path, stdout) = run_logged(&self.log_dir, label, &self.binary, args, workspace, &[]).await?;
        if code != 0 {
            return Err(DriverError::ToolFailed(format!(
                "{} {} exited with code {} (see {})",
                self.binary,
                args.first().copied().unwrap_or(""),
                code,
                log_path.display()
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl InfraTool for SubprocessInfraTool {
    async fn init(&self, workspace: &Path) -> Result<(), DriverError> {
        self.run(workspace, "init", &["init", "-reconfigure", "-no-color"]).await
    }

    async fn apply(&self, workspace: &Path) -> Result<(), DriverError> {
        self.run(workspace, "apply", &["apply", "-auto-approve", "-no-color"]).await
    }

    async fn destroy(&self, workspace: &Path) -> Result<(), DriverError> {
        self.run(workspace, "destroy", &["destroy", "-auto-approve", "-no-color"]).await
    }

    async fn import(&self, workspace: &Path, address: &str, id: &str) -> Result<(), DriverError> {
        self.run(workspace, "import", &["import", "-no-color", address, id]).await
    }

    async fn refresh(&self, workspace: &Path) -> Result<(), DriverError> {
        self.run(workspace, "refresh", &["refresh", "-no-color"]).await
    }

    async fn output(&self, workspace: &Path) -> Result<HashMap<String, serde_json::Value>, DriverError> {
        let raw = self.run_capturing_stdout(workspace, "output", &["output", "-json", "-no-color"]).await?;

        let parsed: serde_json::Value = serde_json::from_str(raw.trim())
            .map_err(|e| DriverError::ToolFailed(format!("parse terraform output: {}", e)))?;

        let object = parsed
            .as_object()
            .ok_or_else(|| DriverError::ToolFailed("terraform output -json did not produce an object".into()))?;

        let mut outputs = HashMap::new();
        for (key, entry) in object {
            let value = entry.get("value").cloned().ok_or_else(|| {
                DriverError::ToolFailed(format!("output '{}' is missing its 'value' field", key))
            })?;
            outputs.insert(key.clone(), value);
        }
        Ok(outputs)
    }

    async fn state_rm(&self, workspace: &Path, address: &str) -> Result<(), DriverError> {
        self.run(workspace, "state-rm", &["state", "rm", address]).await
    }
}
