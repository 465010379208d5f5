//! External collaborators the entities shell out to: an image builder, an
//! infrastructure tool, and an SSH/SFTP client. Each is its own narrow trait
//! rather than one grab-bag interface, since the three have unrelated
//! shapes and lifecycles.

mod action_log;
mod error;
mod image_builder;
mod infra_tool;
mod ssh_client;

pub use action_log::{run_logged, DEFAULT_TIMEOUT};
pub use error::DriverError;
pub use image_builder::{config_hash, ImageBuildResult, ImageBuildSpec, ImageBuilder, LocalImageBuilder};
pub use infra_tool::{parse_network_resources, InfraTool, LocalInfraTool, ResourceDescriptor, SubprocessInfraTool};
pub use ssh_client::{LocalSshClient, Ssh2Client, SshClient, SshConnectSpec};
