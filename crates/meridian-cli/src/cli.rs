use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Hybrid-cloud orchestrator: drive images, clusters, storage nodes, and
/// one-shot run tasks toward a desired status.
#[derive(Parser)]
#[command(name = "meridian", version, about)]
pub struct Cli {
    /// Root directory for persisted state, templates, workspaces, and logs.
    #[arg(long, global = true, env = "MERIDIAN_ROOT", default_value = ".meridian")]
    pub root: PathBuf,

    /// Plan and log actions without calling out to real infrastructure.
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Bring an entity to its default created status, creating it first if needed.
    Create {
        #[command(subcommand)]
        kind: CreateKind,
    },
    /// Tear a persisted entity back down to Configured.
    Destroy {
        /// Exact persisted id, e.g. `cluster/3fa9c1.../dev`. See `state`.
        id: String,
    },
    /// Upload, run, and download a script against a cluster end to end.
    Run(RunArgs),
    /// List every entity currently persisted under the state root.
    State,
    /// List the user variables an entity kind recognizes.
    PrintVars {
        /// One or more of: image, cluster, storage, task.
        kinds: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum CreateKind {
    /// Build a cloud image.
    Image {
        #[command(flatten)]
        provisioning: ProvisioningArgs,
        name: String,
    },
    /// Spawn a compute cluster from an already-configured image.
    Cluster {
        #[command(flatten)]
        provisioning: ProvisioningArgs,
        name: String,
        #[arg(long)]
        image_name: String,
    },
    /// Provision a standalone network-attached disk.
    Storage {
        #[command(flatten)]
        provisioning: ProvisioningArgs,
        name: String,
        #[arg(long)]
        image_name: String,
        #[arg(long)]
        cluster_name: String,
        #[arg(long, default_value = "100")]
        disk_size: String,
    },
}

/// Provider identity, credentials, and user-variable resolution shared by
/// every subcommand that talks to a cloud.
#[derive(Args, Clone)]
pub struct ProvisioningArgs {
    #[arg(short = 'p', long, default_value = "gcp")]
    pub provider: String,
    #[arg(short = 'r', long)]
    pub region: String,
    #[arg(short = 'z', long)]
    pub zone: String,
    #[arg(short = 'c', long)]
    pub credentials: PathBuf,
    /// YAML file of user variables, merged under any `--vars` overlay.
    #[arg(long)]
    pub parameters: Option<PathBuf>,
    /// `key=value,key2=value2` overlay; always wins over `--parameters`.
    #[arg(long)]
    pub vars: Option<String>,
    /// Only honored when a `*_ENABLE_SOCKS` environment variable is set.
    #[arg(long)]
    pub socks_host: Option<String>,
    #[arg(long)]
    pub socks_port: Option<u16>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub provisioning: ProvisioningArgs,

    #[arg(long)]
    pub cluster_name: String,
    #[arg(long)]
    pub image_name: String,

    #[arg(long)]
    pub use_storage: bool,
    #[arg(long, required_if_eq("use_storage", "true"))]
    pub storage_name: Option<String>,
    #[arg(long, default_value = "100")]
    pub storage_disk_size: String,

    /// Local script to upload and execute.
    pub script: PathBuf,
    #[arg(long, default_value = "meridian-script")]
    pub remote_path: String,
    #[arg(long)]
    pub newline_conversion: bool,
    #[arg(long)]
    pub overwrite: bool,
    /// Stop after downloading results instead of also destroying the cluster.
    #[arg(long)]
    pub keep_cluster: bool,
    /// `local:remote` pair, repeatable.
    #[arg(long = "upload-file")]
    pub upload_files: Vec<String>,
    /// Remote path to pull back after the run, repeatable.
    #[arg(long = "download-file")]
    pub download_files: Vec<String>,

    /// Arguments passed to the script on the remote side.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
