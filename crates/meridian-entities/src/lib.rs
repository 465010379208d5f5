//! Concrete entity kinds: images, clusters, storage nodes, and run tasks.
//! Each module owns its status lattice, its persisted document shape, and
//! the actions that move it between statuses.

mod cluster;
mod common;
mod image;
mod runtask;
mod storage;

pub use cluster::{Cluster, ClusterStatus};
pub use common::{hierarchy, ConnectDetails, ProviderIdentity};
pub use image::{Image, ImageStatus};
pub use runtask::{RunTask, RunTaskStatus, Ssh2Connector, SshConnector};
pub use storage::{Storage, StorageStatus};
