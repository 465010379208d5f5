//! On-disk path conventions. None of this is mandated by the entities or
//! engine crates — they accept whatever paths they're handed — so the CLI
//! owns one fixed layout under its `--root`/`MERIDIAN_ROOT` directory:
//!
//! ```text
//! <root>/
//!   state/...                  (owned by meridian-store)
//!   templates/<kind>/main.tf.json
//!   templates/storage/attached.tf.json
//!   config/<kind>/<fingerprint>/<name>/config.tf.json
//!   workspace/<kind>/<fingerprint>/<name>/...
//!   workspace/storage/<fingerprint>/<name>/{standalone,attached}/
//!   logs/
//! ```

use std::path::{Path, PathBuf};

pub fn template_path(root: &Path, kind: &str) -> String {
    root.join("templates").join(kind).join("main.tf.json").display().to_string()
}

pub fn attached_template_path(root: &Path) -> String {
    root.join("templates").join("storage").join("attached.tf.json").display().to_string()
}

pub fn config_path(root: &Path, kind: &str, fingerprint: &str, name: &str) -> String {
    root.join("config").join(kind).join(fingerprint).join(name).join("config.tf.json").display().to_string()
}

pub fn workspace_dir(root: &Path, kind: &str, fingerprint: &str, name: &str) -> PathBuf {
    root.join("workspace").join(kind).join(fingerprint).join(name)
}

pub fn storage_standalone_workspace(root: &Path, fingerprint: &str, name: &str) -> PathBuf {
    workspace_dir(root, "storage", fingerprint, name).join("standalone")
}

pub fn storage_attached_workspace(root: &Path, fingerprint: &str, name: &str) -> PathBuf {
    workspace_dir(root, "storage", fingerprint, name).join("attached")
}

pub fn logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}
