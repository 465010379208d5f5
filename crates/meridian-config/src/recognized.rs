use crate::error::ConfigError;

/// The user variables each entity kind recognizes, in the order `print-vars`
/// should list them. This is metadata only — entities do their own
/// validation when actually building from variables.
pub fn recognized_variables(kind: &str) -> Result<&'static [&'static str], ConfigError> {
    match kind {
        "image" => Ok(&["project_name", "user_name", "disk_size", "centos_release", "source_image"]),
        "cluster" => Ok(&[
            "key_name",
            "worker_count",
            "login_instance_type",
            "worker_instance_type",
            "login_root_disk_size",
            "user_name",
            "project_name",
            "ssh_key_pair_path",
        ]),
        "storage" => Ok(&[
            "key_name",
            "instance_type",
            "user_name",
            "project_name",
            "ssh_key_pair_path",
            "disk_size",
        ]),
        "task" => Ok(&["local_path", "remote_path", "args", "overwrite", "convert_newline", "use_storage"]),
        other => Err(ConfigError::UnknownKind(other.to_string())),
    }
}
