use std::path::PathBuf;

/// Build the on-disk path for a hierarchy under `state/`, per spec §6:
/// `state/<kind>/<providerFingerprint>/<name>.<ext>`. `hierarchy` is the
/// full identity path (e.g. `[kind, provider_fingerprint, name]`); nested
/// entities may have longer hierarchies.
pub fn document_path(root: &std::path::Path, hierarchy: &[String], suffix: &str) -> PathBuf {
    let mut path = root.join("state");
    for segment in hierarchy {
        path.push(segment);
    }
    path.set_extension(suffix);
    path
}

/// Inverse of [`document_path`]: given a path found while walking `state/`,
/// recover the hierarchy vector and the slash-joined id used by `Enumerate`.
pub fn hierarchy_from_path(root: &std::path::Path, path: &std::path::Path) -> Option<(Vec<String>, String)> {
    let state_root = root.join("state");
    let rel = path.strip_prefix(&state_root).ok()?;
    let rel = rel.with_extension("");

    let hierarchy: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    if hierarchy.is_empty() {
        return None;
    }

    let id = hierarchy.join("/");
    Some((hierarchy, id))
}
