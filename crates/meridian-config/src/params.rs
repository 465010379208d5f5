use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

/// User-supplied variables, keyed by name. A `BTreeMap` keeps iteration order
/// deterministic, which matters for the fingerprint computed over it.
pub type UserVariables = BTreeMap<String, String>;

/// Load a `--parameters <file>` document. An absent file is not an error —
/// callers combine this with `--vars` overlays and the caller decides which
/// variables are actually required.
pub fn load_parameters(path: &Path) -> Result<UserVariables, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UserVariables::new()),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })
        }
    };

    serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Parse `--vars key=value,key2=value2` into an overlay map.
pub fn parse_vars_flag(raw: &str) -> Result<UserVariables, ConfigError> {
    let mut vars = UserVariables::new();

    for assignment in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedVarsAssignment(assignment.to_string()))?;
        vars.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(vars)
}

/// Merge a parameter-file map with a `--vars` overlay. CLI-supplied vars
/// always win over the file.
pub fn merge_vars(mut base: UserVariables, overlay: UserVariables) -> UserVariables {
    base.extend(overlay);
    base
}

/// Look up a required variable, surfacing the exact missing-key error kind
/// §7 calls out as a validation failure.
pub fn require<'a>(vars: &'a UserVariables, key: &str) -> Result<&'a str, ConfigError> {
    vars.get(key)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}
