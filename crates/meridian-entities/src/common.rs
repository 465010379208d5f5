use meridian_config::provider_fingerprint;

/// Hostname/credentials needed to reach a spawned cluster or storage node,
/// refreshed from infrastructure-tool outputs at the end of a spawn/attach.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConnectDetails {
    pub public_address: String,
    pub user_name: String,
    pub private_key_path: String,
}

impl ConnectDetails {
    pub fn is_set(&self) -> bool {
        !self.public_address.is_empty()
    }

    /// One-line SSH hint printed by `state` once a node is reachable.
    pub fn describe(&self) -> Option<String> {
        if self.is_set() {
            Some(format!("ssh -i {} {}@{}", self.private_key_path, self.user_name, self.public_address))
        } else {
            None
        }
    }
}

/// Identifies which cloud account/region/zone a resource belongs to.
/// `credential_bytes` feeds the content hash that makes two identically
/// named resources under different credentials fingerprint differently
/// (Invariant I2).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProviderIdentity {
    pub name: String,
    pub region: String,
    pub zone: String,
    pub credentials_path: String,
}

impl ProviderIdentity {
    pub fn fingerprint(&self, credential_bytes: &[u8]) -> String {
        provider_fingerprint(&self.name, &self.region, &self.zone, credential_bytes)
    }
}

/// Derives the `state/<kind>/<providerFingerprint>/<name>` hierarchy every
/// entity kind persists under.
pub fn hierarchy(kind: &str, fingerprint: &str, name: &str) -> Vec<String> {
    vec![kind.to_string(), fingerprint.to_string(), name.to_string()]
}
