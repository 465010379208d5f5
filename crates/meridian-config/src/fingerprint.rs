use sha2::{Digest, Sha256};

use crate::params::UserVariables;

/// A content fingerprint over a subset of user variables, used to decide
/// whether a persisted projection still describes the same cloud resource
/// (Invariant I2). `subset` should already contain only the fields the
/// entity kind persists — see each entity's `persisted_fingerprint`.
pub fn variable_fingerprint(subset: &UserVariables) -> String {
    let mut hasher = Sha256::new();
    for (k, v) in subset {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint over the provider identity: name, region, zone, and the raw
/// bytes of the credentials file (not its path — a renamed-but-identical
/// credentials file must fingerprint the same).
pub fn provider_fingerprint(name: &str, region: &str, zone: &str, credentials: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"/");
    hasher.update(region.as_bytes());
    hasher.update(b"/");
    hasher.update(zone.as_bytes());
    hasher.update(b"/");
    hasher.update(credentials);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_under_insertion_order() {
        let mut a = UserVariables::new();
        a.insert("b".into(), "2".into());
        a.insert("a".into(), "1".into());

        let mut b = UserVariables::new();
        b.insert("a".into(), "1".into());
        b.insert("b".into(), "2".into());

        assert_eq!(variable_fingerprint(&a), variable_fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_value() {
        let mut a = UserVariables::new();
        a.insert("disk_size".into(), "50".into());
        let mut b = UserVariables::new();
        b.insert("disk_size".into(), "100".into());

        assert_ne!(variable_fingerprint(&a), variable_fingerprint(&b));
    }

    #[test]
    fn provider_fingerprint_depends_on_credential_bytes() {
        let a = provider_fingerprint("gcp", "us-east1", "us-east1-b", b"secret-a");
        let b = provider_fingerprint("gcp", "us-east1", "us-east1-b", b"secret-b");
        assert_ne!(a, b);
    }
}
