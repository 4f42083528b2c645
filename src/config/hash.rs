//! Declaration fingerprints.
//!
//! Hashes let the recorded state remember which declaration an instance
//! was last applied from, and let `plan` report a file as unchanged
//! without diffing it.

use sha2::{Digest, Sha256};

use crate::resource::AttrValue;

use super::spec::{DeployConfig, ResourceConfig};

/// Hasher for declaration fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hash of the whole declaration file.
    ///
    /// Resources are hashed in name order, so reordering the file does not
    /// change the hash.
    #[must_use]
    pub fn hash_config(&self, config: &DeployConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.provider.base_url().as_bytes());
        if let Some(org_id) = &config.provider.org_id {
            hasher.update(org_id.as_bytes());
        }

        let mut resources: Vec<&ResourceConfig> = config.resources.iter().collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        for resource in resources {
            hasher.update(self.hash_resource(resource).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Hash of one declared instance.
    #[must_use]
    pub fn hash_resource(&self, resource: &ResourceConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(resource.name.as_bytes());
        hasher.update([0]);
        hasher.update(resource.kind.type_name().as_bytes());

        for (name, value) in resource.declared_state().attributes() {
            hasher.update([0]);
            hasher.update(name.as_bytes());
            hasher.update([0]);
            update_value(&mut hasher, value);
        }

        hex::encode(hasher.finalize())
    }

    /// First 8 characters of a hash, for display.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn update_value(hasher: &mut Sha256, value: &AttrValue) {
    match value {
        AttrValue::Bool(b) => hasher.update([b'b', u8::from(*b)]),
        AttrValue::Int(n) => {
            hasher.update([b'i']);
            hasher.update(n.to_be_bytes());
        }
        AttrValue::Str(s) => {
            hasher.update([b's']);
            hasher.update(s.as_bytes());
        }
        AttrValue::Set(items) => {
            hasher.update([b'[']);
            for item in items {
                hasher.update(item.as_bytes());
                hasher.update([0]);
            }
            hasher.update([b']']);
        }
        AttrValue::Record(fields) => {
            hasher.update([b'{']);
            for (name, value) in fields {
                hasher.update(name.as_bytes());
                hasher.update([0]);
                update_value(hasher, value);
            }
            hasher.update([b'}']);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::resource::ResourceKind;
    use std::collections::BTreeMap;

    fn member(name: &str, roles: &[&str]) -> ResourceConfig {
        ResourceConfig {
            name: name.to_string(),
            kind: ResourceKind::OrgMember,
            attributes: BTreeMap::from([
                (String::from("user_id"), AttrValue::from("42")),
                (String::from("roles"), AttrValue::set(roles.iter().copied())),
            ]),
        }
    }

    fn config(resources: Vec<ResourceConfig>) -> DeployConfig {
        DeployConfig {
            provider: ProviderSettings::for_domain("localhost"),
            state: crate::config::StateConfig::default(),
            resources,
        }
    }

    #[test]
    fn test_resource_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let resource = member("viewer", &["ORG_OWNER_VIEWER"]);

        assert_eq!(hasher.hash_resource(&resource), hasher.hash_resource(&resource));
    }

    #[test]
    fn test_role_change_changes_hash() {
        let hasher = ConfigHasher::new();
        let before = member("viewer", &[]);
        let after = member("viewer", &["ORG_OWNER_VIEWER"]);

        assert_ne!(hasher.hash_resource(&before), hasher.hash_resource(&after));
    }

    #[test]
    fn test_numeric_and_string_ids_hash_alike() {
        let hasher = ConfigHasher::new();
        let quoted = member("viewer", &[]);
        let mut unquoted = quoted.clone();
        unquoted.attributes.insert(String::from("user_id"), AttrValue::Int(42));

        assert_eq!(hasher.hash_resource(&quoted), hasher.hash_resource(&unquoted));
    }

    #[test]
    fn test_config_hash_ignores_order() {
        let hasher = ConfigHasher::new();
        let a = config(vec![member("a", &[]), member("b", &[])]);
        let b = config(vec![member("b", &[]), member("a", &[])]);

        assert_eq!(hasher.hash_config(&a), hasher.hash_config(&b));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        assert_eq!(hasher.short_hash("abcdef1234567890"), "abcdef12");
    }

    #[test]
    fn test_hashes_match() {
        assert!(ConfigHasher::hashes_match("abc123", "abc123"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc124"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc12"));
    }
}
