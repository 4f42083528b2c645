//! Declaration file types.
//!
//! A declaration file names the service to talk to, where recorded state
//! lives and the entity instances that should exist.
//!
//! ```yaml
//! provider:
//!   domain: zitadel.example.com
//!   org_id: "170000000000000001"
//! state:
//!   path: .zitadel/state.json
//! resources:
//!   - name: ci-viewer
//!     kind: zitadel_org_member
//!     attributes:
//!       user_id: "170000000000000042"
//!       roles: [ORG_OWNER_VIEWER]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::resource::{AttrValue, DeclaredState, FieldType, ResourceKind};

/// Root of a declaration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Service connection settings.
    pub provider: ProviderSettings,

    /// Recorded-state location.
    #[serde(default)]
    pub state: StateConfig,

    /// Declared entity instances.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Connection settings for the ZITADEL instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// Instance domain, without scheme.
    pub domain: String,

    /// Port, when not the scheme default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Use plain HTTP.
    #[serde(default)]
    pub insecure: bool,

    /// Organization used when an entity declares none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Recorded-state location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// Path of the state file.
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

/// One declared entity instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    /// Unique name within the file.
    pub name: String,

    /// Entity kind.
    pub kind: ResourceKind,

    /// Declared field values.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_state_path() -> PathBuf {
    PathBuf::from(crate::state::STATE_DIR).join("state.json")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl ProviderSettings {
    /// Settings for a domain with defaults everywhere else.
    #[must_use]
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            port: None,
            insecure: false,
            org_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Base URL of the API gateways.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.insecure { "http" } else { "https" };
        match self.port {
            Some(port) => format!("{scheme}://{}:{port}", self.domain),
            None => format!("{scheme}://{}", self.domain),
        }
    }
}

impl DeployConfig {
    /// Declared names in file order.
    #[must_use]
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }

    /// Looks up a declared instance by name.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}

impl ResourceConfig {
    /// Declared state built from the attributes.
    ///
    /// Integers given for string fields are taken as strings, since YAML
    /// reads unquoted numeric identifiers as integers.
    #[must_use]
    pub fn declared_state(&self) -> DeclaredState {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, value)| {
                let value = match (self.kind.field(name).map(|f| f.field_type), value) {
                    (Some(FieldType::String), AttrValue::Int(n)) => AttrValue::Str(n.to_string()),
                    _ => value.clone(),
                };
                (name.clone(), value)
            })
            .collect();
        DeclaredState::from_attributes(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let mut settings = ProviderSettings::for_domain("zitadel.example.com");
        assert_eq!(settings.base_url(), "https://zitadel.example.com");

        settings.insecure = true;
        settings.port = Some(8080);
        assert_eq!(settings.base_url(), "http://zitadel.example.com:8080");
    }

    #[test]
    fn test_numeric_ids_become_strings() {
        let resource = ResourceConfig {
            name: String::from("key"),
            kind: ResourceKind::MachineKey,
            attributes: BTreeMap::from([
                (String::from("user_id"), AttrValue::Int(170_000_000_000_000_042)),
                (String::from("key_type"), AttrValue::from("KEY_TYPE_JSON")),
            ]),
        };

        let state = resource.declared_state();
        assert_eq!(state.str_opt("user_id"), Ok(Some("170000000000000042")));
        assert!(!state.has_id());
    }
}
