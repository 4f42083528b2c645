//! Declaration file loading.
//!
//! This module loads declaration files from YAML, expands `${VAR}`
//! references from the environment and applies the `ZITADEL_*` overrides.

use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result, ZitadelError};

use super::spec::DeployConfig;

/// Environment variable holding the access token.
pub const TOKEN_ENV: &str = "ZITADEL_ACCESS_TOKEN";

/// Overrides `provider.domain`.
pub const DOMAIN_ENV: &str = "ZITADEL_DOMAIN";

/// Overrides `provider.port`.
pub const PORT_ENV: &str = "ZITADEL_PORT";

/// Overrides `provider.insecure`.
pub const INSECURE_ENV: &str = "ZITADEL_INSECURE";

/// Overrides `provider.org_id`.
pub const ORG_ID_ENV: &str = "ZITADEL_ORG_ID";

/// A `${VAR}` reference.
const ENV_REFERENCE: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Loader for declaration files.
#[derive(Debug, Default)]
pub struct ConfigParser {
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory `.env` is looked up in.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a declaration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, references an unset
    /// variable, or is not a valid declaration.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading declarations from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a declaration from YAML, expanding `${VAR}` references.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced variable is unset or the YAML is
    /// invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML declarations");

        let expanded = expand_env(content, |name| std::env::var(name).ok())?;
        let config: DeployConfig = serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })?;

        debug!("Parsed {} resource declaration(s)", config.resources.len());
        Ok(config)
    }

    /// Loads a declaration file and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or an override is
    /// malformed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `ZITADEL_*` overrides from `lookup` to the provider settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the port or insecure flag cannot be parsed.
    pub fn apply_env_overrides(
        config: &mut DeployConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        let provider = &mut config.provider;

        if let Some(domain) = lookup(DOMAIN_ENV) {
            debug!("Overriding provider.domain from environment");
            provider.domain = domain;
        }

        if let Some(port) = lookup(PORT_ENV) {
            debug!("Overriding provider.port from environment");
            provider.port = Some(port.parse().map_err(|_| {
                ConfigError::validation(format!("{PORT_ENV}='{port}' is not a port number"), "provider.port")
            })?);
        }

        if let Some(insecure) = lookup(INSECURE_ENV) {
            debug!("Overriding provider.insecure from environment");
            provider.insecure = parse_flag(&insecure).ok_or_else(|| {
                ConfigError::validation(format!("{INSECURE_ENV}='{insecure}' is not a boolean"), "provider.insecure")
            })?;
        }

        if let Some(org_id) = lookup(ORG_ID_ENV) {
            debug!("Overriding provider.org_id from environment");
            provider.org_id = Some(org_id).filter(|id| !id.is_empty());
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the access token from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set.
    pub fn access_token() -> Result<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ConfigError::MissingEnvVar {
                    name: TOKEN_ENV.to_string(),
                }
                .into()
            })
    }
}

/// Replaces every `${VAR}` with the value `lookup` returns for it.
///
/// # Errors
///
/// Returns an error naming the first variable `lookup` has no value for.
pub fn expand_env(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let reference = Regex::new(ENV_REFERENCE)
        .map_err(|e| ZitadelError::internal(format!("Invalid variable pattern: {e}")))?;

    if let Some(missing) = reference
        .captures_iter(content)
        .map(|caps| caps[1].to_string())
        .find(|name| lookup(name.as_str()).is_none())
    {
        return Err(ConfigError::MissingEnvVar { name: missing }.into());
    }

    Ok(reference
        .replace_all(content, |caps: &regex::Captures<'_>| lookup(&caps[1]).unwrap_or_default())
        .into_owned())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Default declaration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "zitadel.deploy.yaml",
    "zitadel.deploy.yml",
    "zitadel.yaml",
    "zitadel.yml",
];

/// Finds the declaration file in `start_dir` or its parents.
///
/// # Errors
///
/// Returns an error if no declaration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found declaration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ZitadelError;
    use crate::resource::{AttrValue, ResourceKind};
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
provider:
  domain: localhost
";
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("minimal config parses");

        assert_eq!(config.provider.domain, "localhost");
        assert_eq!(config.provider.timeout_secs, 30);
        assert!(config.resources.is_empty());
        assert!(config.state.path.ends_with("state.json"));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
provider:
  domain: zitadel.example.com
  port: 8443
  org_id: "100"
state:
  path: /tmp/zitadel-state.json
resources:
  - name: ci-key
    kind: zitadel_machine_key
    attributes:
      user_id: "42"
      key_type: KEY_TYPE_JSON
      expiration_date: "2519-04-01T08:45:00Z"
  - name: viewers
    kind: zitadel_project_member
    attributes:
      project_id: "7"
      user_id: "42"
      roles: [PROJECT_OWNER_VIEWER]
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("full config parses");

        assert_eq!(config.provider.base_url(), "https://zitadel.example.com:8443");
        assert_eq!(config.resource_names(), vec!["ci-key", "viewers"]);
        let viewers = config.resource("viewers").expect("declared");
        assert_eq!(viewers.kind, ResourceKind::ProjectMember);
        assert_eq!(viewers.attributes["roles"], AttrValue::set(["PROJECT_OWNER_VIEWER"]));
    }

    #[test]
    fn test_unknown_kind_is_a_parse_error() {
        let yaml = r"
provider:
  domain: localhost
resources:
  - name: x
    kind: zitadel_unicorn
";
        let err = ConfigParser::new().parse_yaml(yaml, None).expect_err("unknown kind");
        assert!(matches!(err, ZitadelError::Config(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_expand_env() {
        let vars = HashMap::from([("CLIENT_SECRET", "s3cret")]);
        let lookup = |name: &str| vars.get(name).map(|v| (*v).to_string());

        let expanded = expand_env("client_secret: ${CLIENT_SECRET}", lookup).expect("expands");
        assert_eq!(expanded, "client_secret: s3cret");

        let err = expand_env("token: ${NOT_SET}", lookup).expect_err("unset variable");
        assert!(matches!(
            err,
            ZitadelError::Config(ConfigError::MissingEnvVar { ref name }) if name == "NOT_SET"
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ConfigParser::new()
            .parse_yaml("provider:\n  domain: localhost\n", None)
            .expect("parses");
        let vars = HashMap::from([
            (DOMAIN_ENV, "zitadel.internal"),
            (PORT_ENV, "8080"),
            (INSECURE_ENV, "true"),
            (ORG_ID_ENV, "555"),
        ]);

        ConfigParser::apply_env_overrides(&mut config, |name| vars.get(name).map(|v| (*v).to_string()))
            .expect("overrides apply");

        assert_eq!(config.provider.base_url(), "http://zitadel.internal:8080");
        assert_eq!(config.provider.org_id.as_deref(), Some("555"));
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = ConfigParser::new()
            .parse_yaml("provider:\n  domain: localhost\n", None)
            .expect("parses");

        let result = ConfigParser::apply_env_overrides(&mut config, |name| {
            (name == PORT_ENV).then(|| String::from("eighty"))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join("zitadel.deploy.yaml"), "provider:\n  domain: x\n").expect("write");

        let found = find_config_file(&nested).expect("found in parent");
        assert_eq!(found, dir.path().join("zitadel.deploy.yaml"));
    }
}
