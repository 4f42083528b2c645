//! Declaration file handling.
//!
//! This module loads, validates and fingerprints the YAML file that lists
//! the entity instances to reconcile.

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{
    expand_env, find_config_file, ConfigParser, DEFAULT_CONFIG_FILES, DOMAIN_ENV, INSECURE_ENV,
    ORG_ID_ENV, PORT_ENV, TOKEN_ENV,
};
pub use spec::{DeployConfig, ProviderSettings, ResourceConfig, StateConfig};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
