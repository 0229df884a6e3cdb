//! Role maps declared in configuration instead of code.
//!
//! ```yaml
//! models:
//!   Document:
//!     roles:
//!       reviewer:
//!         read: [title, body]
//!         granted_by: [reviewers]
//!     datasets:
//!       primary: [title]
//!     json_datasets: [primary]
//! ```
//!
//! Entries are merged into a class with
//! [`crate::ClassDefinition::apply_config`] and treated like direct
//! declarations.

use std::collections::{BTreeMap, BTreeSet};

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};

use crate::constants::BUILTIN_ROLES;
use crate::error::ConfigError;
use crate::role_map::{RoleAttrs, split_path};

/// Environment prefix for overrides, e.g.
/// `COASTER_ROLES_MODELS__DOCUMENT__JSON_DATASETS`.
pub const ENV_PREFIX: &str = "COASTER_ROLES_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default)]
    pub models: BTreeMap<String, ModelRolesConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRolesConfig {
    #[serde(default)]
    pub roles: BTreeMap<String, RoleAttrs>,
    #[serde(default)]
    pub datasets: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub json_datasets: Vec<String>,
}

impl RolesConfig {
    /// Extract and validate from an assembled figment.
    ///
    /// # Errors
    /// Returns [`ConfigError::Load`] if extraction fails, or a validation
    /// error.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML document, with [`ENV_PREFIX`] environment overrides.
    ///
    /// # Errors
    /// Same as [`Self::from_figment`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Yaml::string(yaml))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    #[must_use]
    pub fn model(&self, class: &str) -> Option<&ModelRolesConfig> {
        self.models.get(class)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for empty or built-in role names, empty
    /// dataset names, JSON datasets that are not declared, and malformed
    /// relationship paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for model in self.models.values() {
            for (role, attrs) in &model.roles {
                if role.trim().is_empty() {
                    return Err(ConfigError::InvalidRoleName(role.clone()));
                }
                if BUILTIN_ROLES.contains(&role.as_str())
                    && (!attrs.granted_by.is_empty() || !attrs.granted_via.is_empty())
                {
                    return Err(ConfigError::InvalidRoleName(role.clone()));
                }
                for path in attrs.granted_by.iter().chain(attrs.granted_via.keys()) {
                    split_path(path)?;
                }
            }
            for name in model.datasets.keys() {
                if name.trim().is_empty() {
                    return Err(ConfigError::InvalidDataset(name.clone()));
                }
            }
            for name in &model.json_datasets {
                if !model.datasets.contains_key(name) {
                    return Err(ConfigError::InvalidDataset(name.clone()));
                }
            }
        }
        Ok(())
    }
}
