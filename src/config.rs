//! Engine configuration and field plan.
//!
//! The configuration is loaded once by the driver, validated, and then
//! shared read-only with every entity parse.
//!
//! ```yaml
//! aggregate_entity: World
//! value:
//!   fiscal_year_as_year: false
//! fields:
//!   - name: gdp
//!     path: Economy.Real GDP (purchasing power parity)
//!     handler: year_series
//!   - name: languages
//!     path: People and Society.Languages
//!     handler: list
//!   - name: world_population
//!     path: People and Society.Population
//!     handler: value
//!     aggregate_only: true
//! ```

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::extraction::ExtractOptions;
use crate::handler_registry::HandlerRegistry;
use crate::split::SplitOptions;
use crate::value::ValueOptions;

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config: {}", e),
            ConfigError::Yaml(e) => write!(f, "Failed to parse YAML: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

fn default_aggregate_entity() -> String {
    "World".to_string()
}

fn default_true() -> bool {
    true
}

// Present-but-null must stay `Some(Null)`, distinct from an absent key.
fn explicit_value<'de, D>(deserializer: D) -> Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

/// One field of the extraction plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Key under which the result is stored in the entity record
    pub name: String,

    /// Dotted path into the entity document
    pub path: String,

    /// Registered handler name
    pub handler: String,

    #[serde(default = "default_true")]
    pub allow_empty: bool,

    /// Only extract for the aggregate entity
    #[serde(default)]
    pub aggregate_only: bool,

    /// Value used when the field is missing, empty or fails. `null` is
    /// honored; leaving it out falls back to an empty object.
    #[serde(default, deserialize_with = "explicit_value")]
    pub default: Option<JsonValue>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            handler: handler.into(),
            allow_empty: true,
            aggregate_only: false,
            default: None,
        }
    }

    /// Dispatcher options for this field.
    pub fn extract_options(&self, config: &EngineConfig) -> ExtractOptions {
        let mut options = ExtractOptions::default().named(self.name.clone());
        if let Some(default) = &self.default {
            options = options.with_default(default.clone());
        }
        if !self.allow_empty {
            options = options.require_non_empty();
        }
        if self.aggregate_only {
            options = options.restricted_to(config.aggregate_entity.clone());
        }
        options
    }
}

/// Immutable engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Entity id of the aggregate record that `aggregate_only` fields belong to
    #[serde(default = "default_aggregate_entity")]
    pub aggregate_entity: String,

    #[serde(default)]
    pub split: SplitOptions,

    #[serde(default)]
    pub value: ValueOptions,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aggregate_entity: default_aggregate_entity(),
            split: SplitOptions::default(),
            value: ValueOptions::default(),
            fields: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns error if file doesn't exist, has invalid format, or fails
    /// [`EngineConfig::validate_plan`]
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate_plan()?;
        Ok(config)
    }

    /// Check the field plan on its own: non-empty names and paths, unique names.
    pub fn validate_plan(&self) -> Result<(), ConfigError> {
        if self.aggregate_entity.trim().is_empty() {
            return Err(ConfigError::Invalid("aggregate_entity must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Field with path '{}' has an empty name",
                    field.path
                )));
            }
            if field.path.split('.').all(|s| s.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "Field '{}' has an empty path",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Check that every field names a registered handler.
    pub fn validate_handlers(&self, registry: &HandlerRegistry) -> Result<(), ConfigError> {
        for field in &self.fields {
            if !registry.has_handler(&field.handler) {
                return Err(ConfigError::Invalid(format!(
                    "Field '{}' uses unknown handler '{}'",
                    field.name, field.handler
                )));
            }
        }
        Ok(())
    }

    /// Built-in handlers configured with this engine's split and value options.
    pub fn builtin_registry(&self) -> HandlerRegistry {
        HandlerRegistry::with_builtins(&self.split, &self.value)
    }
}
