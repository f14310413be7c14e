//! TOML-based compiler settings.
//!
//! Example configuration:
//! ```toml
//! [labels]
//! constant_prefix = "param_"
//! subquery_prefix = "generatedSubquery_"
//!
//! [rendering]
//! apply_root_modifiers = true
//! wrap_collection_constants = true
//!
//! [templates.CONCAT]
//! pattern = "{0} || {1}"
//! precedence = 30
//!
//! [entities.Person]
//! attributes = [
//!     { path = "id", columns = ["id"] },
//!     { path = "name", columns = ["name"] },
//!     { path = "employer", association = true, columns = ["employer_id"] },
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::metamodel::EntityInfo;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Unknown operator in template override: {0}")]
    UnknownOperator(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Generated label formats.
    pub labels: LabelSettings,

    /// Rendering switches.
    pub rendering: RenderingSettings,

    /// Operator template overrides, keyed by operator name.
    pub templates: BTreeMap<String, TemplateOverride>,

    /// Static entity metamodel.
    pub entities: BTreeMap<String, EntityInfo>,
}

/// Prefixes for the labels the serializer hands out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelSettings {
    /// Constants become `<prefix>0`, `<prefix>1`, ...
    pub constant_prefix: String,

    /// Subqueries become `<prefix>1`, `<prefix>2`, ... per clause.
    pub subquery_prefix: String,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            constant_prefix: "param_".to_string(),
            subquery_prefix: "generatedSubquery_".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderingSettings {
    /// Apply the root query's LIMIT/OFFSET. Disable when a paging wrapper
    /// applies them itself.
    pub apply_root_modifiers: bool,

    /// Wrap collection-valued constant placeholders in parentheses.
    pub wrap_collection_constants: bool,
}

impl Default for RenderingSettings {
    fn default() -> Self {
        Self {
            apply_root_modifiers: true,
            wrap_collection_constants: true,
        }
    }
}

/// Replacement template for one operator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TemplateOverride {
    pub pattern: String,

    #[serde(default = "default_precedence")]
    pub precedence: i32,
}

fn default_precedence() -> i32 {
    crate::templates::precedence::FUNCTION
}

impl CompilerSettings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: CompilerSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.labels.constant_prefix.is_empty() || self.labels.subquery_prefix.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "label prefixes must not be empty".to_string(),
            ));
        }
        if self.labels.constant_prefix == self.labels.subquery_prefix {
            return Err(SettingsError::InvalidConfig(format!(
                "constant and subquery labels share the prefix '{}'",
                self.labels.constant_prefix
            )));
        }
        for (entity, info) in &self.entities {
            if let Some(attr) = info.attributes.iter().find(|a| a.path.is_empty()) {
                return Err(SettingsError::InvalidConfig(format!(
                    "entity '{}' declares an attribute with an empty path (columns {:?})",
                    entity, attr.columns
                )));
            }
        }
        Ok(())
    }
}
