//! Entity metamodel collaborator.
//!
//! The compiler asks the metamodel for two things when a CTE body selects a
//! whole entity: the owned singular attributes to bind, and whether two of
//! them map to the same storage column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::CompilerSettings;

/// An owned singular attribute of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttributeInfo {
    /// Attribute path relative to the entity, dotted for embeddables.
    pub path: String,

    /// Attribute type name.
    #[serde(default)]
    pub type_name: String,

    /// Associations are never bound by whole-entity expansion.
    #[serde(default)]
    pub association: bool,

    /// Storage columns backing this attribute.
    #[serde(default)]
    pub columns: Vec<String>,
}

impl AttributeInfo {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            type_name: String::new(),
            association: false,
            columns: vec![path.replace('.', "_")],
        }
    }

    #[must_use]
    pub fn typed(mut self, type_name: &str) -> Self {
        self.type_name = type_name.to_string();
        self
    }

    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    #[must_use]
    pub fn association(mut self) -> Self {
        self.association = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EntityInfo {
    #[serde(default)]
    pub attributes: Vec<AttributeInfo>,
}

/// Source of entity attribute metadata.
pub trait EntityMetamodel: std::fmt::Debug + Send + Sync {
    /// Owned singular attributes of `entity`, in declaration order.
    fn attributes(&self, entity: &str) -> Vec<AttributeInfo>;

    /// Whether `a` and `b` share storage. Only the first of a group of
    /// column-equivalent attributes is bound.
    fn is_column_equivalent(&self, _entity: &str, a: &AttributeInfo, b: &AttributeInfo) -> bool {
        a.columns.iter().any(|column| b.columns.contains(column))
    }
}

/// Metamodel declared up front, in code or in settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StaticMetamodel {
    entities: BTreeMap<String, EntityInfo>,
}

impl StaticMetamodel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &CompilerSettings) -> Self {
        Self {
            entities: settings.entities.clone(),
        }
    }

    #[must_use]
    pub fn with_entity(mut self, entity: &str, attributes: Vec<AttributeInfo>) -> Self {
        self.entities
            .insert(entity.to_string(), EntityInfo { attributes });
        self
    }

    pub fn entity(&self, entity: &str) -> Option<&EntityInfo> {
        self.entities.get(entity)
    }
}

impl EntityMetamodel for StaticMetamodel {
    fn attributes(&self, entity: &str) -> Vec<AttributeInfo> {
        self.entities
            .get(entity)
            .map(|info| info.attributes.clone())
            .unwrap_or_default()
    }
}
