//! Declared, independently provisionable units.

use crate::{Argument, Location};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resource such as a key-value store or a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Platform-facing identifier, see [`crate::resource_id`].
    pub id: String,
    /// Display name: the `name` constructor argument, else the variable it is bound to.
    #[serde(skip)]
    pub name: String,
    /// Fully-qualified type tag, e.g. `@plutolang/pluto.Router`.
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Declaration sites.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    /// Constructor arguments.
    #[serde(rename = "parameters", default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Argument>,
    /// Generator-specific annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Resource {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        type_tag: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            type_tag: type_tag.into(),
            locations: Vec::new(),
            arguments,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    /// The `TypeName` part of the type tag.
    pub fn short_type(&self) -> &str {
        self.type_tag
            .rsplit_once('.')
            .map(|(_, name)| name)
            .unwrap_or(&self.type_tag)
    }
}
