//! Persisted forms of the pluto architecture IR.
//!
//! The YAML document is what downstream generators read:
//!
//! ```yaml
//! resources:
//!   queue:
//!     id: hello_dev__plutolang_pluto_Queue_queue
//!     type: '@plutolang/pluto.Queue'
//!     parameters:
//!     - type: text
//!       index: 0
//!       name: name
//!       value: '"queue"'
//! closures:
//!   handler:
//!     path: .pluto/closures/handler
//! relationships:
//! - from: { type: resource, id: hello_dev__plutolang_pluto_Queue_queue }
//!   to: [{ type: closure, id: handler }]
//!   type: Create
//!   operation: subscribe
//! ```
//!
//! Resources are keyed by display name and closures by id; empty sections and
//! empty fields are left out.

mod dot;
mod from_yaml;
mod to_yaml;

pub use dot::to_dot;
pub use from_yaml::from_yaml;
pub use to_yaml::to_yaml;

use pluto_arch::{ArchError, Closure, Relationship, Resource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum YamlError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("inconsistent architecture: {0}")]
    Arch(#[from] ArchError),
}

/// On-disk layout of an architecture.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    resources: BTreeMap<String, Resource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    closures: BTreeMap<String, Closure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extras: BTreeMap<String, serde_json::Value>,
}
