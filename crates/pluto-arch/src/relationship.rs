//! Typed, directed edges between resources and closures.

use crate::Argument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of node an endpoint refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Resource,
    Closure,
}

/// A typed reference to a resource or a closure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn resource(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Resource,
            id: id.into(),
        }
    }

    pub fn closure(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Closure,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntityKind::Resource => write!(f, "resource '{}'", self.id),
            EntityKind::Closure => write!(f, "closure '{}'", self.id),
        }
    }
}

/// Relationship kinds, named the way the persisted form names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    /// Infrastructure: a provisioning-time method wires a resource to others.
    Create,
    /// Client: a closure calls a runtime method of a resource.
    MethodCall,
    /// Captured property: a closure reads a derived property of a resource.
    PropertyAccess,
}

impl RelationshipKind {
    pub fn is_infrastructure(self) -> bool {
        self == RelationshipKind::Create
    }
}

/// A directed edge from one entity to one or more others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from: EntityRef,
    pub to: Vec<EntityRef>,
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    pub operation: String,
    #[serde(rename = "parameters", default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Argument>,
}

// Builder methods for relationships
impl Relationship {
    /// `caller.operation(args...)` executed at provisioning time.
    ///
    /// Every resource or closure referenced by `args` becomes a target.
    pub fn infrastructure(
        caller: impl Into<String>,
        operation: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Self {
        let mut to: Vec<EntityRef> = Vec::new();
        for entity in arguments.iter().filter_map(Argument::referenced_entity) {
            if !to.contains(&entity) {
                to.push(entity);
            }
        }

        Self {
            from: EntityRef::resource(caller),
            to,
            kind: RelationshipKind::Create,
            operation: operation.into(),
            arguments,
        }
    }

    /// `resource.operation(...)` executed by a closure at runtime.
    pub fn client(
        closure: impl Into<String>,
        resource: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            from: EntityRef::closure(closure),
            to: vec![EntityRef::resource(resource)],
            kind: RelationshipKind::MethodCall,
            operation: operation.into(),
            arguments: Vec::new(),
        }
    }

    /// `resource.property` read by a closure at runtime.
    pub fn captured_property(
        closure: impl Into<String>,
        resource: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            from: EntityRef::closure(closure),
            to: vec![EntityRef::resource(resource)],
            kind: RelationshipKind::PropertyAccess,
            operation: property.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<Argument>) -> Self {
        self.arguments = arguments;
        self
    }

    /// The resource a client or captured-property relationship targets.
    pub fn target_resource(&self) -> Option<&str> {
        self.to
            .iter()
            .find(|entity| entity.kind == EntityKind::Resource)
            .map(|entity| entity.id.as_str())
    }
}
