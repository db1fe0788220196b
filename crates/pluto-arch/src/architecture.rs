//! The aggregate graph and its integrity checks.

use crate::{Argument, Closure, EntityKind, EntityRef, Relationship, Resource};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum ArchError {
    #[error("resource '{id}' already exists (declared as '{existing}' and '{duplicate}')")]
    DuplicateResource {
        id: String,
        existing: String,
        duplicate: String,
    },

    #[error("compute closure '{0}' already exists")]
    DuplicateClosure(String),

    #[error("{owner} references {target}, which is not part of the architecture")]
    DanglingReference { owner: String, target: EntityRef },

    #[error("{0} cannot be found")]
    UnknownEntity(EntityRef),
}

/// Either side of an [`EntityRef`] lookup.
#[derive(Debug, Clone, Copy)]
pub enum Entity<'a> {
    Resource(&'a Resource),
    Closure(&'a Closure),
}

/// Resources keyed by name, closures keyed by id, relationships in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Architecture {
    resources: BTreeMap<String, Resource>,
    closures: BTreeMap<String, Closure>,
    relationships: Vec<Relationship>,
    /// Generator-specific annotations.
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Architecture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an architecture from its parts and check every invariant.
    pub fn from_parts(
        resources: impl IntoIterator<Item = Resource>,
        closures: impl IntoIterator<Item = Closure>,
        relationships: Vec<Relationship>,
        extras: BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, ArchError> {
        let mut arch = Architecture {
            extras,
            ..Default::default()
        };
        for closure in closures {
            arch.insert_closure(closure)?;
        }
        // Resource arguments may point at resources that sort later by name,
        // so references are checked once everything is in place.
        for resource in resources {
            arch.insert_resource(resource)?;
        }
        arch.relationships = relationships;
        arch.validate()?;
        Ok(arch)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn closures(&self) -> impl Iterator<Item = &Closure> {
        self.closures.values()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.closures.is_empty() && self.relationships.is_empty()
    }

    pub fn add_resource(&mut self, resource: Resource) -> Result<(), ArchError> {
        let owner = format!("resource '{}'", resource.id);
        self.check_arguments(&owner, &resource.arguments)?;
        self.insert_resource(resource)
    }

    pub fn add_closure(&mut self, closure: Closure) -> Result<(), ArchError> {
        self.insert_closure(closure)
    }

    pub fn add_relationship(&mut self, relationship: Relationship) -> Result<(), ArchError> {
        self.check_relationship(&relationship)?;
        debug!(
            kind = ?relationship.kind,
            from = %relationship.from,
            operation = %relationship.operation,
            "add relationship"
        );
        self.relationships.push(relationship);
        Ok(())
    }

    pub fn find_resource(&self, id: &str) -> Option<&Resource> {
        self.resources.values().find(|res| res.id == id)
    }

    pub fn resource_by_name(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn find_closure(&self, id: &str) -> Option<&Closure> {
        self.closures.get(id)
    }

    pub fn find_entity(&self, entity: &EntityRef) -> Option<Entity<'_>> {
        match entity.kind {
            EntityKind::Resource => self.find_resource(&entity.id).map(Entity::Resource),
            EntityKind::Closure => self.find_closure(&entity.id).map(Entity::Closure),
        }
    }

    /// Check that every reference resolves. Duplicates are rejected at insert time.
    pub fn validate(&self) -> Result<(), ArchError> {
        for resource in self.resources.values() {
            let owner = format!("resource '{}'", resource.id);
            self.check_arguments(&owner, &resource.arguments)?;
        }
        for relationship in &self.relationships {
            self.check_relationship(relationship)?;
        }
        Ok(())
    }

    fn insert_resource(&mut self, resource: Resource) -> Result<(), ArchError> {
        if let Some(existing) = self
            .resources
            .values()
            .find(|res| res.id == resource.id || res.name == resource.name)
        {
            return Err(ArchError::DuplicateResource {
                id: resource.id.clone(),
                existing: existing.name.clone(),
                duplicate: resource.name.clone(),
            });
        }
        debug!(id = %resource.id, r#type = %resource.type_tag, "add resource");
        self.resources.insert(resource.name.clone(), resource);
        Ok(())
    }

    fn insert_closure(&mut self, closure: Closure) -> Result<(), ArchError> {
        if self.closures.contains_key(&closure.id) {
            return Err(ArchError::DuplicateClosure(closure.id));
        }
        debug!(id = %closure.id, path = %closure.path, "add closure");
        self.closures.insert(closure.id.clone(), closure);
        Ok(())
    }

    fn check_relationship(&self, relationship: &Relationship) -> Result<(), ArchError> {
        if self.find_entity(&relationship.from).is_none() {
            return Err(ArchError::UnknownEntity(relationship.from.clone()));
        }
        let owner = format!("relationship '{}'", relationship.operation);
        for target in &relationship.to {
            if self.find_entity(target).is_none() {
                return Err(ArchError::DanglingReference {
                    owner,
                    target: target.clone(),
                });
            }
        }
        self.check_arguments(&owner, &relationship.arguments)
    }

    fn check_arguments(&self, owner: &str, arguments: &[Argument]) -> Result<(), ArchError> {
        for target in arguments.iter().filter_map(Argument::referenced_entity) {
            if self.find_entity(&target).is_none() {
                return Err(ArchError::DanglingReference {
                    owner: owner.to_string(),
                    target,
                });
            }
        }
        Ok(())
    }
}
