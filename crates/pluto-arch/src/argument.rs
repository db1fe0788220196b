//! Arguments of constructor calls and relationship invocations.

use crate::EntityRef;
use serde::{Deserialize, Serialize};

/// One parameter of a constructor call or a relationship invocation.
///
/// The tag is what separates "depends on a literal" from "depends on another
/// graph node" for the sorter and the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Argument {
    /// Literal source text, e.g. `"/hello"` or `{ ttl: 10 }`.
    Text {
        index: usize,
        name: String,
        value: String,
    },

    /// A reference to a resource by id.
    Resource {
        index: usize,
        name: String,
        #[serde(rename = "resourceId")]
        resource_id: String,
    },

    /// A reference to a closure by id.
    Closure {
        index: usize,
        name: String,
        #[serde(rename = "closureId")]
        closure_id: String,
    },

    /// A derived runtime property of a resource, e.g. `router.url()`.
    CapturedProperty {
        index: usize,
        name: String,
        #[serde(rename = "resourceId")]
        resource_id: String,
        property: String,
    },
}

// Builder methods for arguments
impl Argument {
    pub fn text(index: usize, name: impl Into<String>, value: impl Into<String>) -> Self {
        Argument::Text {
            index,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn resource(index: usize, name: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Argument::Resource {
            index,
            name: name.into(),
            resource_id: resource_id.into(),
        }
    }

    pub fn closure(index: usize, name: impl Into<String>, closure_id: impl Into<String>) -> Self {
        Argument::Closure {
            index,
            name: name.into(),
            closure_id: closure_id.into(),
        }
    }

    pub fn captured_property(
        index: usize,
        name: impl Into<String>,
        resource_id: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Argument::CapturedProperty {
            index,
            name: name.into(),
            resource_id: resource_id.into(),
            property: property.into(),
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Argument::Text { index, .. }
            | Argument::Resource { index, .. }
            | Argument::Closure { index, .. }
            | Argument::CapturedProperty { index, .. } => *index,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Argument::Text { name, .. }
            | Argument::Resource { name, .. }
            | Argument::Closure { name, .. }
            | Argument::CapturedProperty { name, .. } => name,
        }
    }

    /// The graph node this argument points at, if any.
    pub fn referenced_entity(&self) -> Option<EntityRef> {
        match self {
            Argument::Text { .. } => None,
            Argument::Resource { resource_id, .. }
            | Argument::CapturedProperty { resource_id, .. } => {
                Some(EntityRef::resource(resource_id.clone()))
            }
            Argument::Closure { closure_id, .. } => Some(EntityRef::closure(closure_id.clone())),
        }
    }

    /// Render the argument the way it appears in generated code.
    pub fn stringify(&self) -> String {
        match self {
            Argument::Text { value, .. } => value.clone(),
            Argument::Resource { resource_id, .. } => resource_id.clone(),
            Argument::Closure { closure_id, .. } => closure_id.clone(),
            Argument::CapturedProperty {
                resource_id,
                property,
                ..
            } => format!("{}.{}()", resource_id, property),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityKind;

    #[test]
    fn test_stringify() {
        assert_eq!(Argument::text(0, "path", "\"/hello\"").stringify(), "\"/hello\"");
        assert_eq!(
            Argument::captured_property(1, "url", "router", "url").stringify(),
            "router.url()"
        );
    }

    #[test]
    fn test_referenced_entity() {
        assert_eq!(Argument::text(0, "name", "\"s\"").referenced_entity(), None);

        let entity = Argument::closure(1, "fn", "fn_3_17")
            .referenced_entity()
            .unwrap();
        assert_eq!(entity.kind, EntityKind::Closure);
        assert_eq!(entity.id, "fn_3_17");

        let entity = Argument::captured_property(0, "url", "router", "url")
            .referenced_entity()
            .unwrap();
        assert_eq!(entity.kind, EntityKind::Resource);
    }

    #[test]
    fn test_tagged_json() {
        let arg = Argument::resource(2, "store", "proj_dev_store");
        let json = serde_json::to_value(&arg).unwrap();
        assert_eq!(json["type"], "resource");
        assert_eq!(json["resourceId"], "proj_dev_store");
        assert_eq!(json["index"], 2);
    }
}
