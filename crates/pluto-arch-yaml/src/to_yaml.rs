//! Convert an architecture to YAML.

use crate::{Document, YamlError};
use pluto_arch::Architecture;

/// Serialize an architecture. Output is stable for a given architecture.
pub fn to_yaml(arch: &Architecture) -> Result<String, YamlError> {
    let doc = Document {
        resources: arch
            .resources()
            .map(|res| (res.name.clone(), res.clone()))
            .collect(),
        closures: arch
            .closures()
            .map(|closure| (closure.id.clone(), closure.clone()))
            .collect(),
        relationships: arch.relationships().to_vec(),
        extras: arch.extras.clone(),
    };
    Ok(serde_yaml::to_string(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluto_arch::{Argument, Closure, Relationship, Resource};

    #[test]
    fn test_empty_sections_omitted() {
        let yaml = to_yaml(&Architecture::new()).unwrap();
        assert_eq!(yaml.trim(), "{}");
    }

    #[test]
    fn test_layout() {
        let mut arch = Architecture::new();
        arch.add_resource(Resource::new(
            "p_s_KVStore_kv",
            "kv",
            "@plutolang/pluto.KVStore",
            vec![],
        ))
        .unwrap();
        arch.add_closure(Closure::inline("handler")).unwrap();
        arch.add_relationship(
            Relationship::client("handler", "p_s_KVStore_kv", "get")
                .with_arguments(vec![Argument::text(0, "key", "\"k\"")]),
        )
        .unwrap();

        let yaml = to_yaml(&arch).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(value["resources"]["kv"]["id"].as_str(), Some("p_s_KVStore_kv"));
        assert!(value["resources"]["kv"].get("parameters").is_none());
        assert!(value["resources"]["kv"].get("name").is_none());
        assert_eq!(value["closures"]["handler"]["path"].as_str(), Some("inline"));
        assert_eq!(value["relationships"][0]["type"].as_str(), Some("MethodCall"));
        assert_eq!(
            value["relationships"][0]["parameters"][0]["value"].as_str(),
            Some("\"k\"")
        );
        assert!(value.get("extras").is_none());
    }
}
