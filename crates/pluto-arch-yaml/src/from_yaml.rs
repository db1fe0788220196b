//! Convert YAML back to an architecture.

use crate::{Document, YamlError};
use pluto_arch::Architecture;

/// Parse an architecture and check every graph invariant.
pub fn from_yaml(source: &str) -> Result<Architecture, YamlError> {
    let doc: Document = serde_yaml::from_str(source)?;

    // Names and ids are the map keys, not fields.
    let resources = doc.resources.into_iter().map(|(name, mut res)| {
        res.name = name;
        res
    });
    let closures = doc.closures.into_iter().map(|(id, mut closure)| {
        closure.id = id;
        closure
    });

    Ok(Architecture::from_parts(
        resources,
        closures,
        doc.relationships,
        doc.extras,
    )?)
}
