//! The optional `Pluto.toml` project manifest.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up next to the entry points when `--config` is not given.
pub const MANIFEST_FILE: &str = "Pluto.toml";

/// A parsed Pluto.toml. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub project: Option<Named>,
    #[serde(default)]
    pub stack: Option<Named>,
    #[serde(default)]
    pub build: Build,
    /// package -> path to its declarations, relative to the manifest.
    #[serde(default)]
    pub libraries: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Build {
    pub workdir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Manifest {
    /// Load and parse a manifest; relative paths in it are made relative to its directory.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest: Manifest =
            toml::from_str(&content).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or(Path::new("."));
        if let Some(workdir) = manifest.build.workdir.as_mut() {
            *workdir = base.join(&*workdir);
        }
        for library in manifest.libraries.values_mut() {
            *library = base.join(&*library);
        }
        Ok(manifest)
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|project| project.name.as_str())
    }

    pub fn stack_name(&self) -> Option<&str> {
        self.stack.as_ref().map(|stack| stack.name.as_str())
    }
}
