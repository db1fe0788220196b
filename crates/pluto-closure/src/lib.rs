//! Compute closures and their extraction into deployable artifacts.
//!
//! A [`ComputeClosure`] is a function plus what it needs at runtime: the
//! resources it talks to ([`Dependency`]), the environment variables it reads,
//! and, for library wrappers, the closure it wraps. [`extract`] turns one into
//! a self-contained TypeScript module under a working directory:
//!
//! ```text
//! <workdir>/
//!   __index.ts            exports `handler`
//!   pluto.manifest.json   resolved dependencies and env vars
//!   <user closure dir>/   copied when the chain holds a user closure
//! ```

mod closure;
mod extract;
mod serializer;

pub use closure::*;
pub use extract::{extract, Extraction, Manifest, ManifestDependency};
pub use serializer::{FunctionSerializer, ModuleSerializer};

use std::path::PathBuf;
use thiserror::Error;

/// File name of the generated entry module.
pub const ENTRYPOINT_FILE: &str = "__index.ts";

/// Name the entry module exports its handler under.
pub const ENTRYPOINT_EXPORT: &str = "handler";

/// File name of the extraction manifest.
pub const MANIFEST_FILE: &str = "pluto.manifest.json";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("the working directory {0} does not exist")]
    MissingWorkdir(PathBuf),

    #[error("closure '{closure}' cannot be serialized: {reason}")]
    Serialize { closure: String, reason: String },

    #[error("only one user-defined closure is supported per chain, found '{first}' and '{second}'")]
    MultipleUserClosures { first: String, second: String },

    #[error("closure '{closure}' depends on resource '{resource}', which is not in the architecture")]
    UnresolvedDependency { closure: String, resource: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}
