//! The `plutoc` driver: deduce a TypeScript program, order its architecture,
//! extract every closure and write the architecture out.

pub mod manifest;
pub mod pipeline;

pub use manifest::{Manifest, ManifestError, MANIFEST_FILE};
pub use pipeline::{describe, run, Config, PipelineError, Report, ARCH_FILE, DOT_FILE};
