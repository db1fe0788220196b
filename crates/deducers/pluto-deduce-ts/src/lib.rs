//! Static analyzer that deduces a pluto architecture from TypeScript.
//!
//! The deducer parses the entry points and every module they import with
//! tree-sitter, indexes the declared types, and finds:
//!
//! - resources: top-level `new T(...)` where `T` implements `IResource`;
//! - closures: functions handed to resources where an `FnResource` is expected;
//! - relationships: infrastructure calls at the top level, plus client calls
//!   and captured-property reads inside closures.
//!
//! ```no_run
//! use pluto_deduce_ts::{DeduceOptions, Deducer};
//!
//! let deduction = Deducer::new(DeduceOptions::default()).deduce(&["src/index.ts"])?;
//! for closure in deduction.architecture.closures() {
//!     println!("{} -> {}", closure.id, closure.path);
//! }
//! # Ok::<(), pluto_deduce_ts::DeduceError>(())
//! ```

mod closure;
mod contracts;
mod deducer;
mod error;
mod loader;
mod materialize;
mod scope;
mod syntax;
mod types;

pub use contracts::BASE_PACKAGE;
pub use deducer::{DeduceOptions, Deducer, Library, PLUTO_PACKAGE};
pub use error::DeduceError;
pub use materialize::CLOSURE_MODULE;

use pluto_arch::{Architecture, Location};
use pluto_closure::{Capture, ComputeClosure, Dependency};
use std::collections::BTreeMap;

/// The result of a deduction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deduction {
    pub architecture: Architecture,
    /// What each closure captured, by closure id.
    pub closures: BTreeMap<String, ClosureSource>,
}

/// Source of one closure and everything it captured.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureSource {
    pub location: Location,
    /// The function, as written.
    pub code: String,
    /// Import statements the function relies on.
    pub imports: Vec<String>,
    /// Top-level declarations the function relies on, in source order.
    pub segments: Vec<String>,
    /// Bindings that cannot be copied, as [`Capture::Opaque`].
    pub opaque: Vec<Capture>,
    pub dependencies: Vec<Dependency>,
    pub envs: Vec<String>,
}

impl Deduction {
    /// The compute closure for `id`, ready for extraction.
    ///
    /// Opaque captures ride along so extraction reports them.
    pub fn compute_closure(&self, id: &str) -> Option<ComputeClosure> {
        let source = self.closures.get(id)?;
        let dir = self.architecture.find_closure(id)?.path.dir()?;

        let mut closure = ComputeClosure::from_dir(id, dir)
            .with_dependencies(source.dependencies.clone())
            .with_envs(source.envs.clone());
        closure.code.captures.extend(source.opaque.iter().cloned());
        Some(closure)
    }
}
