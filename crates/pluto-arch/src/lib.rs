//! Core IR types for the pluto deduction pipeline.
//!
//! The IR is a graph of [`Resource`]s, [`Closure`]s and [`Relationship`]s
//! collected in an [`Architecture`]. It is deliberately platform-agnostic:
//! a `@plutolang/pluto.Queue` is just a resource with a type tag, and what it
//! becomes on a given cloud is decided by generators downstream.
//!
//! The deducer builds an `Architecture` incrementally; after that it is only
//! read (by the sorter, the extractor, and the YAML writer).

mod architecture;
mod argument;
mod closure;
mod registry;
mod relationship;
mod resource;
mod resource_id;

pub use architecture::*;
pub use argument::*;
pub use closure::*;
pub use registry::*;
pub use relationship::*;
pub use resource::*;
pub use resource_id::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A zero-based line/column pair. Columns count bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A source extent in one file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub start: Position,
    pub end: Position,
}

impl Location {
    pub fn new(file: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            file: file.into(),
            start,
            end,
        }
    }
}

impl fmt::Display for Location {
    /// One-based, the way editors and compilers print positions.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file,
            self.start.line + 1,
            self.start.column + 1
        )
    }
}
