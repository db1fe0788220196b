//! Deduction errors and their rendering.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term::{self, WriteStyle};
use pluto_arch::{ArchError, Location};
use std::io;
use std::ops::Range;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeduceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{location}: syntax error: {message}")]
    Parse { location: Location, message: String },

    #[error("{location}: cannot resolve '{name}' to a function")]
    UnresolvedSymbol { name: String, location: Location },

    #[error("{location}: cannot resolve import '{specifier}'")]
    UnresolvedImport { specifier: String, location: Location },

    #[error("{location}: '{member}' of '{type_name}' is declared by more than one capability interface: {}", declarations.join(", "))]
    AmbiguousMember {
        type_name: String,
        member: String,
        declarations: Vec<String>,
        location: Location,
    },

    #[error("{second}: resource id '{id}' is already used by the resource declared at {first}")]
    DuplicateResource {
        id: String,
        first: Location,
        second: Location,
    },

    #[error("{location}: closure id '{id}' is already used by another function")]
    DuplicateClosure { id: String, location: Location },

    #[error("{location}: closure '{closure}' captures '{name}', which is declared in another file; only single-file closures are supported")]
    MultiFileClosure {
        closure: String,
        name: String,
        location: Location,
    },

    #[error("{location}: '{kind}' is not supported in the global area")]
    UnsupportedStatement { kind: String, location: Location },

    #[error("{location}: '{type_name}' has no member '{member}'")]
    UnknownMember {
        type_name: String,
        member: String,
        location: Location,
    },

    #[error(transparent)]
    Arch(#[from] ArchError),

    #[error("failed to write closure '{closure}' to {path}: {source}")]
    Materialize {
        closure: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeduceError {
    /// Where in the sources the error points, if anywhere.
    pub fn location(&self) -> Option<&Location> {
        match self {
            DeduceError::Parse { location, .. }
            | DeduceError::UnresolvedSymbol { location, .. }
            | DeduceError::UnresolvedImport { location, .. }
            | DeduceError::AmbiguousMember { location, .. }
            | DeduceError::DuplicateClosure { location, .. }
            | DeduceError::MultiFileClosure { location, .. }
            | DeduceError::UnsupportedStatement { location, .. }
            | DeduceError::UnknownMember { location, .. } => Some(location),
            DeduceError::DuplicateResource { second, .. } => Some(second),
            DeduceError::Io { .. } | DeduceError::Arch(_) | DeduceError::Materialize { .. } => {
                None
            }
        }
    }

    /// Render the error, with a source snippet when the file can still be read.
    pub fn emit(&self, writer: &mut impl WriteStyle) -> Result<(), codespan_reporting::files::Error> {
        let config = term::Config::default();
        let mut diagnostic = Diagnostic::error().with_message(self.headline());

        let file = self.location().and_then(|location| {
            let source = std::fs::read_to_string(&location.file).ok()?;
            let span = span_of(&source, location);
            Some((SimpleFile::new(location.file.clone(), source), span))
        });

        if let DeduceError::DuplicateResource { first, .. } = self {
            diagnostic = diagnostic.with_notes(vec![format!("first declared at {}", first)]);
        }

        match file {
            Some((file, span)) => {
                diagnostic = diagnostic.with_labels(vec![Label::primary((), span)]);
                term::emit_to_write_style(writer, &config, &file, &diagnostic)
            }
            None => {
                let file = SimpleFile::new(String::new(), String::new());
                term::emit_to_write_style(writer, &config, &file, &diagnostic)
            }
        }
    }

    /// The message without the leading location.
    fn headline(&self) -> String {
        let message = self.to_string();
        match self.location() {
            Some(location) => message
                .strip_prefix(&format!("{}: ", location))
                .map(str::to_string)
                .unwrap_or(message),
            None => message,
        }
    }
}

/// Byte range of a location, clamped to the source.
fn span_of(source: &str, location: &Location) -> Range<usize> {
    let offset = |line: usize, column: usize| {
        let line_start: usize = source
            .split_inclusive('\n')
            .take(line)
            .map(str::len)
            .sum();
        (line_start + column).min(source.len())
    };
    let start = offset(location.start.line, location.start.column);
    let end = offset(location.end.line, location.end.column).max(start);
    start..end
}
