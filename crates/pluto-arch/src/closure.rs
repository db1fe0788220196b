//! Units of executable logic deployed apart from the declaring program.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const INLINE: &str = "inline";

/// Where a closure's extracted source lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClosurePath {
    /// Not materialized on disk; the code travels with its wrapper.
    Inline,
    /// Directory holding the extracted source, with an `index.ts` entry.
    Dir(PathBuf),
}

impl ClosurePath {
    pub fn is_inline(&self) -> bool {
        matches!(self, ClosurePath::Inline)
    }

    pub fn dir(&self) -> Option<&Path> {
        match self {
            ClosurePath::Inline => None,
            ClosurePath::Dir(path) => Some(path),
        }
    }
}

impl From<String> for ClosurePath {
    fn from(value: String) -> Self {
        if value == INLINE {
            ClosurePath::Inline
        } else {
            ClosurePath::Dir(PathBuf::from(value))
        }
    }
}

impl From<ClosurePath> for String {
    fn from(value: ClosurePath) -> Self {
        match value {
            ClosurePath::Inline => INLINE.to_string(),
            ClosurePath::Dir(path) => path.to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for ClosurePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosurePath::Inline => f.write_str(INLINE),
            ClosurePath::Dir(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A closure entity in the architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    #[serde(skip)]
    pub id: String,
    pub path: ClosurePath,
    /// Environment variables the closure reads at runtime.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
}

impl Closure {
    pub fn new(id: impl Into<String>, path: ClosurePath) -> Self {
        Self {
            id: id.into(),
            path,
            envs: Vec::new(),
        }
    }

    pub fn inline(id: impl Into<String>) -> Self {
        Self::new(id, ClosurePath::Inline)
    }

    pub fn with_envs(mut self, envs: Vec<String>) -> Self {
        self.envs = envs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_sentinel() {
        assert_eq!(ClosurePath::from("inline".to_string()), ClosurePath::Inline);
        assert_eq!(String::from(ClosurePath::Inline), "inline");
        assert!(Closure::inline("fn_1_1").path.is_inline());
    }

    #[test]
    fn test_dir_path() {
        let path = ClosurePath::from("/tmp/closures/handler".to_string());
        assert_eq!(path.dir(), Some(Path::new("/tmp/closures/handler")));
        assert_eq!(path.to_string(), "/tmp/closures/handler");
    }
}
