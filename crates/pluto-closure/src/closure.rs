//! The compute-closure model.

use pluto_arch::ClosurePath;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a closure uses a resource at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    /// `resource.method(...)`, declared by a client API.
    Method,
    /// `resource.property()`, declared by the captured properties.
    Property,
}

/// A runtime use of a resource.
///
/// Dependencies stand for live resource handles: they are resolved against the
/// architecture and never written into serialized code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(rename = "resourceId")]
    pub resource_id: String,
    #[serde(rename = "type")]
    pub kind: AccessKind,
    pub operation: String,
}

impl Dependency {
    pub fn method(resource_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind: AccessKind::Method,
            operation: operation.into(),
        }
    }

    pub fn property(resource_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind: AccessKind::Property,
            operation: operation.into(),
        }
    }
}

/// Something the closure's code refers to outside its own body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// An import statement, emitted verbatim.
    Import(String),
    /// A serializable top-level declaration, emitted verbatim.
    Value(String),
    /// A binding that cannot be reproduced outside the program.
    Opaque { name: String, reason: String },
}

/// Source text of a closure plus its captured environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureCode {
    /// A TypeScript function expression, or the name of a placeholder.
    pub source: String,
    pub captures: Vec<Capture>,
}

impl ClosureCode {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            captures: Vec::new(),
        }
    }

    pub fn with_capture(mut self, capture: Capture) -> Self {
        self.captures.push(capture);
        self
    }
}

/// A unit of code deployed on its own.
///
/// Library adapters wrap user closures; the chain is an owned list through
/// [`ComputeClosure::inner`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeClosure {
    pub id: String,
    /// `Inline` for library code, the materialized directory for user code.
    pub dirpath: ClosurePath,
    /// What the module at `dirpath` exports the function as.
    pub export_name: String,
    /// Identifier the wrapping closure uses to call this one.
    pub placeholder: String,
    /// `None` only while detached for serialization.
    pub dependencies: Option<Vec<Dependency>>,
    pub envs: Vec<String>,
    pub code: ClosureCode,
    pub inner: Option<Box<ComputeClosure>>,
}

/// Overrides for [`ComputeClosure::wrap`].
#[derive(Debug, Clone, Default)]
pub struct WrapOptions {
    pub id: Option<String>,
    pub export_name: Option<String>,
    pub placeholder: Option<String>,
    /// Resources the wrapper itself uses.
    pub dependencies: Vec<Dependency>,
    /// Env vars the wrapper itself reads.
    pub envs: Vec<String>,
}

impl ComputeClosure {
    /// An inline closure with the given code.
    pub fn inline(id: impl Into<String>, code: ClosureCode) -> Self {
        let id = id.into();
        Self {
            placeholder: placeholder_for(&id),
            id,
            dirpath: ClosurePath::Inline,
            export_name: "default".to_string(),
            dependencies: Some(Vec::new()),
            envs: Vec::new(),
            code,
            inner: None,
        }
    }

    /// A user closure materialized in `dir`, exported as `default`.
    ///
    /// Its code is its placeholder: the extractor binds the placeholder to an
    /// import of the copied directory.
    pub fn from_dir(id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let id = id.into();
        let placeholder = placeholder_for(&id);
        Self {
            code: ClosureCode::new(placeholder.clone()),
            placeholder,
            id,
            dirpath: ClosurePath::Dir(dir.into()),
            export_name: "default".to_string(),
            dependencies: Some(Vec::new()),
            envs: Vec::new(),
            inner: None,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    pub fn with_envs(mut self, envs: Vec<String>) -> Self {
        self.envs = envs;
        self
    }

    /// Wrap `inner` in library code that calls it through `inner.placeholder`.
    ///
    /// The result carries the inner dependencies and env vars followed by the
    /// wrapper's own.
    pub fn wrap(wrapper: ClosureCode, inner: ComputeClosure, options: WrapOptions) -> Self {
        let id = options
            .id
            .unwrap_or_else(|| format!("{}_wrapper", inner.id));

        let mut dependencies = inner.dependencies.clone().unwrap_or_default();
        dependencies.extend(options.dependencies);
        let mut envs = inner.envs.clone();
        envs.extend(options.envs);

        Self {
            placeholder: options
                .placeholder
                .unwrap_or_else(|| placeholder_for(&id)),
            id,
            dirpath: ClosurePath::Inline,
            export_name: options.export_name.unwrap_or_else(|| "default".to_string()),
            dependencies: Some(dependencies),
            envs,
            code: wrapper,
            inner: Some(Box::new(inner)),
        }
    }

    pub fn is_user(&self) -> bool {
        !self.dirpath.is_inline()
    }

    /// This closure followed by every closure it wraps, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ComputeClosure> {
        std::iter::successors(Some(self), |closure| closure.inner.as_deref())
    }

    /// Number of closures in the chain.
    pub fn depth(&self) -> usize {
        self.chain().count()
    }
}

fn placeholder_for(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("__pluto_closure_{}", sanitized)
}
