//! Turning a closure chain into module source.

use crate::{Capture, ComputeClosure, ExtractError};

/// Renders a detached closure chain as the source of one module.
pub trait FunctionSerializer {
    /// `closure` must have its dependencies detached; the module exports the
    /// outermost function as `export_name`.
    fn serialize(&self, closure: &ComputeClosure, export_name: &str) -> Result<String, ExtractError>;
}

/// Emits a TypeScript module:
///
/// ```text
/// <captured imports>
/// <captured values>
/// <one binding per inner closure, innermost first>
/// export const <export_name> = <outermost code>;
/// ```
///
/// An inline inner closure is bound to its placeholder directly. A user
/// closure gets a stub (see [`placeholder_stub`]) that the extractor rewrites
/// into an import of the copied directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleSerializer;

impl FunctionSerializer for ModuleSerializer {
    fn serialize(&self, closure: &ComputeClosure, export_name: &str) -> Result<String, ExtractError> {
        let mut chain: Vec<&ComputeClosure> = closure.chain().collect();
        chain.reverse();

        let mut imports: Vec<&str> = Vec::new();
        let mut values: Vec<&str> = Vec::new();
        for link in &chain {
            if link.dependencies.is_some() {
                return Err(ExtractError::Serialize {
                    closure: link.id.clone(),
                    reason: "resource dependencies are still attached".to_string(),
                });
            }
            for capture in &link.code.captures {
                match capture {
                    Capture::Import(stmt) => push_unique(&mut imports, stmt),
                    Capture::Value(stmt) => push_unique(&mut values, stmt),
                    Capture::Opaque { reason, .. } => {
                        return Err(ExtractError::Serialize {
                            closure: link.id.clone(),
                            reason: reason.clone(),
                        })
                    }
                }
            }
        }

        let mut out = String::new();
        for stmt in &imports {
            out.push_str(stmt);
            out.push('\n');
        }
        if !imports.is_empty() {
            out.push('\n');
        }
        for stmt in &values {
            out.push_str(stmt);
            out.push_str("\n\n");
        }

        let Some((outermost, inner)) = chain.split_last() else {
            return Ok(out);
        };
        for link in inner {
            if link.is_user() {
                out.push_str(&placeholder_stub(&link.placeholder));
            } else {
                out.push_str(&format!("const {} = {};", link.placeholder, link.code.source));
            }
            out.push('\n');
        }
        if outermost.is_user() {
            out.push_str(&placeholder_stub(&outermost.placeholder));
            out.push('\n');
        }
        out.push_str(&format!(
            "export const {} = {};\n",
            export_name, outermost.code.source
        ));
        Ok(out)
    }
}

/// The binding emitted for a user closure before its directory is wired in.
pub(crate) fn placeholder_stub(placeholder: &str) -> String {
    format!("let {} = undefined;", placeholder)
}

fn push_unique<'a>(list: &mut Vec<&'a str>, item: &'a str) {
    if !list.contains(&item) {
        list.push(item);
    }
}
