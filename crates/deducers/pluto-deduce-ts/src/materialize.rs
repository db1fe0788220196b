//! Writing each closure out as its own module.

use crate::{ClosureSource, DeduceError, Deduction};
use std::fs;
use tracing::debug;

/// Name of the module written into each closure directory.
pub const CLOSURE_MODULE: &str = "index.ts";

/// Write `<closure dir>/index.ts` for every closure of `deduction`.
pub(crate) fn materialize(deduction: &Deduction) -> Result<(), DeduceError> {
    for closure in deduction.architecture.closures() {
        let (Some(dir), Some(source)) = (closure.path.dir(), deduction.closures.get(&closure.id))
        else {
            continue;
        };
        let io = |path: &std::path::Path| {
            let path = path.to_path_buf();
            let closure = closure.id.clone();
            move |source| DeduceError::Materialize {
                closure,
                path,
                source,
            }
        };

        fs::create_dir_all(dir).map_err(io(dir))?;
        let path = dir.join(CLOSURE_MODULE);
        fs::write(&path, render(source)).map_err(io(&path))?;
        debug!(closure = %closure.id, path = %path.display(), "materialized closure");
    }
    Ok(())
}

/// Imports, then captured declarations in source order, then the function.
pub(crate) fn render(source: &ClosureSource) -> String {
    let mut out = String::new();
    for import in &source.imports {
        out.push_str(import);
        out.push('\n');
    }
    if !source.imports.is_empty() {
        out.push('\n');
    }
    for segment in &source.segments {
        out.push_str(segment);
        out.push_str("\n\n");
    }
    out.push_str("export default ");
    out.push_str(&source.code);
    out.push_str(";\n");
    out
}
