//! Writing a closure chain out as a deployable module.

use crate::serializer::placeholder_stub;
use crate::{
    AccessKind, ComputeClosure, Dependency, ExtractError, FunctionSerializer, ENTRYPOINT_EXPORT,
    ENTRYPOINT_FILE, MANIFEST_FILE,
};
use pluto_arch::Architecture;
use serde::Serialize;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files produced by [`extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub entrypoint: PathBuf,
    pub manifest: PathBuf,
}

/// Contents of `pluto.manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub closure: String,
    pub entrypoint: String,
    #[serde(rename = "exportName")]
    pub export_name: String,
    pub dependencies: Vec<ManifestDependency>,
    pub envs: Vec<String>,
}

/// A dependency resolved against the architecture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestDependency {
    #[serde(rename = "resourceId")]
    pub resource_id: String,
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "type")]
    pub kind: AccessKind,
    pub operation: String,
}

/// Serialize `closure` into `<workdir>/__index.ts` and write its manifest.
///
/// Dependencies are detached from every closure in the chain while the
/// serializer runs and are restored before this returns, on every path.
pub fn extract(
    arch: &Architecture,
    closure: &mut ComputeClosure,
    workdir: &Path,
    serializer: &dyn FunctionSerializer,
) -> Result<Extraction, ExtractError> {
    if !workdir.is_dir() {
        return Err(ExtractError::MissingWorkdir(workdir.to_path_buf()));
    }

    let user = single_user_closure(closure)?;
    let dependencies = resolve_dependencies(arch, closure)?;

    let mut source = {
        let detached = Detached::new(closure);
        serializer.serialize(&detached, ENTRYPOINT_EXPORT)?
    };

    if let Some((placeholder, export_name, dir)) = user {
        let dirname = match dir.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => closure.id.clone(),
        };
        copy_dir(&dir, &workdir.join(&dirname))?;
        source = source.replace(
            &placeholder_stub(&placeholder),
            &import_stub(&placeholder, &export_name, &dirname),
        );
        debug!(closure = %closure.id, dir = %dir.display(), "copied user closure");
    }

    let entrypoint = workdir.join(ENTRYPOINT_FILE);
    write(&entrypoint, &source)?;

    let manifest = Manifest {
        closure: closure.id.clone(),
        entrypoint: ENTRYPOINT_FILE.to_string(),
        export_name: ENTRYPOINT_EXPORT.to_string(),
        dependencies,
        envs: collect_envs(closure),
    };
    let manifest_path = workdir.join(MANIFEST_FILE);
    let mut json = serde_json::to_string_pretty(&manifest)?;
    json.push('\n');
    write(&manifest_path, &json)?;

    info!(
        closure = %closure.id,
        entrypoint = %entrypoint.display(),
        "extracted closure"
    );
    Ok(Extraction {
        entrypoint,
        manifest: manifest_path,
    })
}

/// Takes the dependencies of every closure in a chain and puts them back on drop.
struct Detached<'a> {
    closure: &'a mut ComputeClosure,
    saved: Vec<Option<Vec<Dependency>>>,
}

impl<'a> Detached<'a> {
    fn new(closure: &'a mut ComputeClosure) -> Self {
        let mut saved = Vec::new();
        let mut cur = Some(&mut *closure);
        while let Some(link) = cur {
            saved.push(link.dependencies.take());
            cur = link.inner.as_deref_mut();
        }
        Self { closure, saved }
    }
}

impl Deref for Detached<'_> {
    type Target = ComputeClosure;

    fn deref(&self) -> &ComputeClosure {
        self.closure
    }
}

impl Drop for Detached<'_> {
    fn drop(&mut self) {
        let mut saved = std::mem::take(&mut self.saved).into_iter();
        let mut cur = Some(&mut *self.closure);
        while let Some(link) = cur {
            link.dependencies = saved.next().flatten();
            cur = link.inner.as_deref_mut();
        }
    }
}

/// Placeholder, export name and directory of the only user closure, if any.
fn single_user_closure(
    closure: &ComputeClosure,
) -> Result<Option<(String, String, PathBuf)>, ExtractError> {
    let mut users = closure.chain().filter(|link| link.is_user());
    let Some(first) = users.next() else {
        return Ok(None);
    };
    if let Some(second) = users.next() {
        return Err(ExtractError::MultipleUserClosures {
            first: first.id.clone(),
            second: second.id.clone(),
        });
    }
    let dir = first
        .dirpath
        .dir()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Ok(Some((first.placeholder.clone(), first.export_name.clone(), dir)))
}

/// Every dependency in the chain, innermost first, without repeats.
fn resolve_dependencies(
    arch: &Architecture,
    closure: &ComputeClosure,
) -> Result<Vec<ManifestDependency>, ExtractError> {
    let mut chain: Vec<&ComputeClosure> = closure.chain().collect();
    chain.reverse();

    let mut resolved: Vec<ManifestDependency> = Vec::new();
    for link in chain {
        for dep in link.dependencies.iter().flatten() {
            let resource = arch.find_resource(&dep.resource_id).ok_or_else(|| {
                ExtractError::UnresolvedDependency {
                    closure: link.id.clone(),
                    resource: dep.resource_id.clone(),
                }
            })?;
            let entry = ManifestDependency {
                resource_id: dep.resource_id.clone(),
                resource_type: resource.type_tag.clone(),
                kind: dep.kind,
                operation: dep.operation.clone(),
            };
            if !resolved.contains(&entry) {
                resolved.push(entry);
            }
        }
    }
    Ok(resolved)
}

fn collect_envs(closure: &ComputeClosure) -> Vec<String> {
    let mut chain: Vec<&ComputeClosure> = closure.chain().collect();
    chain.reverse();

    let mut envs: Vec<String> = Vec::new();
    for name in chain.into_iter().flat_map(|link| &link.envs) {
        if !envs.contains(name) {
            envs.push(name.clone());
        }
    }
    envs
}

/// Binds a placeholder to the export of a copied closure directory.
///
/// The import is deferred to the first call so the module can read the
/// environment set up by the platform adapter.
fn import_stub(placeholder: &str, export_name: &str, dirname: &str) -> String {
    format!(
        "const {placeholder} = async (...args: any[]) => {{ \
         const mod = await import(\"./{dirname}\"); \
         return await mod.{export_name}(...args); }};"
    )
}

fn write(path: &Path, contents: &str) -> Result<(), ExtractError> {
    fs::write(path, contents).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), ExtractError> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ExtractError::Io { path, source }
    };

    fs::create_dir_all(to).map_err(io(to))?;
    for entry in fs::read_dir(from).map_err(io(from))? {
        let entry = entry.map_err(io(from))?;
        let target = to.join(entry.file_name());
        if entry.file_type().map_err(io(&entry.path()))?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(io(&target))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClosureCode, ModuleSerializer};

    #[test]
    fn test_detach_restores() {
        let inner = ComputeClosure::from_dir("user", "/tmp/user")
            .with_dependencies(vec![Dependency::method("kv", "get")]);
        let mut closure =
            ComputeClosure::wrap(ClosureCode::new("() => 1"), inner, Default::default());
        let before = closure.clone();

        {
            let detached = Detached::new(&mut closure);
            assert!(detached.chain().all(|link| link.dependencies.is_none()));
        }
        assert_eq!(closure, before);
    }

    #[test]
    fn test_missing_workdir() {
        let mut closure = ComputeClosure::inline("f", ClosureCode::new("() => 1"));
        let err = extract(
            &Architecture::new(),
            &mut closure,
            Path::new("/definitely/not/here"),
            &ModuleSerializer,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::MissingWorkdir(_)));
    }

    #[test]
    fn test_import_stub() {
        assert_eq!(
            import_stub("__p", "default", "fn_1_1"),
            "const __p = async (...args: any[]) => { const mod = await import(\"./fn_1_1\"); return await mod.default(...args); };"
        );
    }
}
