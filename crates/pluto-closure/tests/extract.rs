use pluto_arch::{Architecture, Resource};
use pluto_closure::{
    extract, Capture, ClosureCode, ComputeClosure, Dependency, ExtractError, FunctionSerializer,
    ModuleSerializer, WrapOptions, ENTRYPOINT_FILE, MANIFEST_FILE,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn arch() -> Architecture {
    let mut arch = Architecture::new();
    arch.add_resource(Resource::new(
        "hello_dev_KVStore_kvstore",
        "kvstore",
        "@plutolang/pluto.KVStore",
        vec![],
    ))
    .unwrap();
    arch
}

/// A materialized user closure plus a queue adapter around it.
fn wrapped_user_closure(root: &Path) -> ComputeClosure {
    let dir = root.join("closures").join("fn_5_17");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("index.ts"),
        "export default async (evt: string) => { console.log(evt); };\n",
    )
    .unwrap();

    let user = ComputeClosure::from_dir("fn_5_17", &dir)
        .with_dependencies(vec![Dependency::method("hello_dev_KVStore_kvstore", "set")])
        .with_envs(vec!["TOKEN".to_string()]);
    let adapter = ClosureCode::new(format!(
        "async (event: any) => {{ await {}(event.data); }}",
        user.placeholder
    ));
    ComputeClosure::wrap(adapter, user, WrapOptions::default())
}

#[test]
fn test_user_closure_is_wired_in() {
    let tmp = TempDir::new().unwrap();
    let workdir = tmp.path().join("out");
    fs::create_dir(&workdir).unwrap();
    let mut closure = wrapped_user_closure(tmp.path());

    let extraction = extract(&arch(), &mut closure, &workdir, &ModuleSerializer).unwrap();
    assert_eq!(extraction.entrypoint, workdir.join(ENTRYPOINT_FILE));

    let module = fs::read_to_string(&extraction.entrypoint).unwrap();
    assert!(module.contains(
        "const __pluto_closure_fn_5_17 = async (...args: any[]) => { const mod = await import(\"./fn_5_17\");"
    ));
    assert!(!module.contains("= undefined;"));
    assert!(module.ends_with(
        "export const handler = async (event: any) => { await __pluto_closure_fn_5_17(event.data); };\n"
    ));
    assert!(workdir.join("fn_5_17").join("index.ts").is_file());

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(workdir.join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(manifest["exportName"], "handler");
    assert_eq!(manifest["dependencies"][0]["resourceId"], "hello_dev_KVStore_kvstore");
    assert_eq!(manifest["dependencies"][0]["resourceType"], "@plutolang/pluto.KVStore");
    assert_eq!(manifest["dependencies"][0]["type"], "method");
    assert_eq!(manifest["envs"][0], "TOKEN");
}

/// The entry module, manifest and copied closure written by one extraction.
fn outputs(workdir: &Path) -> Vec<Vec<u8>> {
    [
        workdir.join(ENTRYPOINT_FILE),
        workdir.join(MANIFEST_FILE),
        workdir.join("fn_5_17").join("index.ts"),
    ]
    .iter()
    .map(|path| fs::read(path).unwrap())
    .collect()
}

#[test]
fn test_extraction_is_idempotent() {
    let sources = TempDir::new().unwrap();
    let mut closure = wrapped_user_closure(sources.path());
    let original = closure.clone();

    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    extract(&arch(), &mut closure, first.path(), &ModuleSerializer).unwrap();
    extract(&arch(), &mut closure, second.path(), &ModuleSerializer).unwrap();
    assert_eq!(outputs(first.path()), outputs(second.path()));

    // Leftovers of a previous run change nothing.
    extract(&arch(), &mut closure, first.path(), &ModuleSerializer).unwrap();
    assert_eq!(outputs(first.path()), outputs(second.path()));

    // Dependencies are back in place after each run.
    assert_eq!(closure, original);
}

/// Fails after observing the detached state.
struct FailingSerializer;

impl FunctionSerializer for FailingSerializer {
    fn serialize(&self, closure: &ComputeClosure, _: &str) -> Result<String, ExtractError> {
        assert!(closure.chain().all(|link| link.dependencies.is_none()));
        Err(ExtractError::Serialize {
            closure: closure.id.clone(),
            reason: "boom".to_string(),
        })
    }
}

#[test]
fn test_dependencies_restored_on_error() {
    let tmp = TempDir::new().unwrap();
    let mut closure = wrapped_user_closure(tmp.path());
    let original = closure.clone();

    let err = extract(&arch(), &mut closure, tmp.path(), &FailingSerializer).unwrap_err();
    assert!(matches!(err, ExtractError::Serialize { ref reason, .. } if reason == "boom"));
    assert_eq!(closure, original);
    assert!(!tmp.path().join(ENTRYPOINT_FILE).exists());
}

#[test]
fn test_multiple_user_closures() {
    let tmp = TempDir::new().unwrap();
    let mut first = ComputeClosure::from_dir("a", tmp.path().join("a"));
    first.inner = Some(Box::new(ComputeClosure::from_dir("b", tmp.path().join("b"))));
    let mut closure = ComputeClosure::wrap(ClosureCode::new("a"), first, WrapOptions::default());

    match extract(&arch(), &mut closure, tmp.path(), &ModuleSerializer) {
        Err(ExtractError::MultipleUserClosures { first, second }) => {
            assert_eq!(first, "a");
            assert_eq!(second, "b");
        }
        other => panic!("expected MultipleUserClosures, got {:?}", other),
    }
}

#[test]
fn test_unresolved_dependency() {
    let tmp = TempDir::new().unwrap();
    let mut closure = ComputeClosure::inline("f", ClosureCode::new("async () => {}"))
        .with_dependencies(vec![Dependency::method("missing", "get")]);

    let err = extract(&arch(), &mut closure, tmp.path(), &ModuleSerializer).unwrap_err();
    assert!(matches!(
        err,
        ExtractError::UnresolvedDependency { ref resource, .. } if resource == "missing"
    ));
}

#[test]
fn test_opaque_capture_fails() {
    let tmp = TempDir::new().unwrap();
    let mut closure = ComputeClosure::inline(
        "f",
        ClosureCode::new("async () => client.query()").with_capture(Capture::Opaque {
            name: "client".to_string(),
            reason: "'client' is bound to a non-literal value".to_string(),
        }),
    );

    let err = extract(&arch(), &mut closure, tmp.path(), &ModuleSerializer).unwrap_err();
    assert_eq!(
        err.to_string(),
        "closure 'f' cannot be serialized: 'client' is bound to a non-literal value"
    );
}

#[test]
fn test_inline_only_chain() {
    let tmp = TempDir::new().unwrap();
    let mut closure = ComputeClosure::inline("f", ClosureCode::new("async () => 42"));

    let extraction = extract(&arch(), &mut closure, tmp.path(), &ModuleSerializer).unwrap();
    assert_eq!(
        fs::read_to_string(extraction.entrypoint).unwrap(),
        "export const handler = async () => 42;\n"
    );
}
