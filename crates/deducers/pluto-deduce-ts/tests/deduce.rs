use codespan_reporting::term::termcolor::NoColor;
use pluto_arch::{Argument, EntityRef, Relationship, RelationshipKind};
use pluto_closure::{AccessKind, Capture, Dependency};
use pluto_deduce_ts::{DeduceError, DeduceOptions, Deducer, Deduction, CLOSURE_MODULE};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn file(&self, name: &str, source: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, source).unwrap();
        path
    }

    fn workdir(&self) -> PathBuf {
        self.dir.path().join("closures")
    }

    fn deduce(&self, entry: &Path) -> Result<Deduction, DeduceError> {
        self.deduce_all(&[entry])
    }

    fn deduce_all(&self, entries: &[&Path]) -> Result<Deduction, DeduceError> {
        let options = DeduceOptions {
            project: "hello".to_string(),
            workdir: self.workdir(),
            ..Default::default()
        };
        Deducer::new(options).deduce(entries)
    }
}

const STORE_AND_QUEUE: &str = r#"import { KVStore, Queue, CloudEvent } from "@plutolang/pluto";

const store = new KVStore("kvstore");
const queue = new Queue("queue");

queue.subscribe(async (evt: CloudEvent) => {
  await store.set("latest", evt.data);
});
"#;

#[test]
fn test_store_queue_subscribe() {
    let project = Project::new();
    let main = project.file("main.ts", STORE_AND_QUEUE);
    let deduction = project.deduce(&main).unwrap();
    let arch = &deduction.architecture;

    let store = arch.resource_by_name("kvstore").unwrap();
    let queue = arch.resource_by_name("queue").unwrap();
    assert_eq!(store.id, "hello_dev__plutolang_pluto_KVStore_kvstore");
    assert_eq!(queue.type_tag, "@plutolang/pluto.Queue");

    let closures: Vec<&str> = arch.closures().map(|closure| closure.id.as_str()).collect();
    assert_eq!(closures, vec!["fn_6_17"]);

    assert_eq!(
        arch.relationships(),
        &[
            Relationship::client("fn_6_17", &store.id, "set"),
            Relationship::infrastructure(
                &queue.id,
                "subscribe",
                vec![Argument::closure(0, "fn", "fn_6_17")]
            ),
        ]
    );
    assert_eq!(arch.relationships()[1].to, vec![EntityRef::closure("fn_6_17")]);

    let source = &deduction.closures["fn_6_17"];
    assert_eq!(
        source.dependencies,
        vec![Dependency {
            resource_id: store.id.clone(),
            kind: AccessKind::Method,
            operation: "set".to_string(),
        }]
    );
    assert_eq!(
        source.imports,
        vec!["import { KVStore, Queue, CloudEvent } from \"@plutolang/pluto\";"]
    );
    assert_eq!(source.segments, vec!["const store = new KVStore(\"kvstore\");"]);
    assert!(source.opaque.is_empty());
}

#[test]
fn test_closure_is_materialized() {
    let project = Project::new();
    let main = project.file("main.ts", STORE_AND_QUEUE);
    let deduction = project.deduce(&main).unwrap();

    let closure = deduction.architecture.find_closure("fn_6_17").unwrap();
    let dir = project.workdir().join("fn_6_17");
    assert_eq!(closure.path.dir(), Some(dir.as_path()));

    let module = fs::read_to_string(dir.join(CLOSURE_MODULE)).unwrap();
    assert_eq!(
        module,
        "import { KVStore, Queue, CloudEvent } from \"@plutolang/pluto\";\n\
         \n\
         const store = new KVStore(\"kvstore\");\n\
         \n\
         export default async (evt: CloudEvent) => {\n  await store.set(\"latest\", evt.data);\n};\n"
    );

    let compute = deduction.compute_closure("fn_6_17").unwrap();
    assert!(compute.is_user());
    assert_eq!(compute.dependencies.as_ref().unwrap().len(), 1);
}

#[test]
fn test_duplicate_resource_name() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import { KVStore } from "@plutolang/pluto";
const a = new KVStore("shared");
const b = new KVStore("shared");
"#,
    );
    match project.deduce(&main) {
        Err(DeduceError::DuplicateResource { id, first, second }) => {
            assert_eq!(id, "hello_dev__plutolang_pluto_KVStore_shared");
            assert_eq!(first.start.line, 1);
            assert_eq!(second.start.line, 2);
            assert!(first.file.ends_with("main.ts"));
        }
        other => panic!("expected DuplicateResource, got {:?}", other.err()),
    }
}

#[test]
fn test_namespace_import_and_captured_property() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import * as pluto from "@plutolang/pluto";

const router = new pluto.Router("api");

async function hello(req: pluto.HttpRequest): Promise<pluto.HttpResponse> {
  return { statusCode: 200, body: `served from ${router.url()}` };
}

router.get("/hello", hello);
"#,
    );
    let deduction = project.deduce(&main).unwrap();
    let arch = &deduction.architecture;

    let router = arch.resource_by_name("api").unwrap();
    assert_eq!(router.type_tag, "@plutolang/pluto.Router");
    assert_eq!(
        arch.relationships(),
        &[
            Relationship::captured_property("hello", &router.id, "url"),
            Relationship::infrastructure(
                &router.id,
                "get",
                vec![
                    Argument::text(0, "path", "\"/hello\""),
                    Argument::closure(1, "fn", "hello"),
                ]
            ),
        ]
    );

    let source = &deduction.closures["hello"];
    assert_eq!(source.dependencies, vec![Dependency::property(&router.id, "url")]);
    assert_eq!(source.imports, vec!["import * as pluto from \"@plutolang/pluto\";"]);
    assert!(source.code.starts_with("async function hello("));
}

#[test]
fn test_function_resource_takes_a_closure() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import { Function } from "@plutolang/pluto";

const echo = async (msg: string) => msg;
const fn = new Function(echo, "echo-fn");
"#,
    );
    let arch = project.deduce(&main).unwrap().architecture;
    let resource = arch.resource_by_name("echo-fn").unwrap();
    assert_eq!(
        resource.arguments,
        vec![
            Argument::closure(0, "func", "echo"),
            Argument::text(1, "name", "\"echo-fn\""),
        ]
    );
    assert!(arch.find_closure("echo").is_some());
}

#[test]
fn test_same_function_is_one_closure() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import { Queue } from "@plutolang/pluto";

const a = new Queue("a");
const b = new Queue("b");

async function handler(): Promise<void> {}

a.subscribe(handler);
b.subscribe(handler);
"#,
    );
    let arch = project.deduce(&main).unwrap().architecture;
    assert_eq!(arch.closures().count(), 1);
    assert_eq!(arch.relationships().len(), 2);
    assert!(arch
        .relationships()
        .iter()
        .all(|relat| relat.kind == RelationshipKind::Create));
}

#[test]
fn test_duplicate_closure_id() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import { Queue } from "@plutolang/pluto";

const a = new Queue("a");
const b = new Queue("b");

a.subscribe(async function handler() {});
b.subscribe(async function handler() {});
"#,
    );
    match project.deduce(&main) {
        Err(DeduceError::DuplicateClosure { id, location }) => {
            assert_eq!(id, "handler");
            assert_eq!(location.start.line, 6);
        }
        other => panic!("expected DuplicateClosure, got {:?}", other.err()),
    }
}

#[test]
fn test_unresolved_handler() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import { Queue } from "@plutolang/pluto";
const queue = new Queue("q");
queue.subscribe(missing);
"#,
    );
    assert!(matches!(
        project.deduce(&main),
        Err(DeduceError::UnresolvedSymbol { ref name, .. }) if name == "missing"
    ));
}

#[test]
fn test_helpers_envs_and_opaque_values() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import { KVStore, Schedule } from "@plutolang/pluto";

const PREFIX = "tick";
const started = Date.now();
const store = new KVStore("ticks");
const schedule = new Schedule("every-minute");

function record(value: string) {
  return store.set(PREFIX, value);
}

schedule.cron("* * * * *", async () => {
  const region = process.env["REGION"];
  await record(`${process.env.TOKEN}:${region}:${started}`);
});
"#,
    );
    let deduction = project.deduce(&main).unwrap();
    let (id, source) = deduction.closures.iter().next().unwrap();

    assert_eq!(source.envs, vec!["REGION", "TOKEN"]);
    assert_eq!(
        deduction.architecture.find_closure(id).unwrap().envs,
        vec!["REGION", "TOKEN"]
    );

    assert_eq!(
        source.segments,
        vec![
            "const PREFIX = \"tick\";",
            "const store = new KVStore(\"ticks\");",
            "function record(value: string) {\n  return store.set(PREFIX, value);\n}",
        ]
    );
    assert_eq!(source.dependencies, vec![Dependency::method(
        &deduction.architecture.resource_by_name("ticks").unwrap().id,
        "set"
    )]);
    assert_eq!(
        source.opaque,
        vec![Capture::Opaque {
            name: "started".to_string(),
            reason: "'started' is bound to a value computed at runtime".to_string(),
        }]
    );

    let compute = deduction.compute_closure(id).unwrap();
    assert_eq!(compute.code.captures, source.opaque);
}

#[test]
fn test_multi_file_closure() {
    let project = Project::new();
    project.file(
        "format.ts",
        "export function shout(msg: string) { return msg.toUpperCase(); }\n",
    );
    let main = project.file(
        "main.ts",
        r#"import { Queue } from "@plutolang/pluto";
import { shout } from "./format";

const queue = new Queue("q");
queue.subscribe(async (evt) => {
  console.log(shout(evt.data));
});
"#,
    );
    match project.deduce(&main) {
        Err(DeduceError::MultiFileClosure { name, .. }) => assert_eq!(name, "shout"),
        other => panic!("expected MultiFileClosure, got {:?}", other.err()),
    }
}

#[test]
fn test_resources_across_modules() {
    let project = Project::new();
    project.file(
        "resources.ts",
        r#"import { Queue } from "@plutolang/pluto";
export const queue = new Queue("jobs");
"#,
    );
    let main = project.file(
        "main.ts",
        r#"import { queue } from "./resources";

queue.subscribe(async () => {});
"#,
    );
    let arch = project.deduce(&main).unwrap().architecture;
    let queue = arch.resource_by_name("jobs").unwrap();
    assert_eq!(arch.relationships().len(), 1);
    assert_eq!(arch.relationships()[0].from, EntityRef::resource(&queue.id));
}

#[test]
fn test_ambiguous_member() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import { IResource, IResourceClientApi, IResourceInfraApi } from "@plutolang/base";

interface Reads extends IResourceClientApi { sync(): void; }
interface Wires extends IResourceInfraApi { sync(): void; }
class Mirror implements IResource {}
interface Mirror extends Reads, Wires {}

const mirror = new Mirror();
mirror.sync();
"#,
    );
    match project.deduce(&main) {
        Err(DeduceError::AmbiguousMember {
            type_name,
            member,
            declarations,
            location,
        }) => {
            assert_eq!(type_name, "Mirror");
            assert_eq!(member, "sync");
            assert_eq!(declarations, vec!["Reads", "Wires"]);
            assert_eq!(location.start.line, 8);
        }
        other => panic!("expected AmbiguousMember, got {:?}", other.err()),
    }
}

#[test]
fn test_diagnostic_rendering() {
    let project = Project::new();
    let main = project.file("main.ts", "const a = 1;\nwhile (a) {}\n");
    let err = project.deduce(&main).unwrap_err();

    let mut out = NoColor::new(Vec::new());
    err.emit(&mut out).unwrap();
    let rendered = String::from_utf8(out.into_inner()).unwrap();
    assert!(rendered.contains("error: 'while_statement' is not supported in the global area"));
    assert!(rendered.contains("while (a) {}"));
    assert!(rendered.contains("main.ts:2:1"));
}

fn relationships_from<'a>(deduction: &'a Deduction, closure: &str) -> Vec<&'a Relationship> {
    let from = EntityRef::closure(closure);
    deduction
        .architecture
        .relationships()
        .iter()
        .filter(|relat| relat.from == from)
        .collect()
}

#[test]
fn test_handler_of_captured_resource_is_not_inlined() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import { Function, KVStore, Router } from "@plutolang/pluto";

const store = new KVStore("s");
const router = new Router("api");

async function worker(key: string) {
  await store.set(key, "done");
}
const fn = new Function(worker, "worker-fn");

router.get("/run", async (req) => {
  return fn.invoke(req.query);
});
"#,
    );
    let deduction = project.deduce(&main).unwrap();
    let arch = &deduction.architecture;
    let store = arch.resource_by_name("s").unwrap();
    let function = arch.resource_by_name("worker-fn").unwrap();

    let route = deduction
        .closures
        .keys()
        .find(|id| id.as_str() != "worker")
        .unwrap()
        .clone();
    assert_eq!(
        relationships_from(&deduction, &route),
        vec![&Relationship::client(&route, &function.id, "invoke")]
    );
    let source = &deduction.closures[&route];
    assert_eq!(source.dependencies, vec![Dependency::method(&function.id, "invoke")]);
    assert!(source
        .segments
        .iter()
        .all(|segment| !segment.contains("function worker")));

    assert_eq!(
        relationships_from(&deduction, "worker"),
        vec![&Relationship::client("worker", &store.id, "set")]
    );
}

#[test]
fn test_block_local_does_not_hide_resource() {
    let project = Project::new();
    let main = project.file(
        "main.ts",
        r#"import { KVStore, Queue } from "@plutolang/pluto";

const store = new KVStore("s");
const queue = new Queue("q");
queue.subscribe(async (evt) => {
  await store.set("k", evt.data);
  for (const x of [1]) {
    const store = x;
  }
});
"#,
    );
    let deduction = project.deduce(&main).unwrap();
    let store = deduction.architecture.resource_by_name("s").unwrap();

    let source = &deduction.closures["fn_5_17"];
    assert_eq!(source.dependencies, vec![Dependency::method(&store.id, "set")]);
    assert_eq!(source.segments, vec!["const store = new KVStore(\"s\");"]);
    assert_eq!(
        relationships_from(&deduction, "fn_5_17"),
        vec![&Relationship::client("fn_5_17", &store.id, "set")]
    );
}

#[test]
fn test_entry_order_does_not_matter() {
    let project = Project::new();
    let jobs = project.file(
        "jobs.ts",
        r#"import { KVStore, Queue } from "@plutolang/pluto";

const results = new KVStore("results");
const jobs = new Queue("jobs");
jobs.subscribe(async (evt) => {
  await results.set("last", evt.data);
});
"#,
    );
    let ticks = project.file(
        "ticks.ts",
        r#"import { Queue, Schedule } from "@plutolang/pluto";

const tick = new Schedule("tick");
const runs = new Queue("runs");
tick.cron("* * * * *", async () => {
  await runs.push("run");
});
"#,
    );

    let forward = project.deduce_all(&[&jobs, &ticks]).unwrap();
    let backward = project.deduce_all(&[&ticks, &jobs]).unwrap();

    let ids = |deduction: &Deduction| -> Vec<String> {
        deduction
            .architecture
            .resources()
            .map(|res| res.id.clone())
            .collect()
    };
    assert_eq!(ids(&forward).len(), 4);
    assert_eq!(ids(&forward), ids(&backward));
    assert_eq!(forward.architecture.relationships().len(), 4);
    assert_eq!(
        forward.architecture.relationships(),
        backward.architecture.relationships()
    );
    assert_eq!(forward.closures, backward.closures);
}
