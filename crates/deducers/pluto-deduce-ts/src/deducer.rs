//! Building an architecture from a loaded program.

use crate::contracts::{Capability, Contracts, MemberKind, MemberLookup, BASE_PACKAGE};
use crate::loader::{load, Program};
use crate::materialize::materialize;
use crate::scope::{declaration, Binding, ImportTarget, Imported, Scope};
use crate::syntax::{field, location, named_children, string_value, text, unwrap_expression};
use crate::types::{DeclId, Param, TypeIndex};
use crate::{ClosureSource, DeduceError, Deduction};
use pluto_arch::{resource_id, Architecture, Argument, Location, Relationship, Resource};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tree_sitter::Node;

/// Package of the resource library shipped with the deducer.
pub const PLUTO_PACKAGE: &str = "@plutolang/pluto";

/// Import chains longer than this are not followed.
pub(crate) const MAX_IMPORT_HOPS: usize = 16;

/// TypeScript declarations a program can import by package name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub package: String,
    pub source: String,
}

impl Library {
    pub fn new(package: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeduceOptions {
    pub project: String,
    pub stack: String,
    /// Where closure modules are materialized.
    pub workdir: PathBuf,
    pub libraries: Vec<Library>,
}

impl Default for DeduceOptions {
    fn default() -> Self {
        Self {
            project: "pluto".to_string(),
            stack: "dev".to_string(),
            workdir: PathBuf::from(".pluto/closures"),
            libraries: vec![
                Library::new(BASE_PACKAGE, include_str!("../library/base.ts")),
                Library::new(PLUTO_PACKAGE, include_str!("../library/pluto.ts")),
            ],
        }
    }
}

/// Static analyzer for TypeScript programs.
#[derive(Debug, Clone, Default)]
pub struct Deducer {
    options: DeduceOptions,
}

impl Deducer {
    pub fn new(options: DeduceOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DeduceOptions {
        &self.options
    }

    /// Deduce the architecture of the program rooted at `entries`.
    ///
    /// Closure modules are written under the configured working directory.
    pub fn deduce<P: AsRef<Path>>(&self, entries: &[P]) -> Result<Deduction, DeduceError> {
        if entries.is_empty() {
            info!("no entry points, nothing to deduce");
            return Ok(Deduction::default());
        }

        let entries: Vec<PathBuf> = entries.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let program = load(&entries, &self.options.libraries)?;
        let scopes: Vec<Scope> = (0..program.files.len())
            .map(|module| Scope::build(&program, module))
            .collect();
        let types = TypeIndex::build(&program, &scopes);

        let mut analyzer = Analyzer::new(&self.options, &program, &scopes, &types);
        analyzer.collect_resources()?;
        analyzer.build()?;
        let deduction = analyzer.finish()?;

        materialize(&deduction)?;
        info!(
            resources = deduction.architecture.resources().count(),
            closures = deduction.closures.len(),
            relationships = deduction.architecture.relationships().len(),
            "deduced architecture"
        );
        Ok(deduction)
    }
}

/// A top-level variable bound to a new resource.
#[derive(Debug, Clone)]
pub(crate) struct ResourceVar<'t> {
    pub id: String,
    pub name: String,
    pub type_name: String,
    pub type_tag: String,
    pub types: Vec<DeclId>,
    pub ctor: Vec<Param<'t>>,
    pub new_expr: Node<'t>,
    pub location: Location,
}

pub(crate) struct Analyzer<'t> {
    pub options: &'t DeduceOptions,
    pub program: &'t Program,
    pub scopes: &'t [Scope<'t>],
    pub types: &'t TypeIndex<'t>,
    pub contracts: Contracts<'t, 't>,
    /// Keyed by module and variable name.
    pub resources: HashMap<(usize, String), ResourceVar<'t>>,
    pub arch: Architecture,
    pub closures: BTreeMap<String, ClosureSource>,
    /// Closure ids by the location of their function.
    pub closure_at: HashMap<Location, String>,
    pub relationships: Vec<Relationship>,
}

impl<'t> Analyzer<'t> {
    fn new(
        options: &'t DeduceOptions,
        program: &'t Program,
        scopes: &'t [Scope<'t>],
        types: &'t TypeIndex<'t>,
    ) -> Self {
        Self {
            options,
            program,
            scopes,
            types,
            contracts: Contracts::new(program, types),
            resources: HashMap::new(),
            arch: Architecture::new(),
            closures: BTreeMap::new(),
            closure_at: HashMap::new(),
            relationships: Vec::new(),
        }
    }

    /// Find every resource a top-level statement creates.
    fn collect_resources(&mut self) -> Result<(), DeduceError> {
        let program = self.program;
        let mut seen: HashMap<String, Location> = HashMap::new();
        for &module in &program.order {
            let file = &program.files[module];
            for stmt in named_children(file.root()) {
                check_supported(&file.name, stmt)?;
                for (var, new_expr) in resource_candidates(stmt, &file.source) {
                    let Some(res) = self.resource_var(module, var, new_expr) else {
                        continue;
                    };
                    let first = seen.get(&res.id).or_else(|| seen.get(&res.name));
                    if let Some(first) = first {
                        return Err(DeduceError::DuplicateResource {
                            id: res.id,
                            first: first.clone(),
                            second: res.location,
                        });
                    }
                    seen.insert(res.id.clone(), res.location.clone());
                    seen.insert(res.name.clone(), res.location.clone());
                    debug!(id = %res.id, r#type = %res.type_tag, "found resource");
                    self.resources.insert((module, var.to_string()), res);
                }
            }
        }
        Ok(())
    }

    fn resource_var(
        &self,
        module: usize,
        var: &str,
        new_expr: Node<'t>,
    ) -> Option<ResourceVar<'t>> {
        let file = &self.program.files[module];
        let constructor = field(new_expr, "constructor")?;
        let types = self.types.resolve(self.scopes, module, constructor);
        if !self.contracts.conforms(&types, Capability::Resource) {
            debug!(var, "not a resource");
            return None;
        }
        let decl = self.types.get(*types.first()?);
        let type_name = decl.name.clone();
        let type_tag = format!("{}.{}", self.program.files[decl.module].label(), type_name);
        let ctor = types
            .iter()
            .find_map(|&id| self.types.get(id).ctor.clone())
            .unwrap_or_default();

        let args = field(new_expr, "arguments")
            .map(named_children)
            .unwrap_or_default();
        let name = ctor
            .iter()
            .position(|param| param.name == "name")
            .and_then(|idx| args.get(idx))
            .and_then(|&arg| string_value(unwrap_expression(arg), &file.source))
            .unwrap_or_else(|| var.to_string());

        Some(ResourceVar {
            id: resource_id(&self.options.project, &self.options.stack, &type_tag, &name),
            name,
            type_name,
            type_tag,
            types,
            ctor,
            new_expr,
            location: location(&file.name, new_expr),
        })
    }

    /// Add resources, closures and infrastructure calls in program order.
    fn build(&mut self) -> Result<(), DeduceError> {
        let program = self.program;
        for &module in &program.order {
            let file = &program.files[module];
            for stmt in named_children(file.root()) {
                let stmt = declaration(stmt);
                match stmt.kind() {
                    "lexical_declaration" | "variable_declaration" => {
                        for declarator in named_children(stmt) {
                            let Some(name) = field(declarator, "name") else {
                                continue;
                            };
                            let name = text(name, &file.source);
                            if self.resources.contains_key(&(module, name.to_string())) {
                                self.add_resource(module, name)?;
                            } else if let Some(value) = field(declarator, "value") {
                                self.top_level_expression(module, value)?;
                            }
                        }
                    }
                    "expression_statement" => {
                        let Some(expr) = stmt.named_child(0).map(unwrap_expression) else {
                            continue;
                        };
                        if expr.kind() == "assignment_expression" {
                            let target = field(expr, "left").map(|left| text(left, &file.source));
                            match target {
                                Some(name) if self.resources.contains_key(&(module, name.to_string())) => {
                                    self.add_resource(module, name)?;
                                }
                                _ => {
                                    if let Some(right) = field(expr, "right") {
                                        self.top_level_expression(module, right)?;
                                    }
                                }
                            }
                        } else {
                            self.top_level_expression(module, expr)?;
                        }
                    }
                    kind => debug!(kind, "skipped top-level declaration"),
                }
            }
        }
        Ok(())
    }

    fn add_resource(&mut self, module: usize, var: &str) -> Result<(), DeduceError> {
        let Some(res) = self.resources.get(&(module, var.to_string())).cloned() else {
            return Ok(());
        };
        let arguments = self.arguments(module, &res.ctor, field(res.new_expr, "arguments"))?;
        let resource = Resource::new(res.id, res.name, res.type_tag, arguments)
            .with_location(res.location);
        self.arch.add_resource(resource)?;
        Ok(())
    }

    fn top_level_expression(&mut self, module: usize, expr: Node<'t>) -> Result<(), DeduceError> {
        let mut expr = unwrap_expression(expr);
        if expr.kind() == "await_expression" {
            match expr.named_child(0) {
                Some(inner) => expr = unwrap_expression(inner),
                None => return Ok(()),
            }
        }
        if expr.kind() == "call_expression" {
            self.top_level_call(module, expr)?;
        }
        Ok(())
    }

    /// `r.m(...)` outside of any closure.
    fn top_level_call(&mut self, module: usize, call: Node<'t>) -> Result<(), DeduceError> {
        let program = self.program;
        let file = &program.files[module];
        let Some(callee) = field(call, "function").map(unwrap_expression) else {
            return Ok(());
        };
        let (Some(object), Some(property)) = (field(callee, "object"), field(callee, "property"))
        else {
            debug!(call = text(call, &file.source), "call target is not a member access");
            return Ok(());
        };
        let Some(res) = self.resource_at(module, object) else {
            debug!(call = text(call, &file.source), "call target is not a resource");
            return Ok(());
        };

        let operation = text(property, &file.source);
        let at = location(&file.name, call);
        match self.lookup_member(&res, operation, &at)? {
            (MemberKind::Infra, params) => {
                let arguments = self.arguments(module, &params, field(call, "arguments"))?;
                debug!(resource = %res.id, operation, "infrastructure call");
                self.relationships
                    .push(Relationship::infrastructure(res.id, operation, arguments));
            }
            (MemberKind::Client | MemberKind::Captured, _) => {
                warn!(
                    resource = %res.id,
                    operation,
                    location = %at,
                    "client call outside of a closure is ignored"
                );
            }
            _ => debug!(resource = %res.id, operation, "ignored plain member"),
        }
        Ok(())
    }

    /// Classify `member` of a resource, with the parameters it declares.
    pub(crate) fn lookup_member(
        &self,
        res: &ResourceVar<'t>,
        member: &str,
        at: &Location,
    ) -> Result<(MemberKind, Vec<Param<'t>>), DeduceError> {
        match self.contracts.lookup_member(&res.types, member) {
            MemberLookup::Found { decl, member, kind } => {
                let params = self.types.get(decl).members[member].params.clone();
                Ok((kind, params))
            }
            MemberLookup::Ambiguous(declarations) => Err(DeduceError::AmbiguousMember {
                type_name: res.type_name.clone(),
                member: member.to_string(),
                declarations,
                location: at.clone(),
            }),
            MemberLookup::Missing => Err(DeduceError::UnknownMember {
                type_name: res.type_name.clone(),
                member: member.to_string(),
                location: at.clone(),
            }),
        }
    }

    /// Arguments of a constructor or infrastructure call at their parameter positions.
    fn arguments(
        &mut self,
        module: usize,
        params: &[Param<'t>],
        list: Option<Node<'t>>,
    ) -> Result<Vec<Argument>, DeduceError> {
        let Some(list) = list else {
            return Ok(Vec::new());
        };
        let program = self.program;
        let source = &program.files[module].source;
        let mut arguments = Vec::new();
        for (index, arg) in named_children(list).into_iter().enumerate() {
            let param = params.get(index);
            let name = param.map_or("unknown", |param| param.name.as_str());
            let value = unwrap_expression(arg);

            let argument = if param.is_some_and(|param| self.is_fn_param(param)) {
                let id = self.closure(module, value)?;
                Argument::closure(index, name, id)
            } else if let Some(res) = self.resource_at(module, value) {
                Argument::resource(index, name, res.id)
            } else if let Some((res, property)) = self.captured_property(module, value)? {
                Argument::captured_property(index, name, res.id, property)
            } else {
                Argument::text(index, name, text(arg, source))
            };
            arguments.push(argument);
        }
        Ok(arguments)
    }

    pub(crate) fn is_fn_param(&self, param: &Param<'t>) -> bool {
        param.ty.is_some_and(|ty| {
            let ids = self.types.resolve(self.scopes, param.module, ty);
            self.contracts.conforms(&ids, Capability::FnResource)
        })
    }

    /// `r.prop()` or `r.prop` where `prop` is a captured property.
    fn captured_property(
        &self,
        module: usize,
        node: Node<'t>,
    ) -> Result<Option<(ResourceVar<'t>, String)>, DeduceError> {
        let access = match node.kind() {
            "call_expression" => field(node, "function").map(unwrap_expression),
            "member_expression" => Some(node),
            _ => None,
        };
        let Some(access) = access.filter(|access| access.kind() == "member_expression") else {
            return Ok(None);
        };
        let (Some(object), Some(property)) = (field(access, "object"), field(access, "property"))
        else {
            return Ok(None);
        };
        let Some(res) = self.resource_at(module, object) else {
            return Ok(None);
        };

        let file = &self.program.files[module];
        let property = text(property, &file.source);
        match self.lookup_member(&res, property, &location(&file.name, node))? {
            (MemberKind::Captured, _) => Ok(Some((res, property.to_string()))),
            _ => Ok(None),
        }
    }

    /// The resource an identifier in `module` is bound to, following imports.
    pub(crate) fn resource_at(&self, module: usize, node: Node<'t>) -> Option<ResourceVar<'t>> {
        let node = unwrap_expression(node);
        if node.kind() != "identifier" {
            return None;
        }
        let mut module = module;
        let mut name = text(node, &self.program.files[module].source).to_string();
        for _ in 0..MAX_IMPORT_HOPS {
            if let Some(res) = self.resources.get(&(module, name.clone())) {
                return Some(res.clone());
            }
            match self.scopes[module].get(&name) {
                Some(Binding::Import {
                    target: ImportTarget::Module(target),
                    imported: Imported::Named(imported),
                    ..
                }) => {
                    module = *target;
                    name = imported.clone();
                }
                _ => return None,
            }
        }
        None
    }

    fn finish(mut self) -> Result<Deduction, DeduceError> {
        for relationship in std::mem::take(&mut self.relationships) {
            self.arch.add_relationship(relationship)?;
        }
        Ok(Deduction {
            architecture: self.arch,
            closures: self.closures,
        })
    }
}

/// Variables a top-level statement binds to `new` expressions.
fn resource_candidates<'t, 's>(stmt: Node<'t>, source: &'s str) -> Vec<(&'s str, Node<'t>)> {
    let stmt = declaration(stmt);
    let is_new = |node: Node<'t>| {
        let node = unwrap_expression(node);
        (node.kind() == "new_expression").then_some(node)
    };
    match stmt.kind() {
        "lexical_declaration" | "variable_declaration" => named_children(stmt)
            .into_iter()
            .filter_map(|declarator| {
                let name = field(declarator, "name").filter(|name| name.kind() == "identifier")?;
                let value = field(declarator, "value").and_then(is_new)?;
                Some((text(name, source), value))
            })
            .collect(),
        "expression_statement" => {
            let Some(expr) = stmt.named_child(0).map(unwrap_expression) else {
                return Vec::new();
            };
            if expr.kind() != "assignment_expression" {
                return Vec::new();
            }
            let left = field(expr, "left").filter(|left| left.kind() == "identifier");
            match (left, field(expr, "right").and_then(is_new)) {
                (Some(left), Some(value)) => vec![(text(left, source), value)],
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

fn check_supported(file: &str, stmt: Node) -> Result<(), DeduceError> {
    match stmt.kind() {
        "import_statement"
        | "export_statement"
        | "lexical_declaration"
        | "variable_declaration"
        | "function_declaration"
        | "generator_function_declaration"
        | "class_declaration"
        | "abstract_class_declaration"
        | "interface_declaration"
        | "type_alias_declaration"
        | "enum_declaration"
        | "ambient_declaration"
        | "internal_module"
        | "module"
        | "expression_statement"
        | "empty_statement"
        | "hash_bang_line" => Ok(()),
        kind => Err(DeduceError::UnsupportedStatement {
            kind: kind.to_string(),
            location: location(file, stmt),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn deduce(source: &str) -> (TempDir, Result<Deduction, DeduceError>) {
        let tmp = TempDir::new().unwrap();
        let main = tmp.path().join("main.ts");
        fs::write(&main, source).unwrap();
        let options = DeduceOptions {
            workdir: tmp.path().join("closures"),
            ..Default::default()
        };
        let result = Deducer::new(options).deduce(&[main]);
        (tmp, result)
    }

    #[test]
    fn test_empty_entries() {
        let deduction = Deducer::default().deduce::<PathBuf>(&[]).unwrap();
        assert!(deduction.architecture.is_empty());
        assert!(deduction.closures.is_empty());
    }

    #[test]
    fn test_user_name_and_fallback() {
        let (_tmp, result) = deduce(
            "import { KVStore, Queue } from \"@plutolang/pluto\";\n\
             const store = new KVStore(\"kvstore\");\n\
             const queue = new Queue();\n",
        );
        let arch = result.unwrap().architecture;
        let store = arch.resource_by_name("kvstore").unwrap();
        assert_eq!(store.id, "pluto_dev__plutolang_pluto_KVStore_kvstore");
        assert_eq!(store.type_tag, "@plutolang/pluto.KVStore");
        assert_eq!(store.arguments, vec![Argument::text(0, "name", "\"kvstore\"")]);
        assert_eq!(store.locations[0].start.line, 1);

        let queue = arch.resource_by_name("queue").unwrap();
        assert!(queue.arguments.is_empty());
    }

    #[test]
    fn test_unsupported_statement() {
        let (_tmp, result) = deduce("const a = 1;\nfor (const x of [a]) {}\n");
        match result {
            Err(DeduceError::UnsupportedStatement { kind, location }) => {
                assert_eq!(kind, "for_in_statement");
                assert_eq!(location.start.line, 1);
            }
            other => panic!("expected UnsupportedStatement, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_unknown_member() {
        let (_tmp, result) = deduce(
            "import { Queue } from \"@plutolang/pluto\";\n\
             const queue = new Queue(\"q\");\n\
             queue.publish(\"x\");\n",
        );
        assert!(matches!(
            result,
            Err(DeduceError::UnknownMember { ref member, .. }) if member == "publish"
        ));
    }

    #[test]
    fn test_client_call_at_top_level_is_ignored() {
        let (_tmp, result) = deduce(
            "import { KVStore } from \"@plutolang/pluto\";\n\
             const store = new KVStore(\"s\");\n\
             store.set(\"k\", \"v\");\n",
        );
        assert!(result.unwrap().architecture.relationships().is_empty());
    }

    #[test]
    fn test_plain_classes_are_not_resources() {
        let (_tmp, result) = deduce("class Counter {}\nconst counter = new Counter();\n");
        assert!(result.unwrap().architecture.is_empty());
    }
}
