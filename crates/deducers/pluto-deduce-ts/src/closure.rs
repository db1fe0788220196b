//! Closures: function literals handed to resources, and what their bodies use.

use crate::contracts::MemberKind;
use crate::deducer::{Analyzer, ResourceVar, MAX_IMPORT_HOPS};
use crate::loader::Program;
use crate::scope::{Binding, ImportTarget, Imported, VarKind};
use crate::syntax::{
    field, is_function, is_literal, location, named_children, string_value, text,
    unwrap_expression,
};
use crate::{ClosureSource, DeduceError};
use pluto_arch::{Closure, ClosurePath, Location, Relationship};
use pluto_closure::{Capture, Dependency};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};
use tree_sitter::Node;

impl<'t> Analyzer<'t> {
    /// The id of the closure `node` denotes, analyzing it on first sight.
    pub(crate) fn closure(&mut self, module: usize, node: Node<'t>) -> Result<String, DeduceError> {
        let (module, func, binding) = self.function_of(module, node)?;
        let program = self.program;
        let file = &program.files[module];
        let at = location(&file.name, func);
        if let Some(id) = self.closure_at.get(&at) {
            return Ok(id.clone());
        }

        let id = binding
            .or_else(|| field(func, "name").map(|name| text(name, &file.source).to_string()))
            .unwrap_or_else(|| format!("fn_{}_{}", at.start.line + 1, at.start.column + 1));
        if self.closures.contains_key(&id) {
            return Err(DeduceError::DuplicateClosure { id, location: at });
        }

        let mut capturer = Capturer::new(self, module, &id, func);
        capturer.walk(func)?;
        let (source, relationships) = capturer.finish(at.clone(), text(func, &file.source));
        debug!(
            closure = %id,
            dependencies = source.dependencies.len(),
            envs = source.envs.len(),
            "analyzed closure"
        );

        let path = ClosurePath::Dir(self.options.workdir.join(&id));
        self.arch
            .add_closure(Closure::new(&id, path).with_envs(source.envs.clone()))?;
        for relationship in relationships {
            if !self.relationships.contains(&relationship) {
                self.relationships.push(relationship);
            }
        }
        self.closure_at.insert(at, id.clone());
        self.closures.insert(id.clone(), source);
        Ok(id)
    }

    /// The function literal `node` is or is bound to, with its module and binding name.
    fn function_of(
        &self,
        module: usize,
        node: Node<'t>,
    ) -> Result<(usize, Node<'t>, Option<String>), DeduceError> {
        let node = unwrap_expression(node);
        if is_function(node) {
            return Ok((module, node, None));
        }

        let file = &self.program.files[module];
        let unresolved = || DeduceError::UnresolvedSymbol {
            name: text(node, &file.source).to_string(),
            location: location(&file.name, node),
        };
        if node.kind() != "identifier" {
            return Err(unresolved());
        }

        let mut module = module;
        let mut name = text(node, &file.source).to_string();
        for _ in 0..MAX_IMPORT_HOPS {
            match self.scopes[module].get(&name) {
                Some(Binding::Function { decl }) => return Ok((module, *decl, Some(name))),
                Some(Binding::Variable {
                    value: Some(value), ..
                }) if is_function(unwrap_expression(*value)) => {
                    return Ok((module, unwrap_expression(*value), Some(name)));
                }
                Some(Binding::Import {
                    target: ImportTarget::Module(target),
                    imported: Imported::Named(imported),
                    ..
                }) if self.program.files[*target].is_user() => {
                    module = *target;
                    name = imported.clone();
                }
                _ => break,
            }
        }
        Err(unresolved())
    }
}

/// Walks a closure body and the top-level code it reaches.
struct Capturer<'a, 't> {
    analyzer: &'a Analyzer<'t>,
    module: usize,
    closure: &'a str,
    root: Node<'t>,
    visited: HashSet<usize>,
    /// Keyed by start byte, so both come out in source order.
    imports: BTreeMap<usize, String>,
    segments: BTreeMap<usize, String>,
    opaque: Vec<Capture>,
    dependencies: Vec<Dependency>,
    envs: Vec<String>,
    relationships: Vec<Relationship>,
}

impl<'a, 't> Capturer<'a, 't> {
    fn new(analyzer: &'a Analyzer<'t>, module: usize, closure: &'a str, root: Node<'t>) -> Self {
        Self {
            analyzer,
            module,
            closure,
            root,
            visited: HashSet::new(),
            imports: BTreeMap::new(),
            segments: BTreeMap::new(),
            opaque: Vec::new(),
            dependencies: Vec::new(),
            envs: Vec::new(),
            relationships: Vec::new(),
        }
    }

    fn source(&self) -> &'t str {
        let program: &'t Program = self.analyzer.program;
        &program.files[self.module].source
    }

    fn location(&self, node: Node) -> Location {
        location(&self.analyzer.program.files[self.module].name, node)
    }

    fn walk(&mut self, root: Node<'t>) -> Result<(), DeduceError> {
        if !self.visited.insert(root.id()) {
            return Ok(());
        }

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "member_expression" => self.member_access(node, root)?,
                "subscript_expression" => self.env_subscript(node, root),
                "identifier" | "shorthand_property_identifier" | "type_identifier" => {
                    if !is_local(node, root, self.source()) {
                        self.free_identifier(node, text(node, self.source()))?;
                    }
                }
                _ => {}
            }
            let mut cursor = node.walk();
            let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
        Ok(())
    }

    /// `r.m` on a resource, or `process.env.NAME`.
    fn member_access(&mut self, node: Node<'t>, root: Node<'t>) -> Result<(), DeduceError> {
        let (Some(object), Some(property)) = (field(node, "object"), field(node, "property")) else {
            return Ok(());
        };
        let source = self.source();
        if is_process_env(object, root, source) {
            self.env(text(property, source));
            return Ok(());
        }

        let object = unwrap_expression(object);
        if object.kind() != "identifier" || is_local(object, root, source) {
            return Ok(());
        }
        let Some(res) = self.analyzer.resource_at(self.module, object) else {
            return Ok(());
        };

        let operation = text(property, source);
        let at = self.location(node);
        let (kind, _) = self.analyzer.lookup_member(&res, operation, &at)?;
        let (relationship, dependency) = match kind {
            MemberKind::Client => (
                Relationship::client(self.closure, &res.id, operation),
                Dependency::method(&res.id, operation),
            ),
            MemberKind::Captured => (
                Relationship::captured_property(self.closure, &res.id, operation),
                Dependency::property(&res.id, operation),
            ),
            MemberKind::Infra => {
                warn!(
                    closure = self.closure,
                    resource = %res.id,
                    operation,
                    location = %at,
                    "infrastructure call inside a closure is ignored"
                );
                return Ok(());
            }
            MemberKind::Plain => {
                debug!(closure = self.closure, resource = %res.id, operation, "ignored plain member");
                return Ok(());
            }
        };
        debug!(closure = self.closure, resource = %res.id, operation, "resource access");
        if !self.relationships.contains(&relationship) {
            self.relationships.push(relationship);
        }
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        Ok(())
    }

    /// `process.env["NAME"]`.
    fn env_subscript(&mut self, node: Node<'t>, root: Node<'t>) {
        let source = self.source();
        let (Some(object), Some(index)) = (field(node, "object"), field(node, "index")) else {
            return;
        };
        if is_process_env(object, root, source) {
            if let Some(name) = string_value(index, source) {
                self.env(&name);
            }
        }
    }

    fn env(&mut self, name: &str) {
        if !self.envs.iter().any(|env| env == name) {
            self.envs.push(name.to_string());
        }
    }

    /// A name the closure uses but does not declare.
    fn free_identifier(&mut self, node: Node<'t>, name: &str) -> Result<(), DeduceError> {
        let analyzer = self.analyzer;
        let Some(binding) = analyzer.scopes[self.module].get(name) else {
            return Ok(());
        };
        let source = self.source();

        match binding {
            Binding::Import {
                statement, target, ..
            } => {
                if let ImportTarget::Module(target) = target {
                    if analyzer.program.files[*target].is_user() {
                        return Err(DeduceError::MultiFileClosure {
                            closure: self.closure.to_string(),
                            name: name.to_string(),
                            location: self.location(node),
                        });
                    }
                }
                self.imports
                    .insert(statement.start_byte(), text(*statement, source).to_string());
            }
            Binding::Variable {
                declarator,
                value,
                kind,
                ..
            } => {
                let key = declarator.start_byte();
                if let Some(res) = analyzer.resources.get(&(self.module, name.to_string())) {
                    self.segments.insert(
                        key,
                        format!("const {} = {};", name, text(res.new_expr, source)),
                    );
                    self.walk_constructor(res)?;
                    return Ok(());
                }

                let value = value.map(unwrap_expression);
                match (kind, value) {
                    (_, Some(value)) if value.id() == self.root.id() => {}
                    (VarKind::Const, Some(value)) if is_function(value) => {
                        self.segment(key, *declarator);
                        self.walk(value)?;
                    }
                    (VarKind::Const, Some(value)) if is_literal(value) => {
                        self.segment(key, *declarator);
                    }
                    (VarKind::Const, Some(_)) => {
                        let reason = format!("'{}' is bound to a value computed at runtime", name);
                        self.mark_opaque(name, reason);
                    }
                    (VarKind::Mutable, _) => self.mark_opaque(name, format!("'{}' is mutable", name)),
                    (VarKind::Const, None) => {
                        self.mark_opaque(name, format!("'{}' is never initialized", name))
                    }
                }
            }
            Binding::Function { decl } | Binding::Class { decl } => {
                if decl.id() != self.root.id() {
                    self.segments
                        .insert(decl.start_byte(), text(*decl, source).to_string());
                    self.walk(*decl)?;
                }
            }
            Binding::Other { statement } => {
                self.segments
                    .insert(statement.start_byte(), text(*statement, source).to_string());
            }
        }
        Ok(())
    }

    fn segment(&mut self, key: usize, declarator: Node<'t>) {
        let code = format!("const {};", text(declarator, self.source()));
        self.segments.insert(key, code);
    }

    fn mark_opaque(&mut self, name: &str, reason: String) {
        let known = self.opaque.iter().any(|capture| {
            matches!(capture, Capture::Opaque { name: known, .. } if known == name)
        });
        if !known {
            debug!(closure = self.closure, name, reason = %reason, "opaque capture");
            self.opaque.push(Capture::Opaque {
                name: name.to_string(),
                reason,
            });
        }
    }

    /// The constructor of a captured resource and its arguments.
    ///
    /// Handlers passed to the constructor are closures of their own and are
    /// not part of this one.
    fn walk_constructor(&mut self, res: &ResourceVar<'t>) -> Result<(), DeduceError> {
        if let Some(constructor) = field(res.new_expr, "constructor") {
            self.walk(constructor)?;
        }
        let args = field(res.new_expr, "arguments")
            .map(named_children)
            .unwrap_or_default();
        for (index, arg) in args.into_iter().enumerate() {
            let handler = res
                .ctor
                .get(index)
                .is_some_and(|param| self.analyzer.is_fn_param(param));
            if !handler && !is_function(unwrap_expression(arg)) {
                self.walk(arg)?;
            }
        }
        Ok(())
    }

    fn finish(self, location: Location, code: &str) -> (ClosureSource, Vec<Relationship>) {
        let source = ClosureSource {
            location,
            code: code.to_string(),
            imports: self.imports.into_values().collect(),
            segments: self.segments.into_values().collect(),
            opaque: self.opaque,
            dependencies: self.dependencies,
            envs: self.envs,
        };
        (source, self.relationships)
    }
}

fn is_process_env(node: Node, root: Node, source: &str) -> bool {
    node.kind() == "member_expression"
        && field(node, "object").is_some_and(|obj| {
            text(obj, source) == "process" && !is_local(obj, root, source)
        })
        && field(node, "property").is_some_and(|prop| text(prop, source) == "env")
}

/// Whether `ident` is declared by a scope enclosing it, up to and including `root`.
fn is_local(ident: Node, root: Node, source: &str) -> bool {
    let name = text(ident, source);
    let mut current = ident;
    while current.id() != root.id() {
        let Some(parent) = current.parent() else {
            break;
        };
        if declared_in(parent, source).contains(name) {
            return true;
        }
        current = parent;
    }
    false
}

/// Names `scope` itself declares, not counting nested scopes.
fn declared_in<'s>(scope: Node, source: &'s str) -> HashSet<&'s str> {
    let mut names = HashSet::new();
    match scope.kind() {
        "statement_block" | "switch_case" | "switch_default" => {
            for stmt in named_children(scope) {
                declaration_names(stmt, source, &mut names);
            }
        }
        "function_declaration"
        | "generator_function_declaration"
        | "function_expression"
        | "function"
        | "generator_function"
        | "arrow_function"
        | "method_definition" => {
            if matches!(
                scope.kind(),
                "function_expression" | "function" | "generator_function"
            ) {
                if let Some(name) = field(scope, "name") {
                    names.insert(text(name, source));
                }
            }
            if let Some(param) = field(scope, "parameter") {
                pattern_names(param, source, &mut names);
            }
            for param in field(scope, "parameters").map(named_children).unwrap_or_default() {
                match param.kind() {
                    "required_parameter" | "optional_parameter" => {
                        if let Some(pattern) = field(param, "pattern") {
                            pattern_names(pattern, source, &mut names);
                        }
                    }
                    _ => pattern_names(param, source, &mut names),
                }
            }
            for param in field(scope, "type_parameters")
                .map(named_children)
                .unwrap_or_default()
            {
                if let Some(name) = field(param, "name") {
                    names.insert(text(name, source));
                }
            }
        }
        "for_statement" => {
            if let Some(init) = field(scope, "initializer") {
                declaration_names(init, source, &mut names);
            }
        }
        "for_in_statement" => {
            if field(scope, "kind").is_some() {
                if let Some(left) = field(scope, "left") {
                    pattern_names(left, source, &mut names);
                }
            }
        }
        "catch_clause" => {
            if let Some(param) = field(scope, "parameter") {
                pattern_names(param, source, &mut names);
            }
        }
        "class" => {
            if let Some(name) = field(scope, "name") {
                names.insert(text(name, source));
            }
        }
        _ => {}
    }
    names
}

fn declaration_names<'s>(stmt: Node, source: &'s str, names: &mut HashSet<&'s str>) {
    match stmt.kind() {
        "lexical_declaration" | "variable_declaration" => {
            for declarator in named_children(stmt) {
                if let Some(name) = field(declarator, "name") {
                    pattern_names(name, source, names);
                }
            }
        }
        "function_declaration"
        | "generator_function_declaration"
        | "class_declaration"
        | "abstract_class_declaration"
        | "enum_declaration" => {
            if let Some(name) = field(stmt, "name") {
                names.insert(text(name, source));
            }
        }
        _ => {}
    }
}

fn pattern_names<'s>(pattern: Node, source: &'s str, names: &mut HashSet<&'s str>) {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            names.insert(text(pattern, source));
        }
        "pair_pattern" => {
            if let Some(value) = field(pattern, "value") {
                pattern_names(value, source, names);
            }
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(left) = field(pattern, "left") {
                pattern_names(left, source, names);
            }
        }
        _ => {
            for child in named_children(pattern) {
                pattern_names(child, source, names);
            }
        }
    }
}
