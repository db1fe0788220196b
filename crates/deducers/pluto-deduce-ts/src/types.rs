//! Index of declared classes, interfaces and type aliases.
//!
//! Declarations are keyed by module and name, so a class and an interface of
//! the same name in one module merge the way TypeScript merges them.

use crate::loader::Program;
use crate::scope::{declaration, Binding, ImportTarget, Imported, Scope};
use crate::syntax::{field, named_children, text};
use std::collections::HashMap;
use tracing::debug;
use tree_sitter::Node;

pub(crate) type DeclId = usize;

/// Re-export chains longer than this are not followed.
const MAX_IMPORT_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub(crate) struct Param<'t> {
    /// Module the parameter is declared in.
    pub module: usize,
    pub name: String,
    /// The declared type, without the leading colon.
    pub ty: Option<Node<'t>>,
}

#[derive(Debug, Clone)]
pub(crate) struct Member<'t> {
    pub name: String,
    pub params: Vec<Param<'t>>,
}

#[derive(Debug)]
pub(crate) struct TypeDecl<'t> {
    pub module: usize,
    pub name: String,
    /// Resolved `extends`/`implements` targets and alias members.
    pub bases: Vec<DeclId>,
    pub members: Vec<Member<'t>>,
    pub ctor: Option<Vec<Param<'t>>>,
}

pub(crate) struct TypeIndex<'t> {
    program: &'t Program,
    decls: Vec<TypeDecl<'t>>,
    by_name: HashMap<(usize, String), Vec<DeclId>>,
}

impl<'t> TypeIndex<'t> {
    pub fn build(program: &'t Program, scopes: &[Scope<'t>]) -> Self {
        let mut index = TypeIndex {
            program,
            decls: Vec::new(),
            by_name: HashMap::new(),
        };

        let mut heritage: Vec<Vec<Node<'t>>> = Vec::new();
        for (module, file) in program.files.iter().enumerate() {
            for stmt in named_children(file.root()) {
                let decl = declaration(stmt);
                if let Some((decl, bases)) = index.collect(module, decl) {
                    let id = index.decls.len();
                    index
                        .by_name
                        .entry((module, decl.name.clone()))
                        .or_default()
                        .push(id);
                    index.decls.push(decl);
                    heritage.push(bases);
                }
            }
        }

        for (id, nodes) in heritage.into_iter().enumerate() {
            let module = index.decls[id].module;
            let bases: Vec<DeclId> = nodes
                .into_iter()
                .flat_map(|node| index.resolve(scopes, module, node))
                .collect();
            index.decls[id].bases = bases;
        }

        debug!(count = index.decls.len(), "indexed type declarations");
        index
    }

    pub fn get(&self, id: DeclId) -> &TypeDecl<'t> {
        &self.decls[id]
    }

    /// Declarations named `name` in `module` itself.
    pub fn declared(&self, module: usize, name: &str) -> Vec<DeclId> {
        self.by_name
            .get(&(module, name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Declarations a type or constructor expression in `module` refers to.
    pub fn resolve(&self, scopes: &[Scope<'t>], module: usize, node: Node<'t>) -> Vec<DeclId> {
        self.resolve_at(scopes, module, node, 0)
    }

    fn resolve_at(
        &self,
        scopes: &[Scope<'t>],
        module: usize,
        node: Node<'t>,
        depth: usize,
    ) -> Vec<DeclId> {
        let source = &self.program.files[module].source;
        match node.kind() {
            "type_identifier" | "identifier" => {
                self.resolve_name(scopes, module, text(node, source), depth)
            }
            "nested_type_identifier" | "member_expression" => {
                let (object, property) = match node.kind() {
                    "member_expression" => (field(node, "object"), field(node, "property")),
                    _ => (field(node, "module"), field(node, "name")),
                };
                let (Some(object), Some(property)) = (object, property) else {
                    return Vec::new();
                };
                match scopes[module].get(text(object, source)) {
                    Some(Binding::Import {
                        target: ImportTarget::Module(target),
                        imported: Imported::Namespace,
                        ..
                    }) => self.resolve_name(scopes, *target, text(property, source), depth + 1),
                    _ => Vec::new(),
                }
            }
            "generic_type" => field(node, "name")
                .map(|name| self.resolve_at(scopes, module, name, depth))
                .unwrap_or_default(),
            "type_annotation" | "parenthesized_type" | "readonly_type" => node
                .named_child(0)
                .map(|inner| self.resolve_at(scopes, module, inner, depth))
                .unwrap_or_default(),
            "union_type" | "intersection_type" => named_children(node)
                .into_iter()
                .flat_map(|part| self.resolve_at(scopes, module, part, depth))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// A name declared in `module` or imported into it.
    fn resolve_name(
        &self,
        scopes: &[Scope<'t>],
        module: usize,
        name: &str,
        depth: usize,
    ) -> Vec<DeclId> {
        let ids = self.declared(module, name);
        if !ids.is_empty() {
            return ids;
        }
        if depth >= MAX_IMPORT_DEPTH {
            return Vec::new();
        }
        match scopes[module].get(name) {
            Some(Binding::Import {
                target: ImportTarget::Module(target),
                imported: Imported::Named(imported),
                ..
            }) => self.resolve_name(scopes, *target, imported, depth + 1),
            _ => Vec::new(),
        }
    }

    fn collect(&self, module: usize, node: Node<'t>) -> Option<(TypeDecl<'t>, Vec<Node<'t>>)> {
        let source = &self.program.files[module].source;
        let name = text(field(node, "name")?, source).to_string();
        let mut decl = TypeDecl {
            module,
            name,
            bases: Vec::new(),
            members: Vec::new(),
            ctor: None,
        };
        let mut bases = Vec::new();

        match node.kind() {
            "class_declaration" | "abstract_class_declaration" => {
                for child in named_children(node) {
                    if child.kind() == "class_heritage" {
                        bases.extend(class_heritage(child));
                    }
                }
                if let Some(body) = field(node, "body") {
                    self.class_members(module, body, &mut decl);
                }
            }
            "interface_declaration" => {
                for child in named_children(node) {
                    if child.kind() == "extends_type_clause" {
                        bases.extend(named_children(child));
                    }
                }
                if let Some(body) = field(node, "body") {
                    decl.members = self.object_members(module, body);
                }
            }
            "type_alias_declaration" => {
                let value = field(node, "value")?;
                if value.kind() == "object_type" {
                    decl.members = self.object_members(module, value);
                } else {
                    bases.push(value);
                }
            }
            _ => return None,
        }
        Some((decl, bases))
    }

    fn class_members(&self, module: usize, body: Node<'t>, decl: &mut TypeDecl<'t>) {
        let source = &self.program.files[module].source;
        for item in named_children(body) {
            let Some(name) = field(item, "name").map(|name| text(name, source).to_string())
            else {
                continue;
            };
            match item.kind() {
                "method_definition" if name == "constructor" => {
                    decl.ctor = Some(self.params(module, field(item, "parameters")));
                }
                "method_definition" | "method_signature" | "abstract_method_signature" => {
                    let params = self.params(module, field(item, "parameters"));
                    decl.members.push(Member { name, params });
                }
                "public_field_definition" => decl.members.push(Member {
                    name,
                    params: Vec::new(),
                }),
                _ => {}
            }
        }
    }

    fn object_members(&self, module: usize, body: Node<'t>) -> Vec<Member<'t>> {
        let source = &self.program.files[module].source;
        let mut members = Vec::new();
        for item in named_children(body) {
            let Some(name) = field(item, "name").map(|name| text(name, source).to_string())
            else {
                continue;
            };
            match item.kind() {
                "method_signature" => members.push(Member {
                    name,
                    params: self.params(module, field(item, "parameters")),
                }),
                "property_signature" => members.push(Member {
                    name,
                    params: Vec::new(),
                }),
                _ => {}
            }
        }
        members
    }

    fn params(&self, module: usize, list: Option<Node<'t>>) -> Vec<Param<'t>> {
        let source = &self.program.files[module].source;
        let Some(list) = list else {
            return Vec::new();
        };
        named_children(list)
            .into_iter()
            .filter(|param| matches!(param.kind(), "required_parameter" | "optional_parameter"))
            .map(|param| {
                let name = field(param, "pattern")
                    .map(|pattern| match pattern.kind() {
                        "rest_pattern" => pattern.named_child(0).unwrap_or(pattern),
                        _ => pattern,
                    })
                    .map(|pattern| text(pattern, source).to_string())
                    .unwrap_or_default();
                let ty = field(param, "type").and_then(|annotation| annotation.named_child(0));
                Param { module, name, ty }
            })
            .collect()
    }
}

/// Types named in `extends` and `implements` clauses.
fn class_heritage(heritage: Node) -> Vec<Node> {
    let mut bases = Vec::new();
    for clause in named_children(heritage) {
        match clause.kind() {
            "extends_clause" => {
                let mut cursor = clause.walk();
                bases.extend(clause.children_by_field_name("value", &mut cursor));
            }
            "implements_clause" => bases.extend(named_children(clause)),
            _ => {}
        }
    }
    bases
}
