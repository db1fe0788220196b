//! Top-level bindings of each module.

use crate::loader::Program;
use crate::syntax::{field, named_children, string_value, text};
use std::collections::HashMap;
use tree_sitter::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ImportTarget {
    Module(usize),
    /// A package no library is registered for.
    Package(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Imported {
    Named(String),
    Default,
    Namespace,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum VarKind {
    Const,
    Mutable,
}

#[derive(Debug, Clone)]
pub(crate) enum Binding<'t> {
    Import {
        statement: Node<'t>,
        target: ImportTarget,
        imported: Imported,
    },
    Function {
        decl: Node<'t>,
    },
    Variable {
        declarator: Node<'t>,
        value: Option<Node<'t>>,
        kind: VarKind,
    },
    Class {
        decl: Node<'t>,
    },
    /// Enums, namespaces and other declarations only copied as text.
    Other {
        statement: Node<'t>,
    },
}

#[derive(Debug, Default)]
pub(crate) struct Scope<'t> {
    bindings: HashMap<String, Binding<'t>>,
}

impl<'t> Scope<'t> {
    pub fn get(&self, name: &str) -> Option<&Binding<'t>> {
        self.bindings.get(name)
    }

    /// Collect the bindings of `module`.
    pub fn build(program: &'t Program, module: usize) -> Self {
        let file = &program.files[module];
        let mut scope = Scope::default();
        for stmt in named_children(file.root()) {
            scope.declare(program, module, declaration(stmt));
        }
        scope
    }

    fn declare(&mut self, program: &'t Program, module: usize, stmt: Node<'t>) {
        let source = &program.files[module].source;
        match stmt.kind() {
            "import_statement" => self.declare_import(program, module, stmt),
            "lexical_declaration" | "variable_declaration" => {
                let kind = match stmt.child(0).map(|kw| text(kw, source)) {
                    Some("const") => VarKind::Const,
                    _ => VarKind::Mutable,
                };
                for declarator in named_children(stmt) {
                    let Some(name) = field(declarator, "name") else {
                        continue;
                    };
                    if name.kind() != "identifier" {
                        continue;
                    }
                    self.bindings.insert(
                        text(name, source).to_string(),
                        Binding::Variable {
                            declarator,
                            value: field(declarator, "value"),
                            kind,
                        },
                    );
                }
            }
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = field(stmt, "name") {
                    self.bindings
                        .insert(text(name, source).to_string(), Binding::Function { decl: stmt });
                }
            }
            "class_declaration" | "abstract_class_declaration" => {
                if let Some(name) = field(stmt, "name") {
                    self.bindings
                        .insert(text(name, source).to_string(), Binding::Class { decl: stmt });
                }
            }
            "enum_declaration"
            | "interface_declaration"
            | "type_alias_declaration"
            | "internal_module"
            | "module" => {
                // A class of the same name keeps its binding.
                if let Some(name) = field(stmt, "name") {
                    self.bindings
                        .entry(text(name, source).to_string())
                        .or_insert(Binding::Other { statement: stmt });
                }
            }
            _ => {}
        }
    }

    fn declare_import(&mut self, program: &'t Program, module: usize, stmt: Node<'t>) {
        let source = &program.files[module].source;
        let Some(specifier) = field(stmt, "source").and_then(|node| string_value(node, source))
        else {
            return;
        };
        let target = match program.resolve(module, &specifier) {
            Some(idx) => ImportTarget::Module(idx),
            None => ImportTarget::Package(specifier),
        };

        let Some(clause) = named_children(stmt)
            .into_iter()
            .find(|child| child.kind() == "import_clause")
        else {
            return;
        };
        for part in named_children(clause) {
            match part.kind() {
                "identifier" => self.import(part, source, stmt, &target, Imported::Default),
                "namespace_import" => {
                    if let Some(alias) = part.named_child(0) {
                        self.import(alias, source, stmt, &target, Imported::Namespace);
                    }
                }
                "named_imports" => {
                    for spec in named_children(part) {
                        let Some(name) = field(spec, "name") else {
                            continue;
                        };
                        let local = field(spec, "alias").unwrap_or(name);
                        let imported = Imported::Named(text(name, source).to_string());
                        self.import(local, source, stmt, &target, imported);
                    }
                }
                _ => {}
            }
        }
    }

    fn import(
        &mut self,
        local: Node<'t>,
        source: &str,
        statement: Node<'t>,
        target: &ImportTarget,
        imported: Imported,
    ) {
        self.bindings.insert(
            text(local, source).to_string(),
            Binding::Import {
                statement,
                target: target.clone(),
                imported,
            },
        );
    }
}

/// The declaration an `export` statement wraps, or the statement itself.
pub(crate) fn declaration(stmt: Node) -> Node {
    if stmt.kind() == "export_statement" {
        if let Some(decl) = field(stmt, "declaration") {
            return decl;
        }
    }
    stmt
}
