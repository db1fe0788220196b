//! Reading and parsing every module a program is made of.

use crate::syntax::{field, first_error, location, named_children, string_value, text};
use crate::{DeduceError, Library};
use pluto_arch::{Location, Position};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

/// Where a module comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Origin {
    User,
    Library(String),
}

/// One parsed module.
pub(crate) struct SourceFile {
    /// Canonical path for user modules, the package name for libraries.
    pub path: PathBuf,
    /// How the module is named in locations.
    pub name: String,
    pub source: String,
    pub tree: Tree,
    pub origin: Origin,
}

impl SourceFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn is_user(&self) -> bool {
        self.origin == Origin::User
    }

    /// Package name, or the file stem for user modules.
    pub fn label(&self) -> String {
        match &self.origin {
            Origin::Library(package) => package.clone(),
            Origin::User => self
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.name.clone()),
        }
    }
}

/// Every module of a program, with imports resolved.
pub(crate) struct Program {
    pub files: Vec<SourceFile>,
    /// Relative specifiers of each module and the module they resolve to.
    links: Vec<HashMap<String, usize>>,
    packages: HashMap<String, usize>,
    /// User modules, each after the modules it imports.
    pub order: Vec<usize>,
}

impl Program {
    /// The module `specifier` names when imported from `from`.
    pub fn resolve(&self, from: usize, specifier: &str) -> Option<usize> {
        if is_relative(specifier) {
            self.links.get(from)?.get(specifier).copied()
        } else {
            self.packages.get(specifier).copied()
        }
    }
}

/// Parse the libraries and every user module reachable from `entries`.
///
/// Modules of one discovery wave are read and parsed in parallel.
pub(crate) fn load(entries: &[PathBuf], libraries: &[Library]) -> Result<Program, DeduceError> {
    let mut files = Vec::new();
    let mut packages = HashMap::new();
    for library in libraries {
        let file = parse_source(
            PathBuf::from(&library.package),
            library.package.clone(),
            library.source.clone(),
            Origin::Library(library.package.clone()),
        )?;
        packages.insert(library.package.clone(), files.len());
        files.push(file);
    }

    let mut by_path: HashMap<PathBuf, usize> = HashMap::new();
    let mut wave: BTreeSet<PathBuf> = BTreeSet::new();
    for entry in entries {
        wave.insert(canonicalize(entry)?);
    }

    let mut links: Vec<HashMap<String, usize>> = vec![HashMap::new(); files.len()];
    let mut pending: Vec<(usize, String, PathBuf)> = Vec::new();
    while !wave.is_empty() {
        let current: Vec<PathBuf> = std::mem::take(&mut wave).into_iter().collect();
        let parsed = current
            .par_iter()
            .map(|path| parse_file(path))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = parsed.len(), "parsed wave");

        for file in parsed {
            let index = files.len();
            by_path.insert(file.path.clone(), index);
            for (specifier, node) in relative_imports(&file) {
                let target = resolve_relative(&file.path, &specifier).ok_or_else(|| {
                    DeduceError::UnresolvedImport {
                        specifier: specifier.clone(),
                        location: location(&file.name, node),
                    }
                })?;
                if !by_path.contains_key(&target) && current.binary_search(&target).is_err() {
                    wave.insert(target.clone());
                }
                pending.push((index, specifier, target));
            }
            files.push(file);
            links.push(HashMap::new());
        }
    }

    for (from, specifier, target) in pending {
        if let Some(&to) = by_path.get(&target) {
            links[from].insert(specifier, to);
        }
    }

    let mut program = Program {
        files,
        links,
        packages,
        order: Vec::new(),
    };
    program.order = module_order(&program);
    Ok(program)
}

fn canonicalize(path: &Path) -> Result<PathBuf, DeduceError> {
    fs::canonicalize(path).map_err(|source| DeduceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_file(path: &Path) -> Result<SourceFile, DeduceError> {
    let source = fs::read_to_string(path).map_err(|source| DeduceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path.display().to_string();
    parse_source(path.to_path_buf(), name, source, Origin::User)
}

fn parse_source(
    path: PathBuf,
    name: String,
    source: String,
    origin: Origin,
) -> Result<SourceFile, DeduceError> {
    let start = Location::new(&name, Position::new(0, 0), Position::new(0, 0));

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
        .map_err(|err| DeduceError::Parse {
            location: start.clone(),
            message: err.to_string(),
        })?;
    let tree = parser
        .parse(&source, None)
        .ok_or_else(|| DeduceError::Parse {
            location: start,
            message: "failed to parse".to_string(),
        })?;

    if let Some(node) = first_error(tree.root_node()) {
        let message = if node.is_missing() {
            format!("missing {}", node.kind())
        } else {
            let found = text(node, &source).lines().next().unwrap_or("").trim();
            format!("unexpected '{}'", found)
        };
        return Err(DeduceError::Parse {
            location: location(&name, node),
            message,
        });
    }

    debug!(module = %name, "parsed module");
    Ok(SourceFile {
        path,
        name,
        source,
        tree,
        origin,
    })
}

/// Relative specifiers of the module's import and re-export statements.
fn relative_imports(file: &SourceFile) -> Vec<(String, Node<'_>)> {
    named_children(file.root())
        .into_iter()
        .filter(|stmt| matches!(stmt.kind(), "import_statement" | "export_statement"))
        .filter_map(|stmt| field(stmt, "source"))
        .filter_map(|node| Some((string_value(node, &file.source)?, node)))
        .filter(|(specifier, _)| is_relative(specifier))
        .collect()
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// `./x` may name `x`, `x.ts` or `x/index.ts`.
fn resolve_relative(from: &Path, specifier: &str) -> Option<PathBuf> {
    let base = from.parent()?.join(specifier);
    let mut with_ext = base.clone().into_os_string();
    with_ext.push(".ts");

    [base.clone(), PathBuf::from(with_ext), base.join("index.ts")]
        .into_iter()
        .find(|candidate| candidate.is_file())
        .and_then(|found| fs::canonicalize(found).ok())
}

/// Depth-first post-order over user imports, visiting modules by path.
fn module_order(program: &Program) -> Vec<usize> {
    let mut users: Vec<usize> = (0..program.files.len())
        .filter(|&idx| program.files[idx].is_user())
        .collect();
    users.sort_by(|a, b| program.files[*a].path.cmp(&program.files[*b].path));

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    for root in users {
        visit(program, root, &mut visited, &mut order);
    }
    order
}

fn visit(program: &Program, module: usize, visited: &mut HashSet<usize>, order: &mut Vec<usize>) {
    if !visited.insert(module) {
        return;
    }
    let mut deps: Vec<usize> = program.links[module].values().copied().collect();
    deps.sort_by(|a, b| program.files[*a].path.cmp(&program.files[*b].path));
    deps.dedup();
    for dep in deps {
        visit(program, dep, visited, order);
    }
    order.push(module);
}
