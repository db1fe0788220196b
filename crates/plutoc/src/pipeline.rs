//! Deduce, order, extract, persist.

use pluto_arch::Architecture;
use pluto_closure::{extract, ExtractError, ModuleSerializer};
use pluto_deduce_ts::{DeduceError, DeduceOptions, Deducer};
use pluto_topo::{find_cycles, topo_sort, Node, SortError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Architecture document written into the output directory.
pub const ARCH_FILE: &str = "arch.yml";

/// Graphviz rendering written next to [`ARCH_FILE`].
pub const DOT_FILE: &str = "arch.dot";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Deduce(#[from] DeduceError),

    #[error(transparent)]
    Sort(#[from] SortError),

    #[error("there is a cycle in the architecture: {}", members.join(" -> "))]
    Cycle { members: Vec<String> },

    #[error("the closure workdir {workdir} must not be inside the output directory {out}")]
    WorkdirInsideOut { workdir: PathBuf, out: PathBuf },

    #[error("closure '{0}' has no source to extract")]
    MissingClosure(String),

    #[error("failed to extract closure '{closure}': {source}")]
    Extract {
        closure: String,
        #[source]
        source: ExtractError,
    },

    #[error(transparent)]
    Yaml(#[from] pluto_arch_yaml::YamlError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One run of the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub entries: Vec<PathBuf>,
    pub options: DeduceOptions,
    /// Receives the architecture files and one directory per closure.
    pub out: PathBuf,
}

/// What a run produced.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub architecture: Architecture,
    /// Emission order, as [`describe`] labels.
    pub order: Vec<String>,
    /// Entry module of each extracted closure.
    pub entrypoints: BTreeMap<String, PathBuf>,
}

pub fn run(config: &Config) -> Result<Report, PipelineError> {
    check_dirs(&config.options.workdir, &config.out)?;
    let deduction = Deducer::new(config.options.clone()).deduce(&config.entries)?;
    let arch = &deduction.architecture;

    let order = match topo_sort(arch) {
        Ok(order) => order,
        Err(SortError::CycleExists) => return Err(cycle_error(arch)),
        Err(err) => return Err(err.into()),
    };
    info!(nodes = order.len(), "sorted architecture");

    create_dir(&config.out)?;
    let mut entrypoints = BTreeMap::new();
    for node in &order {
        let Node::Closure(closure) = node else {
            continue;
        };
        let mut compute = deduction
            .compute_closure(&closure.id)
            .ok_or_else(|| PipelineError::MissingClosure(closure.id.clone()))?;
        let workdir = config.out.join(&closure.id);
        create_dir(&workdir)?;

        let extraction = extract(arch, &mut compute, &workdir, &ModuleSerializer).map_err(
            |source| PipelineError::Extract {
                closure: closure.id.clone(),
                source,
            },
        )?;
        debug!(closure = %closure.id, entrypoint = %extraction.entrypoint.display(), "extracted");
        entrypoints.insert(closure.id.clone(), extraction.entrypoint);
    }

    write(&config.out.join(ARCH_FILE), &pluto_arch_yaml::to_yaml(arch)?)?;
    write(&config.out.join(DOT_FILE), &pluto_arch_yaml::to_dot(arch))?;
    info!(
        out = %config.out.display(),
        closures = entrypoints.len(),
        "wrote architecture"
    );

    Ok(Report {
        order: order.iter().map(describe).collect(),
        architecture: deduction.architecture.clone(),
        entrypoints,
    })
}

/// `resource:<name>`, `closure:<id>` or `relationship:<caller id>.<operation>`.
pub fn describe(node: &Node<'_>) -> String {
    match node {
        Node::Resource(res) => format!("resource:{}", res.name),
        Node::Closure(closure) => format!("closure:{}", closure.id),
        Node::Relationship(relat) => format!("relationship:{}.{}", relat.from.id, relat.operation),
    }
}

/// Extraction copies each closure directory into `<out>/<id>`, which must not
/// hold the closure directories themselves.
fn check_dirs(workdir: &Path, out: &Path) -> Result<(), PipelineError> {
    let absolute = |path: &Path| {
        std::path::absolute(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })
    };
    let (workdir, out) = (absolute(workdir)?, absolute(out)?);
    if workdir.starts_with(&out) {
        return Err(PipelineError::WorkdirInsideOut { workdir, out });
    }
    Ok(())
}

fn cycle_error(arch: &Architecture) -> PipelineError {
    match find_cycles(arch) {
        Ok(cycles) => PipelineError::Cycle {
            members: cycles.iter().flatten().map(describe).collect(),
        },
        Err(err) => err.into(),
    }
}

fn create_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: &str) -> Result<(), PipelineError> {
    fs::write(path, contents).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}
