use anyhow::Context;
use clap::Parser;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use pluto_deduce_ts::{DeduceOptions, Library};
use plutoc::{Config, Manifest, PipelineError, MANIFEST_FILE};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plutoc")]
#[command(about = "Deduce the architecture of a pluto program")]
#[command(version)]
struct Cli {
    /// Entry-point TypeScript files
    #[arg(required = true)]
    entries: Vec<PathBuf>,

    /// Log every visited construct
    #[arg(short, long)]
    verbose: bool,

    /// Project name used in resource ids
    #[arg(long)]
    project: Option<String>,

    /// Stack name used in resource ids
    #[arg(long)]
    stack: Option<String>,

    /// Where closure modules are materialized
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Output directory for the architecture and extracted closures
    #[arg(long, default_value = ".pluto/out")]
    out: PathBuf,

    /// Project manifest; defaults to ./Pluto.toml when present
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match build(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn build(cli: &Cli) -> anyhow::Result<()> {
    let config = Config {
        entries: cli.entries.clone(),
        options: options(cli)?,
        out: cli.out.clone(),
    };
    let report = plutoc::run(&config)?;
    for (closure, entrypoint) in &report.entrypoints {
        println!("{}: {}", closure, entrypoint.display());
    }
    println!("{}", config.out.join(plutoc::ARCH_FILE).display());
    Ok(())
}

/// Defaults, overridden by the manifest, overridden by flags.
fn options(cli: &Cli) -> anyhow::Result<DeduceOptions> {
    let mut options = DeduceOptions::default();

    let manifest = match &cli.config {
        Some(path) => Some(Manifest::load(path)?),
        None if Path::new(MANIFEST_FILE).is_file() => Some(Manifest::load(Path::new(MANIFEST_FILE))?),
        None => None,
    };
    if let Some(manifest) = manifest {
        if let Some(project) = manifest.project_name() {
            options.project = project.to_string();
        }
        if let Some(stack) = manifest.stack_name() {
            options.stack = stack.to_string();
        }
        if let Some(workdir) = &manifest.build.workdir {
            options.workdir = workdir.clone();
        }
        for (package, path) in &manifest.libraries {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read library '{}' from {}", package, path.display()))?;
            options.libraries.retain(|library| &library.package != package);
            options.libraries.push(Library::new(package, source));
        }
    }

    if let Some(project) = &cli.project {
        options.project = project.clone();
    }
    if let Some(stack) = &cli.stack {
        options.stack = stack.clone();
    }
    if let Some(workdir) = &cli.workdir {
        options.workdir = workdir.clone();
    }
    Ok(options)
}

/// Deduction errors get a source snippet; everything else a plain chain.
fn report(err: &anyhow::Error) {
    if let Some(PipelineError::Deduce(deduce)) = err.downcast_ref::<PipelineError>() {
        if deduce.location().is_some() {
            let writer = StandardStream::stderr(ColorChoice::Auto);
            if deduce.emit(&mut writer.lock()).is_ok() {
                return;
            }
        }
    }
    eprintln!("error: {:#}", err);
}
