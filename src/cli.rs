//! Command-line surface (spec §4.10, ambient — the distilled spec left
//! the CLI out of scope; this follows the original operator's `run`
//! entrypoint and flag set).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "workflow-operator", version, about = "Multi-step job sequence orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a workflow config and run it to completion.
    Run(RunArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Scheduler {
    Kubernetes,
    Flux,
}

impl std::fmt::Display for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheduler::Kubernetes => write!(f, "kubernetes"),
            Scheduler::Flux => write!(f, "flux"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Path to the workflow configuration YAML.
    #[arg(long)]
    pub config: PathBuf,

    /// Working directory for persisted artifacts (defaults to cwd).
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Scheduler backend to submit jobs against.
    #[arg(long, value_enum, default_value_t = Scheduler::Kubernetes)]
    pub scheduler: Scheduler,

    /// Registry host overriding the config's `registry.host`.
    #[arg(long)]
    pub registry: Option<String>,

    /// Use plain HTTP (no TLS) when talking to the registry.
    #[arg(long, default_value_t = false)]
    pub plain_http: bool,

    /// Use a filesystem root instead of a registry for artifact storage.
    #[arg(long)]
    pub filesystem: Option<PathBuf>,
}
