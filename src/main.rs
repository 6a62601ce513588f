//! Binary entrypoint: parse the CLI, load and validate the workflow
//! config, then drive the manager to completion.
//!
//! Concrete Kubernetes/Flux backends are out of scope (spec Non-goals);
//! `--scheduler` is accepted and validated for interface fidelity, but
//! every scheduler choice currently runs against the in-memory reference
//! [`workflow_operator::tracker::memory::MemoryTracker`].

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use workflow_operator::cli::{Cli, Command, RunArgs};
use workflow_operator::config::load_workflow;
use workflow_operator::error::OperatorError;
use workflow_operator::tracker::memory::MemoryTracker;
use workflow_operator::watcher::NoopWatcher;
use workflow_operator::WorkflowManager;

const SERVICE_ACCOUNT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn read_namespace() -> Option<String> {
    std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_FILE)
        .ok()
        .map(|s| s.trim().to_string())
}

async fn run(args: RunArgs) -> Result<i32, OperatorError> {
    let config = load_workflow(&args.config)?;

    if let Some(namespace) = read_namespace() {
        info!(namespace, "discovered cluster namespace from service account");
    } else {
        warn!("no service account namespace file found, continuing without it");
    }

    info!(scheduler = %args.scheduler, "starting workflow operator");

    let workdir = args.workdir.unwrap_or_else(|| PathBuf::from("."));
    let tracker = Arc::new(MemoryTracker::new());
    let watcher = Arc::new(NoopWatcher);

    let mut manager = WorkflowManager::new(config, tracker, watcher, workdir)?;
    let outcome = manager.watch().await?;
    Ok(outcome.exit_code)
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run(args).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(error = %err, "workflow operator exited with an error");
            std::process::exit(1);
        }
    }
}
