//! Raw, serde-deserializable shape of a workflow configuration file.
//!
//! Grounded on `examples/original_source/.../config/types.py` and spec §6's
//! field list. `serde_yaml` is used because the source project is a
//! Kubernetes operator and workflow manifests are naturally YAML.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registry coordinates for pulling/pushing container images or artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub host: String,
    #[serde(default)]
    pub plain_http: bool,
    #[serde(default)]
    pub push: Option<String>,
    #[serde(default)]
    pub pull: Option<String>,
}

/// Per-step resource request, everything but the mutable `nodes` count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default = "default_one")]
    pub nnodes: u32,
    #[serde(rename = "cores_per_task", default = "default_one")]
    pub cores_per_task: u32,
    #[serde(rename = "ngpus", default)]
    pub gpus: u32,
    #[serde(default)]
    pub walltime: Option<String>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

fn default_one() -> u32 {
    1
}

/// A single workflow step as declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub image: String,
    pub config: StepConfig,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub environment: Option<HashMap<String, String>>,
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

/// Cluster-wide node ceiling, independent of the per-workflow `max_size`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub max_nodes: Option<u32>,
}

/// Raw rule entry as written in the config file, keyed externally by
/// `"<model>.<step>.<key>"` (see [`crate::rules`] for the parsed form).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default)]
    pub when: Option<serde_yaml::Value>,
    pub action: String,
    pub metric: String,
    #[serde(default)]
    pub repetitions: Option<i64>,
    #[serde(default)]
    pub backoff: Option<i64>,
    #[serde(default, rename = "minCompletions")]
    pub min_completions: Option<u64>,
    #[serde(default, rename = "minSize")]
    pub min_size: Option<u32>,
    #[serde(default, rename = "maxSize")]
    pub max_size: Option<u32>,
    #[serde(default)]
    pub disabled: bool,
}

/// The immutable (after load) workflow configuration: steps, sizing,
/// rules, and registry/filesystem choice (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    pub max_size: u32,
    pub completions_needed: u32,
    pub jobs: Vec<StepSpec>,
    #[serde(default)]
    pub rules: HashMap<String, Vec<RuleSpec>>,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub filesystem: Option<String>,
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

fn default_prefix() -> String {
    "job_".to_string()
}

impl WorkflowConfig {
    /// Ordered step names, first to last.
    pub fn step_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    pub fn first_step(&self) -> &str {
        // Safe: invariants are checked at load time (non-empty jobs).
        self.jobs[0].name.as_str()
    }

    pub fn last_step(&self) -> &str {
        self.jobs[self.jobs.len() - 1].name.as_str()
    }

    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn step_mut(&mut self, name: &str) -> Option<&mut StepSpec> {
        self.jobs.iter_mut().find(|j| j.name == name)
    }

    pub fn nodes_of_first_step(&self) -> u32 {
        self.jobs[0].config.nnodes
    }
}
