//! Load and validate a workflow configuration from a YAML file.

use std::collections::HashSet;
use std::path::Path;

use super::types::WorkflowConfig;
use crate::error::{OperatorError, OperatorResult};
use crate::rules::validate_rule_spec;

/// Load a workflow configuration from `path`, validating every structural
/// invariant from spec §3 and every rule from spec §4.1 before returning.
///
/// Fails fast: no backend connection is attempted until this succeeds.
pub fn load_workflow(path: &Path) -> OperatorResult<WorkflowConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: WorkflowConfig = serde_yaml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &WorkflowConfig) -> OperatorResult<()> {
    if config.jobs.is_empty() {
        return Err(OperatorError::InvalidWorkflow(
            "workflow must declare at least one step".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for step in &config.jobs {
        if step.name.is_empty() {
            return Err(OperatorError::InvalidWorkflow(
                "step names must be non-empty".to_string(),
            ));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(OperatorError::InvalidWorkflow(format!(
                "duplicate step name '{}'",
                step.name
            )));
        }
        if step.image.is_empty() {
            return Err(OperatorError::MissingImage(step.name.clone()));
        }
    }

    if config.completions_needed < 1 {
        return Err(OperatorError::InvalidWorkflow(
            "completions_needed must be >= 1".to_string(),
        ));
    }

    if config.max_size < config.nodes_of_first_step() {
        return Err(OperatorError::InvalidWorkflow(format!(
            "max_size ({}) must be >= nodes of first step ({})",
            config.max_size,
            config.nodes_of_first_step()
        )));
    }

    for (key, specs) in &config.rules {
        for spec in specs {
            validate_rule_spec(key, spec)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_valid_workflow() {
        let yaml = r#"
max_size: 4
completions_needed: 2
jobs:
  - name: A
    image: busybox
    config:
      nnodes: 1
  - name: B
    image: busybox
    config:
      nnodes: 1
"#;
        let file = write_config(yaml);
        let config = load_workflow(file.path()).unwrap();
        assert_eq!(config.step_names(), vec!["A", "B"]);
        assert_eq!(config.prefix, "job_");
    }

    #[test]
    fn rejects_max_size_below_first_step_nodes() {
        let yaml = r#"
max_size: 1
completions_needed: 1
jobs:
  - name: A
    image: busybox
    config:
      nnodes: 4
"#;
        let file = write_config(yaml);
        assert!(load_workflow(file.path()).is_err());
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let yaml = r#"
max_size: 4
completions_needed: 1
jobs:
  - name: A
    image: busybox
    config: { nnodes: 1 }
  - name: A
    image: busybox
    config: { nnodes: 1 }
"#;
        let file = write_config(yaml);
        assert!(load_workflow(file.path()).is_err());
    }

    #[test]
    fn rejects_missing_image() {
        let yaml = r#"
max_size: 4
completions_needed: 1
jobs:
  - name: A
    image: ""
    config: { nnodes: 1 }
"#;
        let file = write_config(yaml);
        let err = load_workflow(file.path()).unwrap_err();
        assert!(matches!(err, OperatorError::MissingImage(_)));
    }

    #[test]
    fn rejects_invalid_rule_action() {
        let yaml = r#"
max_size: 4
completions_needed: 1
jobs:
  - name: A
    image: busybox
    config: { nnodes: 1 }
rules:
  mean.A.duration:
    - action: bogus-action
      metric: duration
"#;
        let file = write_config(yaml);
        assert!(load_workflow(file.path()).is_err());
    }
}
