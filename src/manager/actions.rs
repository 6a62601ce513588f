//! Node-count adjustments for the `grow`/`shrink` workflow actions
//! (spec §4.5 Actions). Affects only subsequent submissions for the
//! target step; in-flight jobs are unaffected.

use crate::config::WorkflowConfig;

/// `workflow.step[s].nodes += 1` unless already at or above `max_size`.
///
/// Spec §4.5 states this cap plainly against the rule's own `maxSize`.
/// §9's design notes separately flag a suspected off-by-one in one
/// source variant, checked against the *workflow's* global `max_size`
/// rather than the rule's `maxSize` — that variant freezes nodes one
/// below the ceiling rather than ever reaching it. Resolved in
/// DESIGN.md: spec §4.5 is explicit here, so it governs over the
/// ambiguous source quirk.
pub fn grow(config: &mut WorkflowConfig, step: &str, max_size: Option<u32>) {
    let cap = max_size.unwrap_or(u32::MAX);
    if let Some(step_cfg) = config.step_mut(step) {
        if step_cfg.config.nnodes < cap {
            step_cfg.config.nnodes += 1;
        }
    }
}

/// `-= 1` unless already at or below `max(min_size, 1)`.
pub fn shrink(config: &mut WorkflowConfig, step: &str, min_size: Option<u32>) {
    let floor = min_size.unwrap_or(1).max(1);
    if let Some(step_cfg) = config.step_mut(step) {
        if step_cfg.config.nnodes > floor {
            step_cfg.config.nnodes -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, StepConfig, StepSpec};
    use std::collections::HashMap;

    fn config_with_one_step(nnodes: u32) -> WorkflowConfig {
        WorkflowConfig {
            prefix: "job_".to_string(),
            max_size: 8,
            completions_needed: 1,
            jobs: vec![StepSpec {
                name: "A".to_string(),
                image: "busybox".to_string(),
                config: StepConfig {
                    nnodes,
                    cores_per_task: 1,
                    gpus: 0,
                    walltime: None,
                    command: None,
                },
                script: None,
                environment: None,
                properties: None,
                registry: None,
            }],
            rules: HashMap::new(),
            cluster: ClusterConfig::default(),
            filesystem: None,
            registry: None,
        }
    }

    #[test]
    fn grow_stops_at_cap() {
        let mut cfg = config_with_one_step(2);
        grow(&mut cfg, "A", Some(2));
        assert_eq!(cfg.step("A").unwrap().config.nnodes, 2);
    }

    #[test]
    fn shrink_stops_at_floor() {
        let mut cfg = config_with_one_step(1);
        shrink(&mut cfg, "A", Some(1));
        assert_eq!(cfg.step("A").unwrap().config.nnodes, 1);
    }

    #[test]
    fn shrink_floor_defaults_to_one() {
        let mut cfg = config_with_one_step(1);
        shrink(&mut cfg, "A", None);
        assert_eq!(cfg.step("A").unwrap().config.nnodes, 1);
    }
}
