//! RulesEngine: threshold predicates over streaming metrics, rate-limited
//! by repetitions and backoff, that fire workflow actions (spec §4.1).
//!
//! Grounded on `examples/original_source/.../config/types.py`'s `Rule` and
//! `Action` classes; `when` is parsed once at load into [`When`] per the
//! design note in spec §9 rather than re-parsed on every evaluation.

mod action;
mod rule;

pub use action::{Action, ActionName};
pub use rule::{Rule, When};

use crate::config::RuleSpec;
use crate::error::{OperatorError, OperatorResult};
use crate::metrics::MetricsStore;

/// A workflow action resolved and ready to apply, with its target step
/// (the step component of the rule's `"<model>.<step>.<key>"` key).
#[derive(Debug, Clone)]
pub struct FiredAction {
    pub step: String,
    pub name: ActionName,
    pub min_completions: Option<u64>,
    pub min_size: Option<u32>,
    pub max_size: Option<u32>,
}

/// Validate a single rule entry at config-load time (spec §4.1 Validation).
/// `key` is the full `"<model>.<step>.<key>"` string for error messages.
pub fn validate_rule_spec(key: &str, spec: &RuleSpec) -> OperatorResult<()> {
    ActionName::parse(&spec.action).ok_or_else(|| OperatorError::InvalidRule {
        key: key.to_string(),
        reason: format!("unknown action '{}'", spec.action),
    })?;
    When::parse(spec.when.as_ref()).map_err(|reason| OperatorError::InvalidRule {
        key: key.to_string(),
        reason,
    })?;
    Ok(())
}

fn split_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.splitn(3, '.');
    let model = parts.next()?;
    let step = parts.next()?;
    let metric_key = parts.next()?;
    Some((model, step, metric_key))
}

/// The loaded collection of rules, keyed internally by `(model, step, metric_key)`.
#[derive(Debug, Default)]
pub struct RulesEngine {
    rules: Vec<Rule>,
}

impl RulesEngine {
    pub fn from_config(
        raw: &std::collections::HashMap<String, Vec<RuleSpec>>,
    ) -> OperatorResult<Self> {
        let mut rules = Vec::new();
        for (key, specs) in raw {
            let (model, step, metric_key) = split_key(key).ok_or_else(|| OperatorError::InvalidRule {
                key: key.clone(),
                reason: "expected \"<model>.<step>.<key>\"".to_string(),
            })?;
            for spec in specs {
                validate_rule_spec(key, spec)?;
                rules.push(Rule::from_spec(model, step, metric_key, spec));
            }
        }
        Ok(Self { rules })
    }

    /// Evaluate state-machine-scoped rules (currently only `repeat`) for
    /// `step`, returning the target steps to mark as repeating. Must run
    /// *before* the step's success/failure transition is applied (spec §5
    /// ordering guarantee). `completed_count` gates any rule specifying
    /// `minCompletions`; a gated rule is skipped before its rate limiter
    /// is even consulted, so being gated never consumes a repetition.
    pub fn fire_repeat_rules(&mut self, metrics: &MetricsStore, step: &str, completed_count: u64) -> Vec<String> {
        let mut fired = Vec::new();
        for rule in self.rules.iter_mut().filter(|r| r.scoped_to(step)) {
            if rule.action.name != ActionName::Repeat || rule.gated_by_completions(completed_count) {
                continue;
            }
            let value = metrics.get(&rule.model, &rule.step, &rule.metric_key);
            if rule.should_trigger(value) {
                fired.push(rule.step.clone());
            }
        }
        fired
    }

    /// Evaluate workflow-scoped rules (`grow`, `shrink`, `finish-workflow`)
    /// for `step`. Must run *after* the transition this event committed.
    pub fn fire_workflow_rules(&mut self, metrics: &MetricsStore, step: &str, completed_count: u64) -> Vec<FiredAction> {
        let mut fired = Vec::new();
        for rule in self.rules.iter_mut().filter(|r| r.scoped_to(step)) {
            if rule.action.name == ActionName::Repeat || rule.gated_by_completions(completed_count) {
                continue;
            }
            let value = metrics.get(&rule.model, &rule.step, &rule.metric_key);
            if rule.should_trigger(value) {
                fired.push(FiredAction {
                    step: rule.step.clone(),
                    name: rule.action.name,
                    min_completions: rule.action.min_completions,
                    min_size: rule.action.min_size,
                    max_size: rule.action.max_size,
                });
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSpec;

    fn spec(action: &str, when: Option<&str>, repetitions: Option<i64>, backoff: Option<i64>) -> RuleSpec {
        RuleSpec {
            when: when.map(|w| serde_yaml::Value::String(w.to_string())),
            action: action.to_string(),
            metric: "duration".to_string(),
            repetitions,
            backoff,
            min_completions: None,
            min_size: None,
            max_size: None,
            disabled: false,
        }
    }

    #[test]
    fn repeat_rule_fires_once_then_suppressed() {
        let mut raw = std::collections::HashMap::new();
        raw.insert(
            "mean.A.duration".to_string(),
            vec![spec("repeat", Some(">5"), Some(1), None)],
        );
        let mut engine = RulesEngine::from_config(&raw).unwrap();
        let mut metrics = MetricsStore::new();
        metrics.add_model_entry("duration", 10.0, Some("A"), None);
        assert_eq!(engine.fire_repeat_rules(&metrics, "A", 0), vec!["A".to_string()]);

        let mut metrics2 = MetricsStore::new();
        metrics2.add_model_entry("duration", 10.0, Some("A"), None);
        assert!(engine.fire_repeat_rules(&metrics2, "A", 0).is_empty());
    }

    #[test]
    fn grow_rule_fires_on_threshold() {
        let mut raw = std::collections::HashMap::new();
        raw.insert(
            "count.A.failure".to_string(),
            vec![spec("grow", Some(">=2"), None, None)],
        );
        let mut engine = RulesEngine::from_config(&raw).unwrap();
        let mut metrics = MetricsStore::new();
        metrics.increment_counter("failure", Some("A"), 2);
        let fired = engine.fire_workflow_rules(&metrics, "A", 0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].name, ActionName::Grow);
    }
}
