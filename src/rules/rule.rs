//! `Rule`: a `when` predicate coupled to a rate-limited [`super::Action`].
#![allow(clippy::unwrap_used, clippy::expect_used)] // regex is a fixed literal; from_spec requires load-time validation first

use once_cell::sync::Lazy;
use regex::Regex;

use super::action::{Action, ActionName};
use crate::config::RuleSpec;

static COMPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(<=|>=|<|>|==|=)\s*(-?\d+(?:\.\d+)?)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CmpOp {
    fn apply(self, value: f64, threshold: f64) -> bool {
        match self {
            CmpOp::Lt => value < threshold,
            CmpOp::Le => value <= threshold,
            CmpOp::Gt => value > threshold,
            CmpOp::Ge => value >= threshold,
            CmpOp::Eq => value == threshold,
        }
    }
}

/// The parsed form of a rule's `when` field (spec §4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum When {
    /// `when` absent: the predicate is always true.
    Always,
    /// `when` is a bare number: true only if the value equals it exactly.
    Equals(f64),
    /// `when: "undefined"`: true only if the metric has no value yet.
    Undefined,
    /// `when: "<op><number>"`, e.g. `">5"`, `"<=0.2"`.
    Cmp(CmpOp, f64),
}

impl When {
    pub fn parse(raw: Option<&serde_yaml::Value>) -> Result<Self, String> {
        let value = match raw {
            None => return Ok(When::Always),
            Some(v) => v,
        };
        if let Some(n) = value.as_f64() {
            return Ok(When::Equals(n));
        }
        if let Some(n) = value.as_i64() {
            return Ok(When::Equals(n as f64));
        }
        if let Some(s) = value.as_str() {
            if s == "undefined" {
                return Ok(When::Undefined);
            }
            let caps = COMPARATOR
                .captures(s.trim())
                .ok_or_else(|| format!("'{}' is not a number, \"undefined\", or a comparator", s))?;
            let op = match &caps[1] {
                "<" => CmpOp::Lt,
                "<=" => CmpOp::Le,
                ">" => CmpOp::Gt,
                ">=" => CmpOp::Ge,
                "=" | "==" => CmpOp::Eq,
                other => return Err(format!("unknown comparator '{}'", other)),
            };
            let threshold: f64 = caps[2]
                .parse()
                .map_err(|_| format!("'{}' has an unparseable threshold", s))?;
            return Ok(When::Cmp(op, threshold));
        }
        Err("when must be a number, \"undefined\", or a comparator string".to_string())
    }

    /// Evaluate the predicate against a metric value that may not yet
    /// exist (spec §4.1 step 3).
    fn resolve(&self, value: Option<f64>) -> bool {
        match (self, value) {
            (When::Always, _) => true,
            (When::Undefined, None) => true,
            (_, None) => false,
            (When::Equals(expected), Some(v)) => v == *expected,
            (When::Cmp(op, threshold), Some(v)) => op.apply(v, *threshold),
            (When::Undefined, Some(_)) => false,
        }
    }
}

/// One rule: `when` predicate plus rate-limited action, scoped to a
/// `(model, step, metric_key)` triple parsed from its config map key.
#[derive(Debug)]
pub struct Rule {
    pub model: String,
    pub step: String,
    pub metric_key: String,
    when: When,
    pub action: Action,
    disabled: bool,
}

impl Rule {
    pub fn from_spec(model: &str, step: &str, metric_key: &str, spec: &RuleSpec) -> Self {
        let name = ActionName::parse(&spec.action).expect("validated at load time");
        let when = When::parse(spec.when.as_ref()).expect("validated at load time");
        Self {
            model: model.to_string(),
            step: step.to_string(),
            metric_key: metric_key.to_string(),
            when,
            action: Action::from_spec(spec, name),
            disabled: spec.disabled,
        }
    }

    pub fn scoped_to(&self, step: &str) -> bool {
        self.step == step || self.step == "global"
    }

    /// True if this rule specifies `minCompletions` and the workflow
    /// hasn't reached it yet — the rule is skipped entirely, so gating
    /// never consumes a repetition or advances a backoff cooldown.
    pub fn gated_by_completions(&self, completed_count: u64) -> bool {
        self.action.min_completions.is_some_and(|min| completed_count < min)
    }

    /// Evaluation order (spec §4.1, authoritative):
    /// 1. exhausted repetitions -> false
    /// 2. active backoff cooldown -> false (consumes one evaluation)
    /// 3. resolve the `when` predicate against `value`
    /// 4. if true, commit the firing (consume a repetition, re-arm backoff)
    pub fn should_trigger(&mut self, value: Option<f64>) -> bool {
        if self.disabled {
            return false;
        }
        if !self.action.should_trigger() {
            return false;
        }
        if self.when.resolve(value) {
            self.action.perform();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comparators() {
        assert_eq!(
            When::parse(Some(&serde_yaml::Value::String(">5".into()))).unwrap(),
            When::Cmp(CmpOp::Gt, 5.0)
        );
        assert_eq!(
            When::parse(Some(&serde_yaml::Value::String("<=0.2".into()))).unwrap(),
            When::Cmp(CmpOp::Le, 0.2)
        );
        assert!(When::parse(Some(&serde_yaml::Value::String("weird".into()))).is_err());
    }

    #[test]
    fn undefined_only_matches_missing_value() {
        let when = When::Undefined;
        assert!(when.resolve(None));
        assert!(!when.resolve(Some(1.0)));
    }

    #[test]
    fn numeric_when_requires_present_value() {
        let when = When::Equals(3.0);
        assert!(!when.resolve(None));
        assert!(!when.resolve(Some(4.0)));
        assert!(when.resolve(Some(3.0)));
    }
}
