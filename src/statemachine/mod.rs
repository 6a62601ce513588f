//! JobStateMachine: the per-sequence state machine over ordered steps.
//!
//! Grounded on `examples/original_source/.../machine/machine.py`'s
//! dynamically-assembled `statemachine.StateMachine` subclass, but modeled
//! per spec §9's design note as a tagged variant (`Start` / `Step(usize)` /
//! `Complete`) with parallel per-step boolean flag vectors, rather than
//! synthesizing a class hierarchy or a `statemachine`-crate state graph at
//! runtime — the set of steps is fixed once a [`JobStateMachine`] is built.

use std::collections::HashMap;

/// Which state the sequence currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateId {
    Start,
    Step(usize),
    Complete,
}

/// The effect `change()` determined should happen on entering the new
/// state. The caller (the manager) is responsible for actually performing
/// IO against a [`crate::tracker::TrackerAdapter`] — this type keeps the
/// state machine itself synchronous and side-effect free.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOutcome {
    /// The target step was already marked successful; nothing to submit.
    AlreadyDone,
    /// The target step was already marked failed; nothing to submit.
    AlreadyFailed,
    /// The machine reached `complete`.
    Completed,
    /// Submit a job for `step`, `repeat` indicating a self-loop re-run.
    Submit { step: String, repeat: bool },
    /// No guard was satisfied (caller invoked `change()` prematurely).
    NoTransition,
}

/// One sequence's state: which step it's on, and per-step success/
/// failure/repeat flags (spec §3 data model).
#[derive(Debug, Clone)]
pub struct JobStateMachine {
    pub jobid: String,
    steps: Vec<String>,
    current: StateId,
    success: Vec<bool>,
    failure: Vec<bool>,
    repeat: Vec<bool>,
    is_complete: bool,
    metrics_buffer: Vec<HashMap<String, f64>>,
}

impl JobStateMachine {
    pub fn new(jobid: impl Into<String>, steps: Vec<String>) -> Self {
        let n = steps.len();
        Self {
            jobid: jobid.into(),
            steps,
            current: StateId::Start,
            success: vec![false; n],
            failure: vec![false; n],
            repeat: vec![false; n],
            is_complete: false,
            metrics_buffer: Vec::new(),
        }
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn current_step_name(&self) -> Option<&str> {
        match self.current {
            StateId::Step(i) => Some(self.steps[i].as_str()),
            _ => None,
        }
    }

    fn index_of(&self, step: &str) -> Option<usize> {
        self.steps.iter().position(|s| s == step)
    }

    fn resolve_index(&self, step: Option<&str>) -> Option<usize> {
        match step {
            Some(s) => self.index_of(s),
            None => match self.current {
                StateId::Step(i) => Some(i),
                _ => None,
            },
        }
    }

    /// Walk steps in order, marking every predecessor of `running_state`
    /// as successful, then place the machine at `running_state`. Used
    /// during reconciliation to fast-forward a rebuilt machine to match
    /// a job already observed running in the backend.
    pub fn mark_running(&mut self, running_state: &str) {
        if let Some(target) = self.index_of(running_state) {
            for i in 0..target {
                self.mark_succeeded(Some(&self.steps[i].clone()));
            }
            self.current = StateId::Step(target);
        }
    }

    /// Sets `sᵢ_success`, unless `sᵢ_repeat` is set, in which case the
    /// mark is suppressed so the self-loop fires instead.
    pub fn mark_succeeded(&mut self, step: Option<&str>) {
        if let Some(i) = self.resolve_index(step) {
            if self.repeat[i] {
                return;
            }
            self.success[i] = true;
        }
    }

    pub fn mark_failed(&mut self, step: Option<&str>) {
        if let Some(i) = self.resolve_index(step) {
            self.failure[i] = true;
        }
    }

    pub fn repeat(&mut self, step: &str) {
        if let Some(i) = self.index_of(step) {
            self.repeat[i] = true;
        }
    }

    pub fn is_repeating(&self) -> bool {
        matches!(self.current, StateId::Step(i) if self.repeat[i])
    }

    pub fn is_running(&self, step: Option<&str>) -> bool {
        match step {
            None => true,
            Some(name) => self.current_step_name() == Some(name),
        }
    }

    pub fn is_failed(&self, step: Option<&str>) -> bool {
        self.resolve_index(step).map(|i| self.failure[i]).unwrap_or(false)
    }

    pub fn is_succeeded(&self, step: Option<&str>) -> bool {
        self.resolve_index(step).map(|i| self.success[i]).unwrap_or(false)
    }

    /// Drive the single `change` event: evaluate guards for the current
    /// state in declaration order (self-loop repeat, then forward
    /// success) and move to the resulting state, invoking `on_change`.
    pub fn change(&mut self) -> ChangeOutcome {
        let next = match self.current {
            StateId::Start => StateId::Step(0),
            StateId::Step(i) => {
                if self.repeat[i] {
                    StateId::Step(i)
                } else if self.success[i] {
                    if i + 1 < self.steps.len() {
                        StateId::Step(i + 1)
                    } else {
                        StateId::Complete
                    }
                } else {
                    return ChangeOutcome::NoTransition;
                }
            }
            StateId::Complete => StateId::Complete,
        };
        self.current = next;
        self.on_enter(next)
    }

    fn on_enter(&mut self, state: StateId) -> ChangeOutcome {
        match state {
            StateId::Step(i) => {
                if self.success[i] {
                    return ChangeOutcome::AlreadyDone;
                }
                if self.failure[i] {
                    return ChangeOutcome::AlreadyFailed;
                }
                let repeating = self.repeat[i];
                if repeating {
                    self.repeat[i] = false;
                }
                ChangeOutcome::Submit {
                    step: self.steps[i].clone(),
                    repeat: repeating,
                }
            }
            StateId::Complete => {
                self.is_complete = true;
                ChangeOutcome::Completed
            }
            StateId::Start => ChangeOutcome::NoTransition,
        }
    }

    /// Buffer custom metrics extracted from a step's completed job (spec
    /// §4.3 `post_completion`). The manager drains this with
    /// [`Self::drain_metrics`] after the step fully resolves.
    pub fn post_completion(&mut self, custom_metrics: Option<HashMap<String, f64>>) {
        if let Some(metrics) = custom_metrics {
            if !metrics.is_empty() {
                self.metrics_buffer.push(metrics);
            }
        }
    }

    pub fn drain_metrics(&mut self) -> Vec<HashMap<String, f64>> {
        std::mem::take(&mut self.metrics_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> JobStateMachine {
        JobStateMachine::new("job_00000001", vec!["A".to_string(), "B".to_string()])
    }

    #[test]
    fn advances_through_steps_on_success() {
        let mut sm = machine();
        assert_eq!(sm.change(), ChangeOutcome::Submit { step: "A".to_string(), repeat: false });
        sm.mark_succeeded(None);
        assert_eq!(sm.change(), ChangeOutcome::Submit { step: "B".to_string(), repeat: false });
        sm.mark_succeeded(None);
        assert_eq!(sm.change(), ChangeOutcome::Completed);
        assert!(sm.is_complete());
    }

    #[test]
    fn repeat_suppresses_success_mark_and_self_loops() {
        let mut sm = machine();
        sm.change();
        sm.repeat("A");
        sm.mark_succeeded(None);
        assert!(!sm.is_succeeded(Some("A")));
        assert_eq!(sm.change(), ChangeOutcome::Submit { step: "A".to_string(), repeat: true });
        assert!(!sm.is_repeating());
    }

    #[test]
    fn mark_running_fast_forwards_predecessors() {
        let mut sm = machine();
        sm.mark_running("B");
        assert!(sm.is_succeeded(Some("A")));
        assert_eq!(sm.current_step_name(), Some("B"));
    }

    #[test]
    fn change_without_satisfied_guard_is_a_no_transition() {
        let mut sm = machine();
        sm.change();
        assert_eq!(sm.change(), ChangeOutcome::NoTransition);
    }
}
