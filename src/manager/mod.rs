//! WorkflowManager: the single-threaded cooperative control loop
//! (spec §4.5) tying the state machines, rules engine, metrics store,
//! and tracker/watcher adapters together.
//!
//! Grounded on `examples/original_source/.../manager/manager.py`'s
//! `WorkflowManager.init_state`/`new_jobs`/`watch`/`succeed_job`/
//! `fail_job`/`check_complete`.

mod actions;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::error::{OperatorError, OperatorResult};
use crate::metrics::MetricsStore;
use crate::rules::{ActionName, RulesEngine};
use crate::statemachine::{ChangeOutcome, JobStateMachine};
use crate::tracker::{Job, SubmitOutcome, TrackerAdapter};
use crate::watcher::WatcherAdapter;

/// Result of a completed `watch()` run.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub exit_code: i32,
    pub completed: usize,
}

pub struct WorkflowManager {
    config: WorkflowConfig,
    tracker: Arc<dyn TrackerAdapter>,
    watcher: Arc<dyn WatcherAdapter>,
    workdir: PathBuf,
    metrics: MetricsStore,
    rules: RulesEngine,
    machines: HashMap<String, JobStateMachine>,
    completed_ids: HashSet<String>,
    failed_ids: HashSet<String>,
    times: HashMap<String, f64>,
    timestamps: HashMap<String, f64>,
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

impl WorkflowManager {
    pub fn new(
        config: WorkflowConfig,
        tracker: Arc<dyn TrackerAdapter>,
        watcher: Arc<dyn WatcherAdapter>,
        workdir: PathBuf,
    ) -> OperatorResult<Self> {
        let rules = RulesEngine::from_config(&config.rules)?;
        Ok(Self {
            config,
            tracker,
            watcher,
            workdir,
            metrics: MetricsStore::new(),
            rules,
            machines: HashMap::new(),
            completed_ids: HashSet::new(),
            failed_ids: HashSet::new(),
            times: HashMap::new(),
            timestamps: HashMap::new(),
        })
    }

    fn step_names(&self) -> Vec<String> {
        self.config.step_names().into_iter().map(str::to_string).collect()
    }

    /// Reconcile the live table against a fresh snapshot of backend state
    /// (spec §4.5 Reconciliation). Idempotent: running it twice against
    /// an unchanged snapshot produces the same live table.
    pub async fn init_state(&mut self) -> OperatorResult<()> {
        let lists = self.tracker.list_jobs_by_status().await?;
        let last_step = self.config.last_step().to_string();

        let failed_ids: HashSet<String> = lists.failed.iter().map(|j| j.jobid().to_string()).collect();

        let mut completed_ids = HashSet::new();
        for job in &lists.success {
            if job.step_name() == last_step && !failed_ids.contains(job.jobid()) {
                completed_ids.insert(job.jobid().to_string());
            }
        }

        let mut active_steps: HashMap<String, String> = HashMap::new();
        for job in lists.running.iter().chain(lists.queued.iter()) {
            if !completed_ids.contains(job.jobid()) && !failed_ids.contains(job.jobid()) {
                active_steps
                    .entry(job.jobid().to_string())
                    .or_insert_with(|| job.step_name().to_string());
            }
        }

        if !lists.unknown.is_empty() {
            warn!(count = lists.unknown.len(), "jobs with unknown status will not be driven forward");
        }

        // Assigned before the loops below touch self.machines/self.completed_ids/
        // self.failed_ids via apply_change_outcome, so that path's own inserts
        // aren't clobbered by this snapshot afterward.
        self.completed_ids = completed_ids;
        self.failed_ids = failed_ids;

        for (jobid, step) in &active_steps {
            let sm = self
                .machines
                .entry(jobid.clone())
                .or_insert_with(|| JobStateMachine::new(jobid.clone(), self.step_names()));
            sm.mark_running(step);
        }

        for job in &lists.success {
            if job.step_name() != last_step && !self.machines.contains_key(job.jobid()) {
                let mut sm = JobStateMachine::new(job.jobid().to_string(), self.step_names());
                sm.mark_running(job.step_name());
                sm.mark_succeeded(None);
                let outcome = sm.change();
                self.machines.insert(job.jobid().to_string(), sm);
                // Entering the next step means submitting it (spec §4.5); a
                // bare no-op here would leave the machine parked mid-sequence
                // forever, holding an admission slot with nothing to drive it.
                self.apply_change_outcome(job.jobid(), outcome).await?;
            }
        }

        info!(
            active = self.machines.len(),
            completed = self.completed_ids.len(),
            failed = self.failed_ids.len(),
            "reconciled cluster state"
        );
        Ok(())
    }

    fn active_count(&self) -> u32 {
        self.machines.len() as u32
    }

    fn unique_jobid(&self) -> String {
        loop {
            let n: u32 = rand::thread_rng().gen_range(0..100_000_000);
            let candidate = format!("{}{:08}", self.config.prefix, n);
            if !self.machines.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Admit new sequences up to the node budget (spec §4.5 Admission).
    pub async fn new_jobs(&mut self) -> OperatorResult<()> {
        let c = self.config.completions_needed.saturating_sub(self.completed_ids.len() as u32);
        let nodes_first = self.config.nodes_of_first_step().max(1);
        let n = self.config.max_size / nodes_first;
        let submit_n = c.min(n.saturating_sub(self.active_count()));

        for _ in 0..submit_n {
            let jobid = self.unique_jobid();
            let mut sm = JobStateMachine::new(jobid.clone(), self.step_names());
            let outcome = sm.change();
            self.machines.insert(jobid.clone(), sm);
            self.apply_change_outcome(&jobid, outcome).await?;
        }
        if submit_n > 0 {
            info!(count = submit_n, "admitted new sequences");
        }
        Ok(())
    }

    async fn apply_change_outcome(&mut self, jobid: &str, outcome: ChangeOutcome) -> OperatorResult<()> {
        match outcome {
            ChangeOutcome::Submit { step, repeat } => {
                let result = self.tracker.submit(&step, jobid, repeat).await?;
                match result.outcome {
                    SubmitOutcome::Ok | SubmitOutcome::Conflict => {
                        debug!(jobid, step, repeat, "submitted");
                    }
                    SubmitOutcome::Error => {
                        warn!(jobid, step, "submit failed, failing sequence");
                        self.tracker.cleanup(jobid).await?;
                        self.machines.remove(jobid);
                        self.failed_ids.insert(jobid.to_string());
                    }
                }
            }
            ChangeOutcome::Completed => {
                self.completed_ids.insert(jobid.to_string());
                self.machines.remove(jobid);
            }
            ChangeOutcome::AlreadyDone | ChangeOutcome::AlreadyFailed | ChangeOutcome::NoTransition => {}
        }
        Ok(())
    }

    fn workflow_complete(&self) -> bool {
        self.completed_ids.len() as u32 >= self.config.completions_needed
    }

    /// Drive the event stream until the workflow completes (spec §4.5
    /// `watch`), returning the exit outcome.
    pub async fn watch(&mut self) -> OperatorResult<WorkflowOutcome> {
        self.times.insert("workflow_start".to_string(), now_secs());
        self.init_state().await?;
        self.new_jobs().await?;
        if self.workflow_complete() {
            return self.finish().await;
        }

        let mut events = self.tracker.stream_events();
        while let Some(job) = events.next().await {
            if let Some(outcome) = self.handle_event(job.as_ref()).await? {
                return Ok(outcome);
            }
        }
        self.finish().await
    }

    async fn handle_event(&mut self, job: &dyn Job) -> OperatorResult<Option<WorkflowOutcome>> {
        let jobid = job.jobid().to_string();
        if jobid.is_empty() || job.step_name().is_empty() || !self.machines.contains_key(&jobid) {
            return Ok(None);
        }

        let label = job.label();
        self.timestamps.entry(label.clone()).or_insert_with(now_secs);

        if job.is_active() && !job.is_completed() {
            return Ok(None);
        }

        self.update_metrics(job).await?;

        let completed_count = self.completed_ids.len() as u64;
        let repeat_targets = self.rules.fire_repeat_rules(&self.metrics, job.step_name(), completed_count);
        if let Some(sm) = self.machines.get_mut(&jobid) {
            for target in repeat_targets {
                sm.repeat(&target);
            }
        }

        let is_repeating = self.machines.get(&jobid).map(|sm| sm.is_repeating()).unwrap_or(false);

        if job.is_failed() && job.always_succeed() {
            self.succeed_job(&jobid, job).await?;
        } else if job.is_succeeded() {
            self.succeed_job(&jobid, job).await?;
        } else if job.is_failed() {
            self.fail_job(&jobid, job).await?;
        }

        if self.workflow_complete() {
            return Ok(Some(self.finish().await?));
        }

        let completed_count = self.completed_ids.len() as u64;
        let fired = self.rules.fire_workflow_rules(&self.metrics, job.step_name(), completed_count);
        let mut finish_requested = false;
        for action in fired {
            match action.name {
                ActionName::Grow => actions::grow(&mut self.config, &action.step, action.max_size),
                ActionName::Shrink => actions::shrink(&mut self.config, &action.step, action.min_size),
                ActionName::FinishWorkflow => finish_requested = true,
                ActionName::Repeat => {}
            }
        }
        if finish_requested {
            return Ok(Some(self.finish().await?));
        }

        if !is_repeating {
            self.new_jobs().await?;
        }

        Ok(None)
    }

    async fn update_metrics(&mut self, job: &dyn Job) -> OperatorResult<()> {
        let step = job.step_name();
        if job.is_succeeded() || (job.is_failed() && job.always_succeed()) {
            self.metrics.increment_counter("success", Some(step), 1.0);
        } else if job.is_failed() {
            self.metrics.increment_counter("failure", Some(step), 1.0);
        }
        if let Some(duration) = job.duration() {
            self.metrics.add_model_entry("duration", duration, Some(step), None);
        }

        let custom = self.tracker.save_log(job).await.unwrap_or_else(|err| {
            warn!(error = %err, jobid = job.jobid(), "save_log failed, continuing without custom metrics");
            None
        });
        if let Some(sm) = self.machines.get_mut(job.jobid()) {
            sm.post_completion(custom);
            for metrics in sm.drain_metrics() {
                self.metrics.add_custom_metric(&metrics, step);
            }
        }
        Ok(())
    }

    async fn succeed_job(&mut self, jobid: &str, job: &dyn Job) -> OperatorResult<()> {
        self.times.insert(format!("{}_succeeded", job.label()), now_secs());
        let outcome = if let Some(sm) = self.machines.get_mut(jobid) {
            sm.mark_succeeded(None);
            if sm.is_complete() {
                None
            } else {
                Some(sm.change())
            }
        } else {
            None
        };
        if let Some(outcome) = outcome {
            self.apply_change_outcome(jobid, outcome).await?;
        }
        Ok(())
    }

    async fn fail_job(&mut self, jobid: &str, job: &dyn Job) -> OperatorResult<()> {
        self.times.insert(format!("{}_failed", job.label()), now_secs());
        if let Some(sm) = self.machines.get_mut(jobid) {
            sm.mark_failed(None);
        }
        self.tracker.cleanup(jobid).await?;
        self.machines.remove(jobid);
        self.failed_ids.insert(jobid.to_string());
        Ok(())
    }

    async fn finish(&mut self) -> OperatorResult<WorkflowOutcome> {
        self.times.insert("workflow_complete".to_string(), now_secs());
        self.watcher.stop();
        self.watcher.save(&self.workdir).await?;
        self.persist()?;

        println!("=== times\n{}\n===", serde_json::to_string(&self.times).unwrap_or_default());
        println!(
            "=== timestamps\n{}\n===",
            serde_json::to_string(&self.timestamps).unwrap_or_default()
        );
        println!("{}", self.metrics.summarize_all());

        info!(completed = self.completed_ids.len(), "workflow finished");
        Ok(WorkflowOutcome {
            exit_code: 0,
            completed: self.completed_ids.len(),
        })
    }

    fn persist(&self) -> OperatorResult<()> {
        std::fs::create_dir_all(&self.workdir)?;
        let payload = json!({ "times": self.times, "timestamps": self.timestamps });
        let path = self.workdir.join("workflow-times.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&payload).map_err(|e| OperatorError::Internal(e.to_string()))?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::tracker::memory::MemoryTracker;
    use crate::watcher::NoopWatcher;
    use std::collections::HashMap as Map;

    fn config(steps: &[&str], max_size: u32, completions_needed: u32) -> WorkflowConfig {
        use crate::config::{ClusterConfig, StepConfig, StepSpec};
        WorkflowConfig {
            prefix: "job_".to_string(),
            max_size,
            completions_needed,
            jobs: steps
                .iter()
                .map(|name| StepSpec {
                    name: name.to_string(),
                    image: "busybox".to_string(),
                    config: StepConfig {
                        nnodes: 1,
                        cores_per_task: 1,
                        gpus: 0,
                        walltime: None,
                        command: None,
                    },
                    script: None,
                    environment: None,
                    properties: None,
                    registry: None,
                })
                .collect(),
            rules: Map::new(),
            cluster: ClusterConfig::default(),
            filesystem: None,
            registry: None,
        }
    }

    #[tokio::test]
    async fn linear_success_reaches_completion() {
        let cfg = config(&["A", "B"], 1, 1);
        let tracker = Arc::new(MemoryTracker::new());
        let watcher = Arc::new(NoopWatcher);
        let workdir = std::env::temp_dir().join("workflow-operator-test-linear");
        let mut manager = WorkflowManager::new(cfg, tracker.clone(), watcher, workdir).unwrap();

        manager.init_state().await.unwrap();
        manager.new_jobs().await.unwrap();
        assert_eq!(manager.machines.len(), 1);
        let jobid = manager.machines.keys().next().unwrap().clone();

        tracker.resolve(&jobid, true, Some(1.5), false);
        let job = tracker.current(&jobid).unwrap();
        manager.handle_event(job.as_ref()).await.unwrap();
        assert_eq!(manager.machines.len(), 1);

        let jobid_b = manager.machines.keys().next().unwrap().clone();
        tracker.resolve(&jobid_b, true, Some(2.0), false);
        let job_b = tracker.current(&jobid_b).unwrap();
        manager.handle_event(job_b.as_ref()).await.unwrap();

        assert!(manager.workflow_complete());
        assert_eq!(manager.completed_ids.len(), 1);
    }

    #[tokio::test]
    async fn grow_caps_at_action_max_size() {
        let mut raw = Map::new();
        raw.insert(
            "count.A.failure".to_string(),
            vec![crate::config::RuleSpec {
                when: Some(serde_yaml::Value::String(">=1".to_string())),
                action: "grow".to_string(),
                metric: "failure".to_string(),
                repetitions: None,
                backoff: None,
                min_completions: None,
                min_size: None,
                max_size: Some(2),
                disabled: false,
            }],
        );
        let mut cfg = config(&["A", "B"], 4, 10);
        cfg.rules = raw;
        let tracker = Arc::new(MemoryTracker::new());
        let watcher = Arc::new(NoopWatcher);
        let workdir = std::env::temp_dir().join("workflow-operator-test-grow");
        let mut manager = WorkflowManager::new(cfg, tracker.clone(), watcher, workdir).unwrap();

        manager.init_state().await.unwrap();
        manager.new_jobs().await.unwrap();
        let jobid = manager.machines.keys().next().unwrap().clone();
        tracker.resolve(&jobid, false, None, false);
        let job = tracker.current(&jobid).unwrap();
        manager.handle_event(job.as_ref()).await.unwrap();

        assert_eq!(manager.config.step("A").unwrap().config.nnodes, 2);

        manager.new_jobs().await.unwrap();
        let jobid2 = manager.machines.keys().next().unwrap().clone();
        tracker.resolve(&jobid2, false, None, false);
        let job2 = tracker.current(&jobid2).unwrap();
        manager.handle_event(job2.as_ref()).await.unwrap();

        assert_eq!(manager.config.step("A").unwrap().config.nnodes, 2, "grow must not exceed action.maxSize");
    }
}
