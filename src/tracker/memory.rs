//! In-memory reference `TrackerAdapter`.
//!
//! Serves as both the "one reference adapter" spec §4.4 asks for and the
//! seam manager integration tests submit jobs against — there is no real
//! scheduler behind it, submissions complete immediately and tests (or a
//! demo harness) drive completion explicitly via [`MemoryTracker::resolve`].
#![allow(clippy::expect_used)] // stream_events has a single legitimate caller

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use super::{EventStream, Job, JobStatusLists, SubmitOutcome, SubmitResult, TrackerAdapter};
use crate::error::OperatorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
struct MemoryJob {
    jobid: String,
    step_name: String,
    status: Status,
    always_succeed: bool,
    duration: Option<f64>,
}

impl Job for MemoryJob {
    fn jobid(&self) -> &str {
        &self.jobid
    }

    fn step_name(&self) -> &str {
        &self.step_name
    }

    fn always_succeed(&self) -> bool {
        self.always_succeed
    }

    fn is_active(&self) -> bool {
        matches!(self.status, Status::Running | Status::Queued)
    }

    fn is_completed(&self) -> bool {
        matches!(self.status, Status::Succeeded | Status::Failed)
    }

    fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    fn is_succeeded(&self) -> bool {
        self.status == Status::Succeeded
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }
}

/// Reference `TrackerAdapter`: every submission transitions straight to
/// `Running`, and tests resolve it to `Succeeded`/`Failed` with
/// [`Self::resolve`], which both updates the stored status and emits the
/// corresponding event on `stream_events`.
pub struct MemoryTracker {
    jobs: Mutex<HashMap<String, MemoryJob>>,
    cleaned_up: Mutex<HashSet<String>>,
    events_tx: mpsc::UnboundedSender<Box<dyn Job>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Box<dyn Job>>>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            jobs: Mutex::new(HashMap::new()),
            cleaned_up: Mutex::new(HashSet::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Mark `jobid`'s current job as succeeded or failed and publish the
    /// resulting event. `always_succeed` lets tests exercise the
    /// failure-is-treated-as-success path (spec §4.5 event loop step 7).
    pub fn resolve(&self, jobid: &str, succeeded: bool, duration: Option<f64>, always_succeed: bool) {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get_mut(jobid) {
            job.status = if succeeded { Status::Succeeded } else { Status::Failed };
            job.duration = duration;
            job.always_succeed = always_succeed;
            let _ = self.events_tx.send(Box::new(job.clone()));
        }
    }

    pub fn was_cleaned_up(&self, jobid: &str) -> bool {
        self.cleaned_up.lock().contains(jobid)
    }

    /// Snapshot the current stored record for `jobid`, for tests that
    /// need a `&dyn Job` to hand to the manager without waiting on the
    /// event stream.
    pub fn current(&self, jobid: &str) -> Option<Box<dyn Job>> {
        self.jobs.lock().get(jobid).map(|j| Box::new(j.clone()) as Box<dyn Job>)
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackerAdapter for MemoryTracker {
    async fn list_jobs_by_status(&self) -> OperatorResult<JobStatusLists> {
        let jobs = self.jobs.lock();
        let mut lists = JobStatusLists::default();
        for job in jobs.values() {
            let boxed: Box<dyn Job> = Box::new(job.clone());
            match job.status {
                Status::Succeeded => lists.success.push(boxed),
                Status::Failed => lists.failed.push(boxed),
                Status::Running => lists.running.push(boxed),
                Status::Queued => lists.queued.push(boxed),
            }
        }
        Ok(lists)
    }

    fn stream_events(&self) -> EventStream {
        let rx = self
            .events_rx
            .lock()
            .take()
            .expect("stream_events called more than once");
        Box::pin(UnboundedReceiverStream::new(rx).map(|job| job))
    }

    async fn submit(&self, step: &str, jobid: &str, repeat: bool) -> OperatorResult<SubmitResult> {
        let mut jobs = self.jobs.lock();
        if !repeat {
            if let Some(existing) = jobs.get(jobid) {
                if existing.is_active() {
                    return Ok(SubmitResult {
                        outcome: SubmitOutcome::Conflict,
                        retcode: 0,
                    });
                }
            }
        }
        jobs.insert(
            jobid.to_string(),
            MemoryJob {
                jobid: jobid.to_string(),
                step_name: step.to_string(),
                status: Status::Running,
                always_succeed: false,
                duration: None,
            },
        );
        Ok(SubmitResult {
            outcome: SubmitOutcome::Ok,
            retcode: 0,
        })
    }

    async fn cleanup(&self, jobid: &str) -> OperatorResult<()> {
        self.jobs.lock().remove(jobid);
        self.cleaned_up.lock().insert(jobid.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_then_resolve_reflects_in_status_lists() {
        let tracker = MemoryTracker::new();
        tracker.submit("A", "job_00000001", false).await.unwrap();
        let lists = tracker.list_jobs_by_status().await.unwrap();
        assert_eq!(lists.running.len(), 1);

        tracker.resolve("job_00000001", true, Some(4.2), false);
        let lists = tracker.list_jobs_by_status().await.unwrap();
        assert_eq!(lists.success.len(), 1);
        assert_eq!(lists.success[0].duration(), Some(4.2));
    }

    #[tokio::test]
    async fn repeated_submission_without_repeat_flag_conflicts() {
        let tracker = MemoryTracker::new();
        tracker.submit("A", "job_00000001", false).await.unwrap();
        let result = tracker.submit("A", "job_00000001", false).await.unwrap();
        assert_eq!(result.outcome, SubmitOutcome::Conflict);
    }

    #[tokio::test]
    async fn cleanup_removes_job_and_is_observable() {
        let tracker = MemoryTracker::new();
        tracker.submit("A", "job_00000001", false).await.unwrap();
        tracker.cleanup("job_00000001").await.unwrap();
        assert!(tracker.was_cleaned_up("job_00000001"));
        let lists = tracker.list_jobs_by_status().await.unwrap();
        assert_eq!(lists.running.len(), 0);
    }
}
