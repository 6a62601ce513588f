//! TrackerAdapter: the pluggable backend interface (spec §4.4).
//!
//! A concrete Kubernetes or Flux backend is out of scope (spec Non-goals);
//! this module defines the interface plus one in-memory reference
//! implementation ([`memory::MemoryTracker`]), grounded on
//! `examples/original_source/.../tracker/tracker.py`'s `BaseTracker`/
//! `BaseJob` and the concrete shape in `tracker/kubernetes/job.py`.

pub mod memory;

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::OperatorResult;

/// A single observed job, however the backend represents it.
pub trait Job: Send + Sync + std::fmt::Debug {
    fn jobid(&self) -> &str;
    fn step_name(&self) -> &str;

    /// `"{jobid}_{step_name}"`, the backend object label (spec §6).
    fn label(&self) -> String {
        format!("{}_{}", self.jobid(), self.step_name())
    }

    /// A job allowed to count as succeeded even if the backend reports
    /// failure (opt-in per job via a backend-specific marker).
    fn always_succeed(&self) -> bool {
        false
    }

    fn is_active(&self) -> bool;
    fn is_completed(&self) -> bool;
    fn is_failed(&self) -> bool;
    fn is_succeeded(&self) -> bool;

    /// Wall-clock runtime in seconds, if the backend can report it.
    fn duration(&self) -> Option<f64> {
        None
    }
}

/// Outcome of a submission attempt (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ok,
    /// The backend already has this object; treated as resumed, not failed.
    Conflict,
    Error,
}

#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub outcome: SubmitOutcome,
    pub retcode: i32,
}

/// `list_jobs_by_status`'s partition of every job the backend currently
/// knows about (spec §4.4).
#[derive(Debug, Default)]
pub struct JobStatusLists {
    pub success: Vec<Box<dyn Job>>,
    pub failed: Vec<Box<dyn Job>>,
    pub running: Vec<Box<dyn Job>>,
    pub queued: Vec<Box<dyn Job>>,
    pub unknown: Vec<Box<dyn Job>>,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Box<dyn Job>> + Send>>;

/// The pluggable backend boundary. A backend owns its own connections and
/// polling/watch machinery; the manager only ever calls through this trait.
#[async_trait]
pub trait TrackerAdapter: Send + Sync {
    async fn list_jobs_by_status(&self) -> OperatorResult<JobStatusLists>;

    /// A lazy, never-restartable stream of job status changes.
    fn stream_events(&self) -> EventStream;

    async fn submit(&self, step: &str, jobid: &str, repeat: bool) -> OperatorResult<SubmitResult>;

    async fn cleanup(&self, jobid: &str) -> OperatorResult<()>;

    /// Optional: persist a completed job's log and extract any custom
    /// metrics it recorded.
    async fn save_log(&self, job: &dyn Job) -> OperatorResult<Option<HashMap<String, f64>>> {
        let _ = job;
        Ok(None)
    }
}
