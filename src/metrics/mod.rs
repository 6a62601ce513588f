//! Streaming metrics: per-step counters and statistical models driving
//! the rules engine (spec §4.2).

mod estimators;
mod store;

pub use store::{MetricsStore, GLOBAL_STEP};
