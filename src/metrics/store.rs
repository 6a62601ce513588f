//! `MetricsStore`: per-(model, step, key) streaming statistics.
//!
//! Grounded on `examples/original_source/.../manager/metrics.py`'s
//! `WorkflowMetrics`: a fixed set of named models (`count`, `mean`,
//! `variance`, `min`, `max`, `iqr`, `mad`), each keyed by step then by
//! metric key, with `"global"` reserved for workflow-wide entries.
#![allow(clippy::unwrap_used)] // entries are inserted just above each unwrap

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use super::estimators::{Count, Iqr, Mad, Max, Mean, Min, Variance};

const MODEL_NAMES: [&str; 6] = ["mean", "variance", "min", "max", "iqr", "mad"];
pub const GLOBAL_STEP: &str = "global";

#[derive(Debug, Clone)]
enum Model {
    Mean(Mean),
    Variance(Variance),
    Min(Min),
    Max(Max),
    Iqr(Iqr),
    Mad(Mad),
}

impl Model {
    fn new(name: &str) -> Self {
        match name {
            "mean" => Model::Mean(Mean::new()),
            "variance" => Model::Variance(Variance::new()),
            "min" => Model::Min(Min::new()),
            "max" => Model::Max(Max::new()),
            "iqr" => Model::Iqr(Iqr::new()),
            "mad" => Model::Mad(Mad::new()),
            other => unreachable!("unknown model name '{other}'"),
        }
    }

    fn update(&mut self, x: f64) {
        match self {
            Model::Mean(m) => m.update(x),
            Model::Variance(m) => m.update(x),
            Model::Min(m) => m.update(x),
            Model::Max(m) => m.update(x),
            Model::Iqr(m) => m.update(x),
            Model::Mad(m) => m.update(x),
        }
    }

    fn get(&self) -> f64 {
        match self {
            Model::Mean(m) => m.get(),
            Model::Variance(m) => m.get(),
            Model::Min(m) => m.get(),
            Model::Max(m) => m.get(),
            Model::Iqr(m) => m.get(),
            Model::Mad(m) => m.get(),
        }
    }
}

/// Streaming statistics for every `(model, step, key)` triple observed so
/// far. A read for a triple that has never been updated returns `None`
/// ("undefined" in rule-evaluation terms), never zero.
#[derive(Debug, Default)]
pub struct MetricsStore {
    counters: HashMap<(String, String), Count>,
    models: HashMap<(String, String, String), Model>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the named counter, scoped to `step` (or `"global"`).
    pub fn increment_counter(&mut self, key: &str, step: Option<&str>, by: f64) {
        let step = step.unwrap_or(GLOBAL_STEP).to_string();
        self.counters
            .entry((step, key.to_string()))
            .or_insert_with(Count::new)
            .update(by);
    }

    /// Record a datum against one model, or every model if `model_name`
    /// is `None` (mirrors `add_model_entry`'s "add to all models" default).
    pub fn add_model_entry(&mut self, key: &str, value: f64, step: Option<&str>, model_name: Option<&str>) {
        let step = step.unwrap_or(GLOBAL_STEP).to_string();
        let names: &[&str] = match model_name {
            Some(name) => std::slice::from_ref(MODEL_NAMES.iter().find(|&&n| n == name).unwrap_or(&"mean")),
            None => &MODEL_NAMES,
        };
        for &name in names {
            self.models
                .entry((name.to_string(), step.clone(), key.to_string()))
                .or_insert_with(|| Model::new(name))
                .update(value);
        }
    }

    /// A custom metric delivered with a job update: recorded against
    /// every streaming model *and* accumulated into a like-named counter
    /// (spec §4.2's `add_custom_metric`).
    pub fn add_custom_metric(&mut self, metrics: &HashMap<String, f64>, step: &str) {
        for (metric_name, &metric_value) in metrics {
            self.add_model_entry(metric_name, metric_value, Some(step), None);
            self.increment_counter(metric_name, Some(step), metric_value);
        }
    }

    /// Look up a single model's current value, or `None` if the triple
    /// has never received a datum.
    pub fn get(&self, model: &str, step: &str, key: &str) -> Option<f64> {
        if model == "count" {
            return self
                .counters
                .get(&(step.to_string(), key.to_string()))
                .map(|c| c.get());
        }
        self.models
            .get(&(model.to_string(), step.to_string(), key.to_string()))
            .map(|m| m.get())
    }

    /// Render every tracked model as nested JSON: `{model: {step: {key: value}}}`.
    pub fn summarize_all(&self) -> JsonValue {
        let mut out = serde_json::Map::new();
        for ((step, key), counter) in &self.counters {
            out.entry("count".to_string())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()))
                .as_object_mut()
                .unwrap()
                .entry(step.clone())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()))
                .as_object_mut()
                .unwrap()
                .insert(key.clone(), round3(counter.get()).into());
        }
        for ((model, step, key), value) in &self.models {
            out.entry(model.clone())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()))
                .as_object_mut()
                .unwrap()
                .entry(step.clone())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()))
                .as_object_mut()
                .unwrap()
                .insert(key.clone(), round3(value.get()).into());
        }
        JsonValue::Object(out)
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_as_none() {
        let store = MetricsStore::new();
        assert_eq!(store.get("mean", "A", "duration"), None);
    }

    #[test]
    fn counter_increments_per_step() {
        let mut store = MetricsStore::new();
        store.increment_counter("success", Some("A"), 1.0);
        store.increment_counter("success", Some("A"), 1.0);
        assert_eq!(store.get("count", "A", "success"), Some(2.0));
        assert_eq!(store.get("count", "B", "success"), None);
    }

    #[test]
    fn model_entry_updates_single_named_model() {
        let mut store = MetricsStore::new();
        store.add_model_entry("duration", 10.0, Some("A"), Some("mean"));
        assert_eq!(store.get("mean", "A", "duration"), Some(10.0));
        assert_eq!(store.get("variance", "A", "duration"), None);
    }

    #[test]
    fn global_step_defaults_when_absent() {
        let mut store = MetricsStore::new();
        store.increment_counter("restarts", None, 1.0);
        assert_eq!(store.get("count", GLOBAL_STEP, "restarts"), Some(1.0));
    }
}
