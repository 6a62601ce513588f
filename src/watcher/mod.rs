//! WatcherAdapter: optional side-channel cluster topology observer
//! (spec §4.6), grounded on `examples/original_source/.../tracker/watcher.py`'s
//! no-op base `Watcher`.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::OperatorResult;

/// A background observer of cluster topology (e.g. node add/remove
/// events with timestamps). `start`/`stop` bracket a backend's own
/// background thread or task; `save` flushes to disk; `results` returns
/// a snapshot for inclusion in the final summary.
#[async_trait]
pub trait WatcherAdapter: Send + Sync {
    fn start(&self);
    fn stop(&self);
    async fn save(&self, outdir: &Path) -> OperatorResult<()>;
    fn results(&self) -> JsonValue;
}

/// The default watcher for any backend that doesn't supply its own.
#[derive(Debug, Default)]
pub struct NoopWatcher;

#[async_trait]
impl WatcherAdapter for NoopWatcher {
    fn start(&self) {}
    fn stop(&self) {}
    async fn save(&self, _outdir: &Path) -> OperatorResult<()> {
        Ok(())
    }
    fn results(&self) -> JsonValue {
        JsonValue::Object(serde_json::Map::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_watcher_is_inert() {
        let watcher = NoopWatcher;
        watcher.start();
        watcher.stop();
        assert!(watcher.save(Path::new("/tmp")).await.is_ok());
        assert_eq!(watcher.results(), JsonValue::Object(serde_json::Map::new()));
    }
}
