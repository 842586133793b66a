//! Webhook fan-out: file-change and mount-change events map onto tasks by
//! source-path prefix.

use tracing::{debug, warn};

use strmforge_core::{FileChangeEvent, RunTrigger, Task};
use strmforge_data::TaskStore;

use crate::engine::TaskEngine;
use crate::error::EngineError;

/// Dispatches externally delivered change events into the executor.
pub struct WebhookDispatcher {
    engine: TaskEngine,
    tasks: TaskStore,
}

impl WebhookDispatcher {
    /// Construct a dispatcher over the engine handle.
    #[must_use]
    pub const fn new(engine: TaskEngine, tasks: TaskStore) -> Self {
        Self { engine, tasks }
    }

    /// Route each file-change event to every enabled task whose source path
    /// prefixes the event path; returns how many deliveries were queued.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry cannot be read.
    pub async fn dispatch_file_changes(
        &self,
        events: &[FileChangeEvent],
    ) -> Result<usize, EngineError> {
        let tasks = self.tasks.list().await?;
        let mut queued = 0;
        for event in events {
            for task in tasks.iter().filter(|task| matches(task, &event.source_path)) {
                match self.engine.trigger_event(task.id, event.clone()).await {
                    Ok(()) => queued += 1,
                    Err(err) => {
                        warn!(task_id = task.id, error = %err, "file-change dispatch failed");
                    }
                }
            }
        }
        debug!(events = events.len(), queued, "file-change webhook dispatched");
        Ok(queued)
    }

    /// Trigger a full run of every enabled task under a remounted path;
    /// busy tasks are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry cannot be read.
    pub async fn dispatch_mount_change(&self, path: &str) -> Result<usize, EngineError> {
        let tasks = self.tasks.list().await?;
        let mut queued = 0;
        for task in tasks.iter().filter(|task| matches(task, path) || prefix_of(path, &task.source_path)) {
            match self.engine.trigger(task.id, RunTrigger::Webhook).await {
                Ok(()) => queued += 1,
                Err(
                    EngineError::AlreadyRunning { .. } | EngineError::AlreadyQueued { .. },
                ) => {
                    debug!(task_id = task.id, "mount-change run dropped; task busy");
                }
                Err(err) => {
                    warn!(task_id = task.id, error = %err, "mount-change dispatch failed");
                }
            }
        }
        Ok(queued)
    }
}

fn matches(task: &Task, event_path: &str) -> bool {
    task.enabled && prefix_of(&task.source_path, event_path)
}

// Segment-aware prefix: "/movies" covers "/movies" and "/movies/..", never
// "/movies2".
fn prefix_of(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_respect_segment_boundaries() {
        assert!(prefix_of("/movies", "/movies"));
        assert!(prefix_of("/movies", "/movies/sub"));
        assert!(!prefix_of("/movies", "/movies2"));
        assert!(!prefix_of("/movies", "/tv/movies"));
        assert!(prefix_of("/", "/anything"));
    }
}
