//! Cron registration and firing.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use strmforge_core::RunTrigger;
use strmforge_data::TaskStore;

use crate::engine::TaskEngine;
use crate::error::EngineError;

/// Owns one timer task per scheduled sync job; the task-to-handle map is
/// in-memory only and rebuilt from the registry on startup.
pub struct Scheduler {
    engine: TaskEngine,
    tasks: TaskStore,
    handles: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl Scheduler {
    /// Construct a scheduler over the engine handle.
    #[must_use]
    pub fn new(engine: TaskEngine, tasks: TaskStore) -> Self {
        Self {
            engine,
            tasks,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Register every enabled task that carries a cron expression.
    ///
    /// Tasks with unparsable expressions are skipped with a warning so one
    /// bad row cannot keep the scheduler down.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry cannot be read.
    pub async fn start(&self) -> Result<usize, EngineError> {
        let scheduled = self.tasks.list_scheduled().await?;
        let mut registered = 0;
        for task in scheduled {
            let Some(expression) = task.cron.clone() else {
                continue;
            };
            match self.add(task.id, &expression).await {
                Ok(()) => registered += 1,
                Err(err) => {
                    warn!(task_id = task.id, error = %err, "skipping unschedulable task");
                }
            }
        }
        info!(registered, "scheduler started");
        Ok(registered)
    }

    /// Register (or replace) the firing schedule for one task.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidCron`] when the expression does not
    /// parse.
    pub async fn add(&self, task_id: i64, expression: &str) -> Result<(), EngineError> {
        let schedule = parse_cron(expression)?;
        let engine = self.engine.clone();
        let handle = tokio::spawn(fire_loop(engine, task_id, schedule));

        let mut handles = self.handles.lock().await;
        if let Some(previous) = handles.insert(task_id, handle) {
            previous.abort();
        }
        debug!(task_id, expression, "schedule registered");
        Ok(())
    }

    /// Deregister one task's schedule.
    pub async fn remove(&self, task_id: i64) {
        if let Some(handle) = self.handles.lock().await.remove(&task_id) {
            handle.abort();
            debug!(task_id, "schedule removed");
        }
    }

    /// Re-read one task and atomically swap its schedule registration.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry cannot be read or the new
    /// expression does not parse.
    pub async fn reload(&self, task_id: i64) -> Result<(), EngineError> {
        self.remove(task_id).await;
        let Some(task) = self.tasks.get(task_id).await? else {
            return Ok(());
        };
        if !task.enabled {
            return Ok(());
        }
        match task.cron.as_deref() {
            Some(expression) if !expression.trim().is_empty() => {
                self.add(task_id, expression).await
            }
            _ => Ok(()),
        }
    }

    /// Identifiers currently holding a schedule registration.
    pub async fn entries(&self) -> Vec<i64> {
        let mut entries: Vec<i64> = self.handles.lock().await.keys().copied().collect();
        entries.sort_unstable();
        entries
    }

    /// Validate an expression without registering anything.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidCron`] when the expression does not
    /// parse.
    pub fn validate_expression(expression: &str) -> Result<(), EngineError> {
        parse_cron(expression).map(|_| ())
    }

    /// Abort every timer task.
    pub async fn stop(&self) {
        let mut handles = self.handles.lock().await;
        for (_, handle) in handles.drain() {
            handle.abort();
        }
        info!("scheduler stopped");
    }
}

async fn fire_loop(engine: TaskEngine, task_id: i64, schedule: Schedule) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!(task_id, "schedule has no future firings; loop ends");
            break;
        };
        let wait = (next - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(0));
        tokio::time::sleep(wait).await;

        match engine.trigger(task_id, RunTrigger::Cron).await {
            Ok(()) => {}
            Err(EngineError::AlreadyRunning { .. } | EngineError::AlreadyQueued { .. }) => {
                // No catch-up: a fire that lands on a busy task is dropped.
                debug!(task_id, "cron fire dropped; task busy");
            }
            Err(EngineError::QueueClosed) => break,
            Err(err) => {
                warn!(task_id, error = %err, "cron fire failed");
            }
        }
    }
}

/// Parse a cron expression, accepting the classic 5-field form by
/// normalising it onto the 6-field (with seconds) grammar.
fn parse_cron(expression: &str) -> Result<Schedule, EngineError> {
    let normalized = normalize_cron(expression);
    Schedule::from_str(&normalized).map_err(|err| EngineError::InvalidCron {
        expression: expression.to_string(),
        detail: err.to_string(),
    })
}

fn normalize_cron(expression: &str) -> String {
    let fields = expression.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", expression.trim())
    } else {
        expression.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_expressions_gain_a_seconds_field() {
        assert_eq!(normalize_cron("0 3 * * *"), "0 0 3 * * *");
        assert_eq!(normalize_cron(" */5 * * * * "), "0 */5 * * * *");
        assert_eq!(normalize_cron("0 0 3 * * *"), "0 0 3 * * *");
    }

    #[test]
    fn classic_and_seconds_forms_both_parse() {
        assert!(parse_cron("0 3 * * *").is_ok());
        assert!(parse_cron("*/30 * * * * *").is_ok());
        let error = parse_cron("not a cron").expect_err("junk is rejected");
        assert!(matches!(error, EngineError::InvalidCron { .. }));
    }

    #[test]
    fn parsed_schedules_produce_future_firings() {
        let schedule = parse_cron("0 3 * * *").expect("daily schedule");
        let next = schedule.upcoming(Utc).next().expect("future firing");
        assert!(next > Utc::now());
    }
}
