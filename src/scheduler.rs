//! Completion hook: turns field completion into task settlement.
//!
//! The hook only records state transitions. It never waits on anything and never resolves
//! other fields' dependencies; consumers parked in [`FieldTask::settled`] are woken by the
//! transition itself.
//!
//! Hosts must report a field complete only after every field beneath it: completing a list
//! field closes the aggregate tasks of the fields under it, and a closed aggregate takes no
//! further contributions.
//!
//! [`FieldTask::settled`]: crate::FieldTask::settled

use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::{trace, warn};

use crate::config::EngineConfig;
use crate::error::{FieldError, TaskError};
use crate::registry::DependencyRegistry;
use crate::task::{FieldTask, Transition};
use crate::transform::TransformApplicator;
use crate::types::{FieldPath, Value};

/// Settles tasks as their publishing fields complete.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    config: Arc<EngineConfig>,
}

impl TaskScheduler {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Report that the field occurrence at `path` finished with `result`.
    ///
    /// Aggregate tasks closed by the field are closed first. Returns the transition of the
    /// field's own task: `None` when no task is registered for the path or when the
    /// completion was rejected as a duplicate write.
    pub fn on_field_completed(
        &self,
        registry: &DependencyRegistry,
        path: &FieldPath,
        result: Result<Value, FieldError>,
    ) -> Option<Transition> {
        for enclosed in registry.tasks_closed_by(&path.task_key()) {
            let _closed = enclosed.close();

            #[cfg(feature = "tracing")]
            trace!(task = %enclosed.key(), closer = %path, transition = ?_closed, "aggregate closed");
        }

        let task = registry.task_for(path)?;

        let transition = match result {
            Err(error) => task.fail(TaskError::Field {
                path: path.clone(),
                message: error.message,
            }),
            Ok(Value::Null) => task.fail(TaskError::EmptyResult { path: path.clone() }),
            Ok(value) => self.publish(&task, path, value)?,
        };

        #[cfg(feature = "tracing")]
        trace!(task = %task.key(), path = %path, ?transition, "field completion recorded");

        Some(transition)
    }

    fn publish(&self, task: &FieldTask, path: &FieldPath, value: Value) -> Option<Transition> {
        if task.state().is_failed() {
            return Some(Transition::Suppressed);
        }

        let value = match task.source_convert() {
            Some(expression) => {
                let result_name = path.result_name().unwrap_or_default();
                match TransformApplicator::new(&self.config).convert_source(
                    expression,
                    result_name,
                    value,
                ) {
                    Ok(converted) => converted,
                    Err(source) => {
                        return Some(task.fail(TaskError::SourceConvert {
                            path: path.clone(),
                            source,
                        }))
                    }
                }
            }
            None => value,
        };

        match task.fulfill(path, value) {
            Ok(transition) => Some(transition),
            Err(_rejected) => {
                #[cfg(feature = "tracing")]
                warn!(error = %_rejected, "ignoring repeated field completion");
                None
            }
        }
    }
}
