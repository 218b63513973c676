//! Per-field-path result holders.
//!
//! A [`FieldTask`] is created Pending by the discovery pass, settles exactly once, and never
//! leaves its settled state afterwards:
//!
//! - `Pending -> Fulfilled` on the first successful contribution. Aggregate tasks keep
//!   appending later contributions to the fulfilled sequence.
//! - An aggregate task is *closed* once the list field enclosing all of its occurrences
//!   completes. Only then is its sequence final. Closing a task that saw no contribution
//!   fulfills it with an empty sequence.
//! - `Pending -> Failed` on the first error. A fulfilled task never fails; a late error is
//!   kept as a diagnostic instead.
//! - `Failed` absorbs every further error as a suppressed cause.
//!
//! Consumers wait on [`FieldTask::settled`], which parks a oneshot receiver until the task
//! fails, or until it is fulfilled and (for an aggregate) closed. The state lock is never
//! held across an await.

use std::collections::HashSet;

use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::error::{CompletionRejected, TaskError, TaskFailure};
use crate::types::{FieldPath, Value};

/// Value held by a fulfilled task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskValue {
    Single(Value),
    /// Contributions of an aggregate task, in completion order.
    Aggregate(Vec<Value>),
}

impl TaskValue {
    pub fn into_value(self) -> Value {
        match self {
            TaskValue::Single(value) => value,
            TaskValue::Aggregate(values) => Value::Array(values),
        }
    }
}

/// Observable state of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Fulfilled(TaskValue),
    Failed(TaskFailure),
}

impl TaskState {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskState::Failed(_))
    }
}

/// What a completion did to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Fulfilled,
    Appended,
    Failed,
    /// The error was attached to an already settled task.
    Suppressed,
    /// An aggregate sequence became final.
    Closed,
}

struct TaskInner {
    state: TaskState,
    closed: bool,
    /// Concrete paths that already contributed to an aggregate task.
    contributors: HashSet<FieldPath>,
    /// Late errors reported after a successful fulfillment.
    late_errors: Vec<TaskError>,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Async result holder for the field published at one task key.
pub struct FieldTask {
    key: FieldPath,
    aggregate: bool,
    source_convert: Option<String>,
    closed_by: Option<FieldPath>,
    inner: Mutex<TaskInner>,
}

impl FieldTask {
    pub fn new(key: FieldPath, aggregate: bool) -> Self {
        Self {
            key,
            aggregate,
            source_convert: None,
            closed_by: None,
            inner: Mutex::new(TaskInner {
                state: TaskState::Pending,
                closed: false,
                contributors: HashSet::new(),
                late_errors: Vec::new(),
                waiters: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn with_source_convert(mut self, expression: Option<String>) -> Self {
        self.source_convert = expression;
        self
    }

    /// Task key of the list field whose completion closes this aggregate task.
    #[must_use]
    pub fn with_closed_by(mut self, key: Option<FieldPath>) -> Self {
        self.closed_by = key;
        self
    }

    pub fn key(&self) -> &FieldPath {
        &self.key
    }

    pub fn is_aggregate(&self) -> bool {
        self.aggregate
    }

    pub fn source_convert(&self) -> Option<&str> {
        self.source_convert.as_deref()
    }

    pub fn closed_by(&self) -> Option<&FieldPath> {
        self.closed_by.as_ref()
    }

    /// Whether an aggregate task's sequence is final.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> TaskState {
        self.inner.lock().state.clone()
    }

    /// Errors that arrived after the task was fulfilled.
    pub fn late_errors(&self) -> Vec<TaskError> {
        self.inner.lock().late_errors.clone()
    }

    /// Record a successful value reported by `contributor`.
    ///
    /// Failed tasks ignore the value and report [`Transition::Suppressed`].
    pub fn fulfill(
        &self,
        contributor: &FieldPath,
        value: Value,
    ) -> Result<Transition, CompletionRejected> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state.is_failed() {
            return Ok(Transition::Suppressed);
        }

        if self.aggregate {
            if inner.closed {
                return Err(CompletionRejected::Closed {
                    task: self.key.clone(),
                });
            }
            if !inner.contributors.insert(contributor.clone()) {
                return Err(CompletionRejected::DuplicateContribution {
                    task: self.key.clone(),
                    contributor: contributor.clone(),
                });
            }
            match &mut inner.state {
                TaskState::Fulfilled(TaskValue::Aggregate(values)) => {
                    values.push(value);
                    Ok(Transition::Appended)
                }
                _ => {
                    // waiters stay parked until the task is closed
                    inner.state = TaskState::Fulfilled(TaskValue::Aggregate(vec![value]));
                    Ok(Transition::Fulfilled)
                }
            }
        } else {
            if !inner.state.is_pending() {
                return Err(CompletionRejected::AlreadyFulfilled {
                    task: self.key.clone(),
                });
            }
            inner.state = TaskState::Fulfilled(TaskValue::Single(value));
            Self::wake(inner);
            Ok(Transition::Fulfilled)
        }
    }

    /// Record a failure.
    ///
    /// The first failure of a pending task becomes its cause. Any later error is kept as a
    /// suppressed cause (failed task) or a late error (fulfilled task).
    pub fn fail(&self, error: TaskError) -> Transition {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match &mut inner.state {
            TaskState::Pending => {
                inner.state = TaskState::Failed(TaskFailure::new(error));
                Self::wake(inner);
                Transition::Failed
            }
            TaskState::Failed(failure) => {
                failure.suppressed.push(error);
                Transition::Suppressed
            }
            TaskState::Fulfilled(_) => {
                inner.late_errors.push(error);
                Transition::Suppressed
            }
        }
    }

    /// Mark an aggregate sequence final and release its waiters.
    ///
    /// A task with no contribution yet becomes `Fulfilled` with an empty sequence. Returns
    /// `None` for single tasks, failed tasks and tasks already closed.
    pub fn close(&self) -> Option<Transition> {
        if !self.aggregate {
            return None;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.closed || inner.state.is_failed() {
            return None;
        }

        inner.closed = true;
        let transition = if inner.state.is_pending() {
            inner.state = TaskState::Fulfilled(TaskValue::Aggregate(Vec::new()));
            Transition::Fulfilled
        } else {
            Transition::Closed
        };
        Self::wake(inner);
        Some(transition)
    }

    /// Wait until the task fails, or holds its final value, and return the outcome.
    ///
    /// For an aggregate task the value is every contribution, available once the task
    /// is closed.
    pub async fn settled(&self) -> Result<TaskValue, TaskFailure> {
        loop {
            let receiver = {
                let mut inner = self.inner.lock();
                match &inner.state {
                    TaskState::Fulfilled(value) if inner.closed || !self.aggregate => {
                        return Ok(value.clone())
                    }
                    TaskState::Failed(failure) => return Err(failure.clone()),
                    TaskState::Fulfilled(_) | TaskState::Pending => {}
                }
                let (sender, receiver) = oneshot::channel();
                inner.waiters.push(sender);
                receiver
            };

            // Ignore cancellation - the state is re-read either way
            let _ = receiver.await;
        }
    }

    fn wake(inner: &mut TaskInner) {
        for waiter in inner.waiters.drain(..) {
            // Ignore send errors - the waiting consumer may have been dropped
            let _ = waiter.send(());
        }
    }
}

impl std::fmt::Debug for FieldTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldTask")
            .field("key", &self.key)
            .field("aggregate", &self.aggregate)
            .field("closed_by", &self.closed_by)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}
