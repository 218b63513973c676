//! Error types for dependency scheduling.
//!
//! This module defines the errors that can occur while validating dependency declarations,
//! settling tasks, evaluating expressions and configuring the engine.
//!
//! Task-level failures ([`TaskError`], [`TaskFailure`]) are recorded inside the registry and
//! never thrown across a hook boundary. A dependent field observes them as data through
//! [`DependencyFailure`].

use std::fmt;

use thiserror::Error;

use crate::types::{FieldPath, NodeName, SourceLocation};

/// Primary or suppressed cause of a task failure.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TaskError {
    /// The publishing field itself failed.
    #[error("field '{path}' failed: {message}")]
    Field { path: FieldPath, message: String },

    /// The publishing field completed without a value.
    #[error("empty result for '{path}'")]
    EmptyResult { path: FieldPath },

    /// The `sourceConvert` expression of the publishing directive could not be evaluated.
    #[error("source conversion for '{path}' failed: {source}")]
    SourceConvert {
        path: FieldPath,
        #[source]
        source: EvaluationError,
    },

    /// A consumer joined on a node that no field publishes.
    #[error("node '{node}' has no publishing field")]
    UnknownNode { node: NodeName },
}

/// A settled failure: the first cause plus every error reported after it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub(crate) cause: TaskError,
    pub(crate) suppressed: Vec<TaskError>,
}

impl TaskFailure {
    pub(crate) fn new(cause: TaskError) -> Self {
        Self {
            cause,
            suppressed: Vec::new(),
        }
    }

    /// The error that first failed the task.
    pub fn cause(&self) -> &TaskError {
        &self.cause
    }

    /// Errors reported after the task had already settled, in arrival order.
    pub fn suppressed(&self) -> &[TaskError] {
        &self.suppressed
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Short-circuit reason for a field whose dependency failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("dependency '{node}' failed: {failure}")]
pub struct DependencyFailure {
    pub node: NodeName,
    pub failure: TaskFailure,
}

/// Rejected write to a task that can no longer accept it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionRejected {
    #[error("task '{task}' already holds a value")]
    AlreadyFulfilled { task: FieldPath },

    #[error("'{contributor}' already contributed to aggregate task '{task}'")]
    DuplicateContribution {
        task: FieldPath,
        contributor: FieldPath,
    },

    #[error("aggregate task '{task}' is closed")]
    Closed { task: FieldPath },
}

/// Static errors in the dependency declarations of a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("'{argument}' is not defined on '{field}'@{location}.")]
    UndeclaredArgument {
        field: String,
        argument: String,
        location: SourceLocation,
    },

    #[error("the node '{node}' used by '{field}'@{location} does not exist.")]
    UnknownNode {
        field: String,
        node: NodeName,
        location: SourceLocation,
    },

    #[error(
        "node must not be linked to the same argument: '{argument}', \
         @link defined on '{field}'@{location} is invalid."
    )]
    DuplicateArgumentBinding {
        field: String,
        argument: String,
        location: SourceLocation,
    },

    #[error("dependency cycle through '{field}'@{location}: {}", display_cycle(.cycle))]
    DependencyCycle {
        field: String,
        cycle: Vec<NodeName>,
        location: SourceLocation,
    },
}

fn display_cycle(cycle: &[NodeName]) -> String {
    cycle
        .iter()
        .map(NodeName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ValidationError {
    pub fn location(&self) -> SourceLocation {
        match self {
            ValidationError::UndeclaredArgument { location, .. }
            | ValidationError::UnknownNode { location, .. }
            | ValidationError::DuplicateArgumentBinding { location, .. }
            | ValidationError::DependencyCycle { location, .. } => *location,
        }
    }
}

/// Every validation error found in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", display_all(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn display_all(errors: &[ValidationError]) -> String {
    let details = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "query has {} invalid dependency declaration(s): {details}",
        errors.len()
    )
}

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }
}

/// Errors raised by an [`Evaluator`](crate::Evaluator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EvaluationError {
    #[error("malformed expression '{expression}': {reason}")]
    Malformed { expression: String, reason: String },

    #[error("expression '{expression}' references missing binding '{name}'")]
    MissingBinding { expression: String, name: String },

    #[error("expression '{expression}' expected {expected}")]
    TypeMismatch {
        expression: String,
        expected: &'static str,
    },

    #[error("expression '{expression}' failed: {message}")]
    Failed { expression: String, message: String },
}

/// Field-level failure reported by, or to, the host engine.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct FieldError {
    pub message: String,
    pub path: Option<FieldPath>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    pub fn at(mut self, path: FieldPath) -> Self {
        self.path = Some(path);
        self
    }
}

impl From<EvaluationError> for FieldError {
    fn from(err: EvaluationError) -> Self {
        FieldError::new(err.to_string())
    }
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("an expression evaluator is required")]
    MissingEvaluator,

    #[error("element binding name must not be empty")]
    EmptyElementBinding,
}

/// Result type for dependency validation
pub type ValidationResult<T> = Result<T, ValidationErrors>;
