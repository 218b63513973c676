//! Expression evaluator interface.
//!
//! Expressions inside `map`, `filter`, `transform` and `sourceConvert` are opaque to the
//! scheduler. The host supplies an [`Evaluator`]; any
//! `Fn(&str, &Bindings) -> Result<Value, EvaluationError>` closure is one.

use crate::error::EvaluationError;
use crate::types::{Bindings, Value};

/// Evaluates one expression against a set of named bindings.
///
/// Implementations must be safe to call from many fields at once.
///
/// # Examples
///
/// ```
/// use dagql::{Bindings, EvaluationError, Evaluator, Value};
///
/// let lookup = |expression: &str, bindings: &Bindings| -> Result<Value, EvaluationError> {
///     bindings
///         .get(expression)
///         .cloned()
///         .ok_or_else(|| EvaluationError::MissingBinding {
///             expression: expression.to_string(),
///             name: expression.to_string(),
///         })
/// };
///
/// let mut bindings = Bindings::new();
/// bindings.insert("x".to_string(), Value::from(3));
/// assert_eq!(lookup.evaluate("x", &bindings).unwrap(), Value::from(3));
/// ```
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, EvaluationError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str, &Bindings) -> Result<Value, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, EvaluationError> {
        self(expression, bindings)
    }
}
