use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dagql::{Bindings, EvaluationError, Evaluator, Value};

type Script = Arc<dyn Fn(&Bindings) -> Result<Value, EvaluationError> + Send + Sync>;

/// Evaluator with a fixed script per expression.
///
/// An expression without a script evaluates to the binding of the same name, so plain
/// identifiers like `itemIdList` or `onSale` need no script at all.
#[derive(Clone, Default)]
pub struct ScriptedEvaluator {
    scripts: HashMap<String, Script>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn script<F>(mut self, expression: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Bindings) -> Result<Value, EvaluationError> + Send + Sync + 'static,
    {
        self.scripts.insert(expression.into(), Arc::new(f));
        self
    }
}

impl Evaluator for ScriptedEvaluator {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, EvaluationError> {
        match self.scripts.get(expression) {
            Some(script) => script(bindings),
            None => binding(bindings, expression, expression).cloned(),
        }
    }
}

impl fmt::Debug for ScriptedEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut expressions: Vec<_> = self.scripts.keys().collect();
        expressions.sort();
        f.debug_struct("ScriptedEvaluator")
            .field("scripts", &expressions)
            .finish()
    }
}

/// Look up `name`, reporting a missing binding against `expression`.
pub fn binding<'a>(
    bindings: &'a Bindings,
    expression: &str,
    name: &str,
) -> Result<&'a Value, EvaluationError> {
    bindings
        .get(name)
        .ok_or_else(|| EvaluationError::MissingBinding {
            expression: expression.to_string(),
            name: name.to_string(),
        })
}
