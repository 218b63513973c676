//! Expression-driven rewriting of arguments and fetched values.
//!
//! Every evaluation sees the engine's helper bindings first; bindings specific to the
//! evaluation are layered on top and win on name clashes.

use crate::config::EngineConfig;
use crate::error::EvaluationError;
use crate::evaluator::Evaluator;
use crate::query::TransformOp;
use crate::types::{is_truthy, Bindings, NodeName, Value};

/// A resolved dependency made available to an expression under the node's name.
pub type DependencyBinding<'a> = Option<(&'a NodeName, &'a Value)>;

/// Applies `transform`, `map`, `filter` and `sourceConvert` expressions.
pub struct TransformApplicator<'a> {
    evaluator: &'a dyn Evaluator,
    helpers: &'a Bindings,
    element: &'a str,
}

impl<'a> TransformApplicator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            evaluator: config.evaluator.as_ref(),
            helpers: &config.helpers,
            element: &config.element_binding,
        }
    }

    /// Rewrite the value of argument `name`.
    ///
    /// `arguments` are the field's arguments after link binding; they are visible to the
    /// expression alongside the dependency.
    pub fn transform_argument(
        &self,
        operation: TransformOp,
        name: &str,
        arguments: &Bindings,
        dependency: DependencyBinding<'_>,
        expression: &str,
    ) -> Result<Value, EvaluationError> {
        let mut bindings = self.helpers.clone();
        bindings.extend(arguments.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some((node, value)) = dependency {
            bindings.insert(node.to_string(), value.clone());
        }
        let current = arguments.get(name).cloned().unwrap_or(Value::Null);

        match operation {
            TransformOp::Map => self.evaluator.evaluate(expression, &bindings),
            TransformOp::ListMap => match current {
                Value::Null => Ok(Value::Null),
                Value::Array(elements) => elements
                    .into_iter()
                    .map(|element| self.eval_element(expression, &bindings, element))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                scalar => self.eval_element(expression, &bindings, scalar),
            },
            TransformOp::Filter => match current {
                Value::Null => Ok(Value::Null),
                Value::Array(elements) => {
                    let mut kept = Vec::with_capacity(elements.len());
                    for element in elements {
                        if is_truthy(&self.eval_element(expression, &bindings, element.clone())?) {
                            kept.push(element);
                        }
                    }
                    Ok(Value::Array(kept))
                }
                scalar => {
                    let keep = is_truthy(&self.eval_element(expression, &bindings, scalar.clone())?);
                    Ok(if keep { scalar } else { Value::Null })
                }
            },
        }
    }

    fn eval_element(
        &self,
        expression: &str,
        bindings: &Bindings,
        element: Value,
    ) -> Result<Value, EvaluationError> {
        let mut bindings = bindings.clone();
        bindings.insert(self.element.to_string(), element);
        self.evaluator.evaluate(expression, &bindings)
    }

    /// Replace a fetched value with `expression`.
    ///
    /// Bindings: the parent object's fields (the field's siblings), the fetched value under
    /// `result_name`, and the dependency.
    pub fn map_value(
        &self,
        expression: &str,
        result_name: &str,
        value: Value,
        source: &Value,
        dependency: DependencyBinding<'_>,
    ) -> Result<Value, EvaluationError> {
        let mut bindings = self.helpers.clone();
        if let Value::Object(siblings) = source {
            bindings.extend(siblings.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        bindings.insert(result_name.to_string(), value);
        if let Some((node, value)) = dependency {
            bindings.insert(node.to_string(), value.clone());
        }
        self.evaluator.evaluate(expression, &bindings)
    }

    /// Drop list elements whose `predicate` is falsy, keeping the order of the rest.
    ///
    /// Object elements expose their own fields as bindings; every element is also bound
    /// under the element name. Non-list values pass through unchanged.
    pub fn filter_value(&self, predicate: &str, value: Value) -> Result<Value, EvaluationError> {
        let Value::Array(elements) = value else {
            return Ok(value);
        };

        let mut kept = Vec::with_capacity(elements.len());
        for element in elements {
            let mut bindings = self.helpers.clone();
            if let Value::Object(fields) = &element {
                bindings.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            bindings.insert(self.element.to_string(), element.clone());
            if is_truthy(&self.evaluator.evaluate(predicate, &bindings)?) {
                kept.push(element);
            }
        }
        Ok(Value::Array(kept))
    }

    /// Reshape a published value before it reaches the node's consumers.
    pub fn convert_source(
        &self,
        expression: &str,
        result_name: &str,
        value: Value,
    ) -> Result<Value, EvaluationError> {
        let mut bindings = self.helpers.clone();
        if let Value::Object(fields) = &value {
            bindings.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        bindings.insert(result_name.to_string(), value);
        self.evaluator.evaluate(expression, &bindings)
    }
}
