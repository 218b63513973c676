//! Engine configuration.

use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::evaluator::Evaluator;
use crate::types::{Bindings, Value};

/// Binding name of the current element in per-element expressions.
pub const DEFAULT_ELEMENT_BINDING: &str = "ele";

/// Settings shared by every execution the engine serves.
#[derive(Clone)]
pub struct EngineConfig {
    pub(crate) evaluator: Arc<dyn Evaluator>,
    pub(crate) helpers: Bindings,
    pub(crate) element_binding: String,
    pub(crate) detect_cycles: bool,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Process-wide bindings added to every expression evaluation.
    pub fn helpers(&self) -> &Bindings {
        &self.helpers
    }

    pub fn element_binding(&self) -> &str {
        &self.element_binding
    }

    pub fn detect_cycles(&self) -> bool {
        self.detect_cycles
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("helpers", &self.helpers)
            .field("element_binding", &self.element_binding)
            .field("detect_cycles", &self.detect_cycles)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EngineConfig`].
///
/// # Examples
///
/// ```
/// use dagql::{Bindings, EngineConfig, EvaluationError, Value};
///
/// let config = EngineConfig::builder()
///     .evaluator(|_: &str, _: &Bindings| -> Result<Value, EvaluationError> { Ok(Value::Null) })
///     .helper("discount", Value::from(5))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.element_binding(), "ele");
/// assert!(config.detect_cycles());
/// ```
pub struct EngineConfigBuilder {
    evaluator: Option<Arc<dyn Evaluator>>,
    helpers: Bindings,
    element_binding: String,
    detect_cycles: bool,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self {
            evaluator: None,
            helpers: Bindings::new(),
            element_binding: DEFAULT_ELEMENT_BINDING.to_string(),
            detect_cycles: true,
        }
    }
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    #[must_use]
    pub fn shared_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    #[must_use]
    pub fn helper(mut self, name: impl Into<String>, value: Value) -> Self {
        self.helpers.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn element_binding(mut self, name: impl Into<String>) -> Self {
        self.element_binding = name.into();
        self
    }

    #[must_use]
    pub fn detect_cycles(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let evaluator = self.evaluator.ok_or(ConfigError::MissingEvaluator)?;
        if self.element_binding.is_empty() {
            return Err(ConfigError::EmptyElementBinding);
        }
        Ok(EngineConfig {
            evaluator,
            helpers: self.helpers,
            element_binding: self.element_binding,
            detect_cycles: self.detect_cycles,
        })
    }
}
