//! Host-facing hook interface and the engine implementing it.
//!
//! A host execution engine drives one query execution through three calls:
//!
//! 1. [`ExecutionHooks::create_execution_state`] once, before any field resolves;
//! 2. [`ExecutionHooks::on_field_resolution_start`] for every field occurrence, to obtain
//!    the resolver it should actually invoke;
//! 3. [`ExecutionHooks::on_field_completed`] for every field occurrence once its value is
//!    fully materialized, after the fields beneath it.
//!
//! The returned [`RegistryHandle`] is the execution's state; dropping it ends the execution.

use std::future::Future;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::discovery::{discover, node_table};
use crate::error::{FieldError, ValidationError, ValidationErrors, ValidationResult};
use crate::query::{FieldDecl, QueryDocument};
use crate::registry::RegistryHandle;
use crate::resolver::{ArgumentResolver, FieldResolver};
use crate::scheduler::TaskScheduler;
use crate::types::{FieldPath, Value};
use crate::validate::Validator;

/// Callbacks a host execution engine invokes for one query execution.
pub trait ExecutionHooks: Send + Sync {
    /// Validate `query` and build its execution state.
    fn create_execution_state(&self, query: &QueryDocument) -> ValidationResult<RegistryHandle>;

    /// Resolver to invoke for the field occurrence at `path`.
    fn on_field_resolution_start(
        &self,
        path: &FieldPath,
        field: &Arc<FieldDecl>,
        registry: &RegistryHandle,
        resolver: Arc<dyn FieldResolver>,
    ) -> Arc<dyn FieldResolver>;

    /// The field occurrence at `path` finished with `result`. Must not block.
    ///
    /// Called after every field occurrence beneath `path` was reported.
    fn on_field_completed(
        &self,
        path: &FieldPath,
        result: Result<Value, FieldError>,
        registry: &RegistryHandle,
    );
}

/// Dependency scheduling engine.
///
/// One engine serves any number of executions; all per-execution state lives in the
/// registries it hands out.
///
/// # Examples
///
/// ```
/// use dagql::{
///     Bindings, DependencyEngine, Directive, EngineConfig, EvaluationError, ExecutionHooks,
///     FieldDecl, QueryDocument, Value,
/// };
///
/// let config = EngineConfig::builder()
///     .evaluator(|_: &str, _: &Bindings| -> Result<Value, EvaluationError> { Ok(Value::Null) })
///     .build()
///     .unwrap();
/// let engine = DependencyEngine::new(config);
///
/// let query = QueryDocument::new(vec![
///     FieldDecl::new("coupon").select(FieldDecl::new("itemIds").directive(Directive::node("ids"))),
///     FieldDecl::new("items")
///         .argument("ids", Value::Null)
///         .directive(Directive::link("ids", "ids")),
/// ]);
///
/// let registry = engine.create_execution_state(&query).unwrap();
/// assert_eq!(registry.task_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct DependencyEngine {
    config: Arc<EngineConfig>,
    scheduler: TaskScheduler,
    resolver: ArgumentResolver,
}

impl DependencyEngine {
    pub fn new(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        Self {
            scheduler: TaskScheduler::new(Arc::clone(&config)),
            resolver: ArgumentResolver::new(Arc::clone(&config)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Static validation of `query` without building any state.
    pub fn validate(&self, query: &QueryDocument) -> Vec<ValidationError> {
        Validator::new()
            .detect_cycles(self.config.detect_cycles)
            .validate(query, &node_table(query))
    }

    /// Run `field` to completion and report its result to the scheduler.
    ///
    /// Convenience for hosts that hand out one future per field occurrence.
    pub fn track<F>(
        &self,
        path: FieldPath,
        registry: RegistryHandle,
        field: F,
    ) -> impl Future<Output = Result<Value, FieldError>> + Send + 'static
    where
        F: Future<Output = Result<Value, FieldError>> + Send + 'static,
    {
        let scheduler = self.scheduler.clone();
        async move {
            let result = field.await;
            scheduler.on_field_completed(&registry, &path, result.clone());
            result
        }
    }
}

impl ExecutionHooks for DependencyEngine {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn create_execution_state(&self, query: &QueryDocument) -> ValidationResult<RegistryHandle> {
        let errors = self.validate(query);
        if !errors.is_empty() {
            #[cfg(feature = "tracing")]
            info!(error_count = errors.len(), "rejecting query with invalid dependencies");

            return Err(ValidationErrors(errors));
        }

        let registry = Arc::new(discover(query));

        #[cfg(feature = "tracing")]
        debug!(
            tasks = registry.task_count(),
            unused_nodes = ?registry.unused_nodes(),
            "execution state created"
        );

        Ok(registry)
    }

    fn on_field_resolution_start(
        &self,
        _path: &FieldPath,
        field: &Arc<FieldDecl>,
        registry: &RegistryHandle,
        resolver: Arc<dyn FieldResolver>,
    ) -> Arc<dyn FieldResolver> {
        self.resolver.instrument(field, registry, resolver)
    }

    fn on_field_completed(
        &self,
        path: &FieldPath,
        result: Result<Value, FieldError>,
        registry: &RegistryHandle,
    ) {
        if !registry.has_tasks() {
            return;
        }
        self.scheduler.on_field_completed(registry, path, result);
    }
}
