//! Fetch hook: joins a field on its declared dependencies before it resolves.
//!
//! [`ArgumentResolver::instrument`] wraps the host's resolver for a field. The wrapper is
//! the only place where one field waits on another:
//!
//! 1. every `link` joins on its node and binds the value to its argument;
//! 2. every `transform` joins on its dependency source (if any) and rewrites its argument;
//! 3. every `map` dependency source is joined;
//! 4. the host resolver runs with the rewritten arguments;
//! 5. `filter` and `map` post-process the fetched value, in declaration order.
//!
//! A failed dependency in steps 1-3 short-circuits: the wrapper returns
//! [`Resolution::Skipped`] without calling the host resolver or evaluating anything.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{DependencyFailure, EvaluationError, FieldError, TaskError, TaskFailure};
use crate::query::{Directive, FieldDecl};
use crate::registry::{DependencyRegistry, RegistryHandle};
use crate::task::TaskValue;
use crate::transform::TransformApplicator;
use crate::types::{Bindings, FieldPath, NodeName, Value};

/// Everything a resolver sees for one field occurrence.
#[derive(Debug, Clone)]
pub struct FetchEnvironment {
    pub path: FieldPath,
    pub field: Arc<FieldDecl>,
    pub arguments: Bindings,
    /// The parent object's resolved value.
    pub source: Value,
}

impl FetchEnvironment {
    /// Environment with the field's declared arguments and no parent value.
    pub fn new(path: FieldPath, field: Arc<FieldDecl>) -> Self {
        let arguments = field.arguments.clone();
        Self {
            path,
            field,
            arguments,
            source: Value::Null,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: Value) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }
}

/// Outcome of resolving one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Value(Value),
    /// A dependency failed; the field renders as null.
    Skipped(DependencyFailure),
}

impl Resolution {
    pub fn into_value(self) -> Value {
        match self {
            Resolution::Value(value) => value,
            Resolution::Skipped(_) => Value::Null,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Resolution::Skipped(_))
    }
}

/// Host-side resolution logic for a field.
pub trait FieldResolver: Send + Sync {
    fn resolve(&self, env: FetchEnvironment) -> BoxFuture<'static, Result<Resolution, FieldError>>;
}

/// Adapter from an async closure to a [`FieldResolver`].
pub struct ResolverFn<F>(F);

impl<F, Fut> FieldResolver for ResolverFn<F>
where
    F: Fn(FetchEnvironment) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, FieldError>> + Send + 'static,
{
    fn resolve(&self, env: FetchEnvironment) -> BoxFuture<'static, Result<Resolution, FieldError>> {
        (self.0)(env)
            .map(|result| result.map(Resolution::Value))
            .boxed()
    }
}

/// Wrap an async closure as a shared resolver.
pub fn resolver_fn<F, Fut>(f: F) -> Arc<dyn FieldResolver>
where
    F: Fn(FetchEnvironment) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FieldError>> + Send + 'static,
{
    Arc::new(ResolverFn(f))
}

/// Join on the path sequence of `node` on behalf of the field at `from`.
///
/// Gates and publishing tasks are awaited in sequence order and the first failed task ends
/// the join. Gates that are ancestors of `from` are not awaited: they complete only after
/// `from` does. Pass [`FieldPath::root`] to await every task.
///
/// The value is the single task's value when exactly one non-aggregate task publishes, and
/// the in-order concatenation of all contributions when several tasks or an aggregate task
/// publish. Aggregate tasks settle only once closed, so every contribution is included.
pub async fn resolve_node(
    registry: &DependencyRegistry,
    node: &NodeName,
    from: &FieldPath,
) -> Result<Value, DependencyFailure> {
    let failed = |failure: TaskFailure| DependencyFailure {
        node: node.clone(),
        failure,
    };

    let steps = match registry.sequence_for_node(node) {
        Some(steps) if steps.iter().any(|step| step.publishes) => steps,
        _ => {
            return Err(failed(TaskFailure::new(TaskError::UnknownNode {
                node: node.clone(),
            })))
        }
    };

    let from = from.task_key();
    let mut settled = Vec::with_capacity(steps.len());
    for step in &steps {
        if !step.publishes && from.starts_with(step.task.key()) {
            continue;
        }
        let value = step.task.settled().await.map_err(failed)?;
        if step.publishes {
            settled.push(value);
        }
    }

    if matches!(settled.as_slice(), [TaskValue::Single(_)]) {
        if let Some(value) = settled.pop() {
            return Ok(value.into_value());
        }
    }

    let mut merged = Vec::new();
    for value in settled {
        match value {
            TaskValue::Single(value) => merged.push(value),
            TaskValue::Aggregate(values) => merged.extend(values),
        }
    }
    Ok(Value::Array(merged))
}

/// Builds dependency-aware resolvers for fields.
#[derive(Debug, Clone)]
pub struct ArgumentResolver {
    config: Arc<EngineConfig>,
}

impl ArgumentResolver {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Resolver to use for `field` in the execution owning `registry`.
    ///
    /// Fields without dependency or transformation directives get `resolver` back unchanged.
    pub fn instrument(
        &self,
        field: &Arc<FieldDecl>,
        registry: &RegistryHandle,
        resolver: Arc<dyn FieldResolver>,
    ) -> Arc<dyn FieldResolver> {
        if !field.needs_resolution_hook() {
            return resolver;
        }

        Arc::new(LinkedResolver {
            inner: resolver,
            field: Arc::clone(field),
            registry: Arc::clone(registry),
            config: Arc::clone(&self.config),
        })
    }
}

#[derive(Clone)]
struct LinkedResolver {
    inner: Arc<dyn FieldResolver>,
    field: Arc<FieldDecl>,
    registry: RegistryHandle,
    config: Arc<EngineConfig>,
}

impl FieldResolver for LinkedResolver {
    fn resolve(&self, env: FetchEnvironment) -> BoxFuture<'static, Result<Resolution, FieldError>> {
        self.clone().run(env).boxed()
    }
}

impl LinkedResolver {
    async fn run(self, mut env: FetchEnvironment) -> Result<Resolution, FieldError> {
        let path = env.path.clone();
        let mut joined: HashMap<NodeName, Value> = HashMap::new();

        for (node, argument) in self.field.links() {
            match self.join(&path, node, &mut joined).await {
                Ok(value) => {
                    env.arguments.insert(argument.to_string(), value);
                }
                Err(failure) => return Ok(Resolution::Skipped(failure)),
            }
        }

        let applicator = TransformApplicator::new(&self.config);
        let evaluation_failed = |err: EvaluationError| FieldError::from(err).at(path.clone());

        for directive in &self.field.directives {
            let Directive::Transform {
                argument,
                operate_type,
                dependency_source,
                expression,
            } = directive
            else {
                continue;
            };

            let dependency = match dependency_source {
                Some(node) => match self.join(&path, node, &mut joined).await {
                    Ok(value) => Some((node, value)),
                    Err(failure) => return Ok(Resolution::Skipped(failure)),
                },
                None => None,
            };
            let rewritten = applicator
                .transform_argument(
                    *operate_type,
                    argument,
                    &env.arguments,
                    dependency.as_ref().map(|(node, value)| (*node, value)),
                    expression,
                )
                .map_err(evaluation_failed)?;
            env.arguments.insert(argument.clone(), rewritten);
        }

        for directive in &self.field.directives {
            if let Directive::Map {
                dependency_source: Some(node),
                ..
            } = directive
            {
                if let Err(failure) = self.join(&path, node, &mut joined).await {
                    return Ok(Resolution::Skipped(failure));
                }
            }
        }

        let source = env.source.clone();
        let mut value = match self.inner.resolve(env).await? {
            Resolution::Value(value) => value,
            skipped @ Resolution::Skipped(_) => return Ok(skipped),
        };

        for directive in &self.field.directives {
            match directive {
                Directive::Filter { predicate } => {
                    value = applicator
                        .filter_value(predicate, value)
                        .map_err(evaluation_failed)?;
                }
                Directive::Map {
                    expression,
                    dependency_source,
                } => {
                    let dependency = dependency_source
                        .as_ref()
                        .and_then(|node| joined.get(node).map(|value| (node, value)));
                    value = applicator
                        .map_value(
                            expression,
                            self.field.result_name(),
                            value,
                            &source,
                            dependency,
                        )
                        .map_err(evaluation_failed)?;
                }
                _ => {}
            }
        }

        Ok(Resolution::Value(value))
    }

    async fn join(
        &self,
        path: &FieldPath,
        node: &NodeName,
        joined: &mut HashMap<NodeName, Value>,
    ) -> Result<Value, DependencyFailure> {
        if let Some(value) = joined.get(node) {
            return Ok(value.clone());
        }

        #[cfg(feature = "tracing")]
        debug!(path = %path, node = %node, "joining on dependency");

        let value = match resolve_node(&self.registry, node, path).await {
            Ok(value) => value,
            Err(failure) => {
                #[cfg(feature = "tracing")]
                debug!(path = %path, error = %failure, "dependency failed, skipping field");

                return Err(failure);
            }
        };
        joined.insert(node.clone(), value.clone());
        Ok(value)
    }
}
