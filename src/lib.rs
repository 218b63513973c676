//! Cross-Field Dependency Scheduling for Query Execution
//!
//! dagql lets one field of a hierarchical query publish its resolved value as a named
//! *node*, and lets any other field of the same query consume that node as an argument,
//! a filter predicate or a transformation input. The tree-shaped query becomes an implicit
//! task graph that is synchronized inside the host's own field execution, without blocking
//! the host pipeline.
//!
//! # Features
//!
//! - **Static validation**: undeclared arguments, unknown nodes, duplicate argument
//!   bindings and dependency cycles are all reported before anything executes.
//! - **Non-blocking joins**: a consumer parks on a oneshot channel until its producer
//!   settles. The completion hook never waits on anything.
//! - **List aggregation**: a field under a list-typed ancestor feeds one aggregate task;
//!   consumers see the whole sequence once the list completes.
//! - **Failure as data**: a failed dependency short-circuits its consumers to
//!   [`Resolution::Skipped`] instead of failing the whole query.
//! - **Runtime-agnostic**: built on `futures` channels; works with any executor.
//! - **Pluggable expressions**: `map`, `filter`, `transform` and `sourceConvert`
//!   expressions go through a host-supplied [`Evaluator`].
//!
//! # Quick Start
//!
//! ```
//! use dagql::{
//!     resolver_fn, Bindings, DependencyEngine, Directive, EngineConfig, EvaluationError,
//!     ExecutionHooks, FetchEnvironment, FieldDecl, FieldError, FieldPath, FieldResolver,
//!     QueryDocument, Value,
//! };
//! use std::sync::Arc;
//!
//! # futures::executor::block_on(async {
//! let config = EngineConfig::builder()
//!     .evaluator(|_: &str, _: &Bindings| -> Result<Value, EvaluationError> { Ok(Value::Null) })
//!     .build()
//!     .unwrap();
//! let engine = DependencyEngine::new(config);
//!
//! let query = QueryDocument::new(vec![
//!     FieldDecl::new("ids").directive(Directive::node("itemIds")),
//!     FieldDecl::new("items")
//!         .argument("ids", Value::Null)
//!         .directive(Directive::link("itemIds", "ids")),
//! ]);
//! let registry = engine.create_execution_state(&query).unwrap();
//!
//! // The consumer is set up before its producer completes.
//! let items = Arc::new(query.fields[1].clone());
//! let resolver = engine.on_field_resolution_start(
//!     &FieldPath::root().field("items"),
//!     &items,
//!     &registry,
//!     resolver_fn(|env: FetchEnvironment| async move {
//!         Ok::<_, FieldError>(env.arguments["ids"].clone())
//!     }),
//! );
//! let pending = resolver.resolve(FetchEnvironment::new(FieldPath::root().field("items"), items));
//!
//! engine.on_field_completed(&FieldPath::root().field("ids"), Ok(Value::from(vec![1, 2])), &registry);
//!
//! let value = pending.await.unwrap().into_value();
//! assert_eq!(value, Value::from(vec![1, 2]));
//! # });
//! ```
//!
//! # Directives
//!
//! | Directive | Effect |
//! |-----------|--------|
//! | `node(name, sourceConvert?)` | Publish the field's completed value under `name` |
//! | `link(node, argument)` | Bind the node's value to an argument before resolving |
//! | `transform(argumentName, operateType, dependencySource?, expression)` | Rewrite an argument (`MAP`, `FILTER`, `LIST_MAP`) |
//! | `map(expression, dependencySource?)` | Replace the fetched value |
//! | `filter(predicate)` | Drop fetched list elements whose predicate is falsy |
//!
//! Directive syntax is parsed by the host. This crate consumes the parsed [`QueryDocument`].
//!
//! # Execution Model
//!
//! One execution goes through the [`ExecutionHooks`] of a [`DependencyEngine`]:
//!
//! 1. `create_execution_state` validates the query and runs the discovery pass, which
//!    creates one Pending [`FieldTask`] for every field publishing a node.
//! 2. `on_field_resolution_start` wraps the host's resolver for fields that declare
//!    dependencies or transformations. The wrapper joins on every dependency, rewrites
//!    arguments, calls the host resolver and post-processes its value.
//! 3. `on_field_completed` settles the field's task. Joined consumers wake up.
//!
//! The host resolves fields in whatever order it likes. A consumer that starts before
//! its producer simply waits, so independent subtrees keep making progress.
//!
//! ## Tasks and Aggregation
//!
//! Tasks are keyed by the field path with list indices removed. Every occurrence of
//! `items[0].id`, `items[1].id`, ... feeds the task at `items.id`, which is an aggregate:
//! the first contribution fulfills it with a one-element sequence and later ones append.
//! The aggregate is final once `items` completes; only then are its consumers released,
//! with every contribution in completion order. An empty `items` list gives `[]`.
//!
//! Each ancestor of a publishing field is a *gate* task of the published node. A consumer
//! awaits the gates (outer to inner) before the publisher, so a null ancestor ends the
//! join with an empty-result failure instead of leaving the consumer waiting. Gates that
//! enclose the consumer itself are not awaited. Gates under a list are aggregates like any
//! other task there: a null `items[2].detail` fails the node when it is the first `detail`
//! to complete, and is otherwise kept as a late error while its subtree contributes nothing.
//!
//! A task settles exactly once. After a failure every further error is attached as a
//! suppressed cause; see [`TaskFailure::suppressed`].
//!
//! # Error Handling
//!
//! - Validation returns every problem at once as [`ValidationErrors`].
//! - A producer that fails, or completes with `null`, fails its task. Consumers get
//!   [`Resolution::Skipped`] carrying the [`DependencyFailure`], and render as `null`.
//! - An expression that cannot be evaluated becomes a [`FieldError`] on the field that
//!   declared it.
//! - [`DependencyRegistry::failures`] lists every failed task after the execution, with
//!   its suppressed causes.
//!
//! # Optional Tracing Support
//!
//! The `tracing` feature (enabled by default) instruments validation, discovery, joins
//! and task settlement through the `tracing` crate. Without it the call sites are
//! compiled out.
//!
//! ```no_run
//! use tracing_subscriber::{fmt, EnvFilter};
//!
//! fmt()
//!     .with_env_filter(
//!         EnvFilter::try_from_default_env()
//!             .unwrap_or_else(|_| EnvFilter::new("dagql=info"))
//!     )
//!     .init();
//! ```
//!
//! ## Log Levels
//!
//! - **INFO**: rejected queries
//! - **DEBUG**: node registration, discovery, joins, short-circuited fields
//! - **TRACE**: every task transition
//! - **WARN**: repeated completions for a path that already contributed

mod config;
mod discovery;
mod engine;
mod error;
mod evaluator;
mod query;
mod registry;
mod resolver;
mod scheduler;
mod task;
mod transform;
mod types;
mod validate;

// Public re-exports
pub use config::{EngineConfig, EngineConfigBuilder, DEFAULT_ELEMENT_BINDING};
pub use discovery::{discover, node_table};
pub use engine::{DependencyEngine, ExecutionHooks};
pub use error::{
    CompletionRejected, ConfigError, DependencyFailure, EvaluationError, FieldError, TaskError,
    TaskFailure, ValidationError, ValidationErrors, ValidationResult,
};
pub use evaluator::Evaluator;
pub use query::{Directive, FieldDecl, QueryDocument, TransformOp};
pub use registry::{DependencyRegistry, NodeStep, NodeTable, RegistryHandle};
pub use resolver::{
    resolve_node, resolver_fn, ArgumentResolver, FetchEnvironment, FieldResolver, Resolution,
    ResolverFn,
};
pub use scheduler::TaskScheduler;
pub use task::{FieldTask, TaskState, TaskValue, Transition};
pub use transform::{DependencyBinding, TransformApplicator};
pub use types::{is_truthy, Bindings, FieldPath, NodeName, PathSegment, SourceLocation, Value};
pub use validate::{validate, Validator};
