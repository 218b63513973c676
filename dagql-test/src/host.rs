use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;

use dagql::{
    resolver_fn, ExecutionHooks, FetchEnvironment, FieldDecl, FieldError, FieldPath,
    FieldResolver, PathSegment, QueryDocument, RegistryHandle, Resolution, ValidationErrors, Value,
};

/// Outcome of one [`MockHost::execute`] call.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Assembled result tree.
    pub data: Value,
    /// Field errors, in the order they occurred.
    pub errors: Vec<FieldError>,
    /// Concrete paths in the order their fields completed.
    pub completed: Vec<FieldPath>,
    /// Concrete paths whose resolution was skipped because a dependency failed.
    pub skipped: Vec<FieldPath>,
    pub registry: RegistryHandle,
}

impl ExecutionResult {
    /// Value at a dotted path such as `items[0].id`; `Null` if absent.
    pub fn get(&self, path: &str) -> Value {
        let Some(path) = FieldPath::parse(path) else {
            return Value::Null;
        };
        let mut current = self.data.clone();
        for segment in path.segments() {
            current = match segment {
                PathSegment::Field(name) => current.get(name.as_str()).cloned(),
                PathSegment::Index(index) => current.get(*index).cloned(),
            }
            .unwrap_or(Value::Null);
        }
        current
    }

    /// Position of `path` in the completion order.
    pub fn completion_index(&self, path: &str) -> Option<usize> {
        let path = FieldPath::parse(path)?;
        self.completed.iter().position(|completed| *completed == path)
    }
}

/// Minimal host execution engine.
///
/// Sibling fields resolve concurrently; a field's selections resolve after its own value.
/// A field is reported complete once its whole subtree is. Resolvers are registered by
/// task key (`items.id` covers every `items[i].id`); unregistered fields read the
/// property of the same name from their parent value.
pub struct MockHost {
    hooks: Arc<dyn ExecutionHooks>,
    resolvers: HashMap<FieldPath, Arc<dyn FieldResolver>>,
    root: Value,
}

impl MockHost {
    pub fn new(hooks: impl ExecutionHooks + 'static) -> Self {
        Self {
            hooks: Arc::new(hooks),
            resolvers: HashMap::new(),
            root: Value::Null,
        }
    }

    /// Register the resolver for every occurrence of the field at `key`.
    ///
    /// # Panics
    ///
    /// If `key` is not a valid path.
    #[must_use]
    pub fn resolver(mut self, key: &str, resolver: Arc<dyn FieldResolver>) -> Self {
        let key = FieldPath::parse(key)
            .unwrap_or_else(|| panic!("invalid resolver key '{key}'"))
            .task_key();
        self.resolvers.insert(key, resolver);
        self
    }

    /// Value the top-level fields read their properties from.
    #[must_use]
    pub fn root(mut self, root: Value) -> Self {
        self.root = root;
        self
    }

    pub async fn execute(&self, query: &QueryDocument) -> Result<ExecutionResult, ValidationErrors> {
        let registry = self.hooks.create_execution_state(query)?;
        let plan: Vec<Plan> = query.fields.iter().map(Plan::new).collect();

        let execution = Execution {
            host: self,
            registry,
            errors: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            skipped: Mutex::new(Vec::new()),
        };
        let data = execution
            .selections(&plan, FieldPath::root(), self.root.clone())
            .await;

        Ok(ExecutionResult {
            data,
            errors: execution.errors.into_inner(),
            completed: execution.completed.into_inner(),
            skipped: execution.skipped.into_inner(),
            registry: execution.registry,
        })
    }

    fn base_resolver(&self, path: &FieldPath) -> Arc<dyn FieldResolver> {
        match self.resolvers.get(&path.task_key()) {
            Some(resolver) => Arc::clone(resolver),
            None => resolver_fn(|env: FetchEnvironment| async move {
                let value = env
                    .source
                    .get(env.field.name.as_str())
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok::<_, FieldError>(value)
            }),
        }
    }
}

/// Field declaration with its selections, shared across occurrences.
struct Plan {
    field: Arc<FieldDecl>,
    selections: Vec<Plan>,
}

impl Plan {
    fn new(field: &FieldDecl) -> Self {
        Self {
            field: Arc::new(field.clone()),
            selections: field.selections.iter().map(Plan::new).collect(),
        }
    }
}

struct Execution<'h> {
    host: &'h MockHost,
    registry: RegistryHandle,
    errors: Mutex<Vec<FieldError>>,
    completed: Mutex<Vec<FieldPath>>,
    skipped: Mutex<Vec<FieldPath>>,
}

impl<'h> Execution<'h> {
    /// Resolve `plans` concurrently against `source` into one result object.
    fn selections<'a>(
        &'a self,
        plans: &'a [Plan],
        parent: FieldPath,
        source: Value,
    ) -> BoxFuture<'a, Value> {
        async move {
            let fields = join_all(
                plans
                    .iter()
                    .map(|plan| self.field(plan, parent.field(plan.field.result_name()), source.clone())),
            )
            .await;

            let object = plans
                .iter()
                .map(|plan| plan.field.result_name().to_string())
                .zip(fields)
                .collect();
            Value::Object(object)
        }
        .boxed()
    }

    fn field<'a>(&'a self, plan: &'a Plan, path: FieldPath, source: Value) -> BoxFuture<'a, Value> {
        async move {
            let hooks = &self.host.hooks;
            let resolver = hooks.on_field_resolution_start(
                &path,
                &plan.field,
                &self.registry,
                self.host.base_resolver(&path),
            );
            let env = FetchEnvironment::new(path.clone(), Arc::clone(&plan.field)).with_source(source);

            let result = match resolver.resolve(env).await {
                Ok(Resolution::Value(value)) => Ok(self.complete(plan, &path, value).await),
                Ok(Resolution::Skipped(_)) => {
                    self.skipped.lock().push(path.clone());
                    Ok(Value::Null)
                }
                Err(error) => {
                    let error = error.at(path.clone());
                    self.errors.lock().push(error.clone());
                    Err(error)
                }
            };

            self.completed.lock().push(path.clone());
            hooks.on_field_completed(&path, result.clone(), &self.registry);
            result.unwrap_or(Value::Null)
        }
        .boxed()
    }

    /// Resolve the selections of a fetched value.
    async fn complete(&self, plan: &Plan, path: &FieldPath, value: Value) -> Value {
        if plan.selections.is_empty() {
            return value;
        }
        match value {
            Value::Array(elements) => {
                let items = join_all(elements.into_iter().enumerate().map(|(index, element)| {
                    self.selections(&plan.selections, path.index(index), element)
                }))
                .await;
                Value::Array(items)
            }
            Value::Null => Value::Null,
            object => self.selections(&plan.selections, path.clone(), object).await,
        }
    }
}
