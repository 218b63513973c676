//! Producer/consumer synchronization across a whole execution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dagql::{
    resolver_fn, Directive, FetchEnvironment, FieldDecl, FieldError, FieldPath, QueryDocument,
    TaskError, TaskState, Value,
};
use dagql_test::MockHost;
use serde_json::json;

use crate::common::{delayed, engine, failing, init_tracing};

fn path(raw: &str) -> FieldPath {
    FieldPath::parse(raw).unwrap()
}

/// Resolver returning its arguments as an object, counting calls.
fn echo_arguments(calls: Arc<AtomicUsize>) -> Arc<dyn dagql::FieldResolver> {
    resolver_fn(move |env: FetchEnvironment| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, FieldError>(Value::Object(env.arguments)) }
    })
}

#[tokio::test]
async fn test_consumer_completes_after_all_producers() {
    init_tracing();
    // c is declared first but waits for b (fast) and a (slow)
    let query = QueryDocument::new(vec![
        FieldDecl::new("c")
            .argument("fromA", Value::Null)
            .argument("fromB", Value::Null)
            .directive(Directive::link("a", "fromA"))
            .directive(Directive::link("b", "fromB")),
        FieldDecl::new("a").directive(Directive::node("a")),
        FieldDecl::new("b").directive(Directive::node("b")),
    ]);
    let calls = Arc::new(AtomicUsize::new(0));
    let host = MockHost::new(engine())
        .resolver("a", delayed(json!("A"), Duration::from_millis(40)))
        .resolver("b", delayed(json!("B"), Duration::from_millis(5)))
        .resolver("c", echo_arguments(Arc::clone(&calls)));

    let result = host.execute(&query).await.unwrap();

    let order: Vec<usize> = ["b", "a", "c"]
        .iter()
        .map(|p| result.completion_index(p).unwrap())
        .collect();
    assert!(order[0] < order[1] && order[1] < order[2], "order: {:?}", result.completed);
    assert_eq!(result.get("c"), json!({ "fromA": "A", "fromB": "B" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_chained_dependencies_resolve_in_order() {
    init_tracing();
    let query = QueryDocument::new(vec![
        FieldDecl::new("third")
            .argument("input", Value::Null)
            .directive(Directive::link("second", "input")),
        FieldDecl::new("second")
            .argument("input", Value::Null)
            .directive(Directive::node("second"))
            .directive(Directive::link("first", "input")),
        FieldDecl::new("first").directive(Directive::node("first")),
    ]);
    let host = MockHost::new(engine())
        .root(json!({ "first": 1 }))
        .resolver(
            "second",
            resolver_fn(|env: FetchEnvironment| async move {
                let input = env.arguments["input"].as_i64().unwrap_or_default();
                Ok::<_, FieldError>(json!(input + 1))
            }),
        )
        .resolver(
            "third",
            resolver_fn(|env: FetchEnvironment| async move {
                let input = env.arguments["input"].as_i64().unwrap_or_default();
                Ok::<_, FieldError>(json!(input * 10))
            }),
        );

    let result = host.execute(&query).await.unwrap();
    assert_eq!(result.data, json!({ "third": 20, "second": 2, "first": 1 }));
    assert!(result.completion_index("first") < result.completion_index("second"));
    assert!(result.completion_index("second") < result.completion_index("third"));
}

/// `items.id` resolver answering after a per-item delay.
fn id_after(delays: &'static [(i64, u64)]) -> Arc<dyn dagql::FieldResolver> {
    resolver_fn(move |env: FetchEnvironment| async move {
        let id = env.source["id"].clone();
        let delay = delays
            .iter()
            .find(|(item, _)| id.as_i64() == Some(*item))
            .map_or(0, |(_, millis)| *millis);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok::<_, FieldError>(id)
    })
}

fn summary_of_item_ids() -> QueryDocument {
    QueryDocument::new(vec![
        FieldDecl::new("summary")
            .argument("ids", Value::Null)
            .directive(Directive::link("ids", "ids")),
        FieldDecl::new("items")
            .list()
            .select(FieldDecl::new("id").directive(Directive::node("ids"))),
    ])
}

#[tokio::test]
async fn test_list_occurrences_aggregate_into_one_node() {
    init_tracing();
    let host = MockHost::new(engine())
        .root(json!({ "items": [{ "id": 1 }, { "id": 2 }, { "id": 3 }] }))
        .resolver("items.id", id_after(&[(1, 20), (2, 5), (3, 40)]))
        .resolver("summary", echo_arguments(Arc::new(AtomicUsize::new(0))));

    let result = host.execute(&summary_of_item_ids()).await.unwrap();

    // every occurrence, in completion order
    assert_eq!(result.get("summary.ids"), json!([2, 1, 3]));
    assert_eq!(result.get("items[1].id"), json!(2));
    assert!(result.completion_index("items") < result.completion_index("summary"));
    assert!(result.registry.task(&path("items.id")).unwrap().is_closed());
}

#[tokio::test]
async fn test_empty_list_gives_empty_aggregate() {
    init_tracing();
    let host = MockHost::new(engine())
        .root(json!({ "items": [] }))
        .resolver("summary", echo_arguments(Arc::new(AtomicUsize::new(0))));

    let result = tokio::time::timeout(Duration::from_secs(2), host.execute(&summary_of_item_ids()))
        .await
        .expect("consumer of an empty list must not hang")
        .unwrap();

    assert_eq!(result.get("summary.ids"), json!([]));
    assert!(result.skipped.is_empty());
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_null_ancestor_skips_consumer() {
    init_tracing();
    let query = QueryDocument::new(vec![
        FieldDecl::new("coupon").select(FieldDecl::new("itemIds").directive(Directive::node("ids"))),
        FieldDecl::new("items")
            .argument("ids", Value::Null)
            .directive(Directive::link("ids", "ids")),
    ]);
    let calls = Arc::new(AtomicUsize::new(0));
    let host = MockHost::new(engine())
        .root(json!({ "coupon": null }))
        .resolver("items", echo_arguments(Arc::clone(&calls)));

    let result = tokio::time::timeout(Duration::from_secs(2), host.execute(&query))
        .await
        .expect("consumer of a null ancestor must not hang")
        .unwrap();

    assert_eq!(result.skipped, vec![path("items")]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.data, json!({ "coupon": null, "items": null }));

    let failures = result.registry.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, path("coupon"));
    assert_eq!(
        failures[0].1.cause(),
        &TaskError::EmptyResult { path: path("coupon") }
    );
    assert!(result
        .registry
        .task(&path("coupon.itemIds"))
        .unwrap()
        .state()
        .is_pending());
}

#[tokio::test]
async fn test_null_list_skips_aggregate_consumer() {
    init_tracing();
    let host = MockHost::new(engine())
        .root(json!({ "items": null }))
        .resolver("summary", echo_arguments(Arc::new(AtomicUsize::new(0))));

    let result = tokio::time::timeout(Duration::from_secs(2), host.execute(&summary_of_item_ids()))
        .await
        .expect("consumer of a null list must not hang")
        .unwrap();

    assert_eq!(result.skipped, vec![path("summary")]);
    assert_eq!(result.get("summary"), Value::Null);
}

#[tokio::test]
async fn test_empty_result_short_circuits_consumers_transitively() {
    init_tracing();
    let query = QueryDocument::new(vec![
        FieldDecl::new("producer").directive(Directive::node("p")),
        FieldDecl::new("middle")
            .argument("input", Value::Null)
            .directive(Directive::node("m"))
            .directive(Directive::link("p", "input")),
        FieldDecl::new("last")
            .argument("input", Value::Null)
            .directive(Directive::link("m", "input")),
    ]);
    let calls = Arc::new(AtomicUsize::new(0));
    let host = MockHost::new(engine())
        .resolver("middle", echo_arguments(Arc::clone(&calls)))
        .resolver("last", echo_arguments(Arc::clone(&calls)));

    // producer reads a missing property and completes with null
    let result = host.execute(&query).await.unwrap();

    assert_eq!(result.data, json!({ "producer": null, "middle": null, "last": null }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.skipped, vec![path("middle"), path("last")]);
    assert!(result.errors.is_empty());

    let failures = result.registry.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(
        failures[1].1.cause(),
        &TaskError::EmptyResult { path: path("producer") }
    );
}

#[tokio::test]
async fn test_producer_error_is_reported_once_and_consumer_skipped() {
    init_tracing();
    let query = QueryDocument::new(vec![
        FieldDecl::new("producer").directive(Directive::node("p")),
        FieldDecl::new("consumer")
            .argument("input", Value::Null)
            .directive(Directive::link("p", "input")),
    ]);
    let host = MockHost::new(engine())
        .resolver("producer", failing("backend unavailable"))
        .resolver("consumer", echo_arguments(Arc::new(AtomicUsize::new(0))));

    let result = host.execute(&query).await.unwrap();

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, Some(path("producer")));
    assert_eq!(result.get("consumer"), Value::Null);
    assert_eq!(result.skipped, vec![path("consumer")]);

    let TaskState::Failed(failure) = result.registry.task(&path("producer")).unwrap().state() else {
        panic!("producer task should be failed");
    };
    assert_eq!(
        failure.cause(),
        &TaskError::Field {
            path: path("producer"),
            message: "backend unavailable".to_string(),
        }
    );
}

#[tokio::test]
async fn test_aggregate_failures_are_suppressed_after_the_first() {
    init_tracing();
    let query = QueryDocument::new(vec![FieldDecl::new("items")
        .list()
        .select(FieldDecl::new("price").directive(Directive::node("prices")))]);
    let host = MockHost::new(engine())
        .root(json!({ "items": [{}, {}, {}] }))
        .resolver("items.price", failing("no price"));

    let result = host.execute(&query).await.unwrap();

    assert_eq!(result.errors.len(), 3);
    let failures = result.registry.failures();
    assert_eq!(failures.len(), 1);
    let (key, failure) = &failures[0];
    assert_eq!(key, &path("items.price"));
    assert_eq!(failure.suppressed().len(), 2);
    assert!(failure.to_string().ends_with("(2 suppressed)"));
}

#[tokio::test]
async fn test_independent_subtrees_are_not_blocked_by_waiting_consumer() {
    init_tracing();
    let query = QueryDocument::new(vec![
        FieldDecl::new("consumer")
            .argument("input", Value::Null)
            .directive(Directive::link("slow", "input")),
        FieldDecl::new("free"),
        FieldDecl::new("slow").directive(Directive::node("slow")),
    ]);
    let host = MockHost::new(engine())
        .root(json!({ "free": "done" }))
        .resolver("slow", delayed(json!(1), Duration::from_millis(30)))
        .resolver("consumer", echo_arguments(Arc::new(AtomicUsize::new(0))));

    let result = host.execute(&query).await.unwrap();

    assert!(result.completion_index("free") < result.completion_index("slow"));
    assert!(result.completion_index("slow") < result.completion_index("consumer"));
    assert_eq!(result.get("consumer.input"), json!(1));
}
