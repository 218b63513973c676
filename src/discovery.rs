//! Reference discovery pass.
//!
//! Walks the query once before execution and creates a Pending task for every field that
//! publishes a node. Tasks must exist before any field runs: a consumer that starts before
//! its producer has to find a placeholder to wait on.
//!
//! A field under a list-typed ancestor occurs once per list element, so its task is an
//! aggregate collecting one element per occurrence. The aggregate is closed by its
//! outermost list ancestor: that field completes once, after every occurrence beneath it.
//!
//! Every ancestor of a publishing field gets a gate task as well, registered ahead of the
//! publisher in the node's path sequence. A null ancestor means the publisher never runs;
//! its gate fails instead and consumers stop waiting.

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::query::{Directive, FieldDecl, QueryDocument};
use crate::registry::{DependencyRegistry, NodeTable};
use crate::task::FieldTask;
use crate::types::FieldPath;

/// Build the registry for one execution of `query`.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub fn discover(query: &QueryDocument) -> DependencyRegistry {
    let registry = DependencyRegistry::new();

    query.walk(|field, ancestors| {
        for node in field.dependencies() {
            registry.mark_consumed(node.clone());
        }

        for directive in &field.directives {
            if let Directive::Node {
                name,
                source_convert,
            } = directive
            {
                for (depth, ancestor) in ancestors.iter().enumerate() {
                    registry.guard(name.clone(), field_task(ancestor, &ancestors[..depth]));
                }
                let task = field_task(field, ancestors).with_source_convert(source_convert.clone());
                registry.publish(name.clone(), task);
            }
        }
    });

    #[cfg(feature = "tracing")]
    debug!(tasks = registry.task_count(), "discovery finished");

    registry
}

/// Node name table of `query` without building tasks.
pub fn node_table(query: &QueryDocument) -> NodeTable {
    let mut table = NodeTable::new();
    query.walk(|field, ancestors| {
        for name in field.published_nodes() {
            let key = task_key(field, ancestors);
            let contributors = table.entry(name.clone()).or_default();
            if !contributors.contains(&key) {
                contributors.push(key);
            }
        }
    });
    table
}

/// Task for `field`: aggregate under a list, closed by the outermost list ancestor.
fn field_task(field: &FieldDecl, ancestors: &[&FieldDecl]) -> FieldTask {
    let closer = ancestors
        .iter()
        .position(|ancestor| ancestor.list)
        .map(|depth| task_key(ancestors[depth], &ancestors[..depth]));
    FieldTask::new(task_key(field, ancestors), closer.is_some()).with_closed_by(closer)
}

fn task_key(field: &FieldDecl, ancestors: &[&FieldDecl]) -> FieldPath {
    ancestors
        .iter()
        .chain(std::iter::once(&field))
        .fold(FieldPath::root(), |path, decl| path.field(decl.result_name()))
}
