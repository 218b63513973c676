//! Static validation of dependency declarations.
//!
//! Runs once before execution. For every field:
//!
//! - a `link` must target a declared argument, name a published node, and not bind an
//!   argument another `link` on the same field already binds;
//! - a `transform` must target a declared argument and, if it has a dependency source,
//!   name a published node;
//! - a `map` dependency source must name a published node.
//!
//! The scan never stops early; all errors are collected.
//!
//! # Cycles
//!
//! Every field resolves, then completes. A field resolves after its parent resolves and
//! completes after its children complete. A field joining node `N` resolves only after
//! each task in the path sequence of `N` completes: every publisher of `N`, each publisher
//! ancestor that does not enclose the joining field, and the list closing an aggregate
//! publisher. A cycle in these waits blocks forever at run time, so it is reported as
//! [`ValidationError::DependencyCycle`] naming the joined nodes in order. Detection
//! reports at least one cycle per strongly connected group of events.

use std::collections::{HashMap, HashSet};

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::error::ValidationError;
use crate::query::{Directive, FieldDecl, QueryDocument};
use crate::registry::NodeTable;
use crate::types::{FieldPath, NodeName};

/// Validate `query` against its node table with cycle detection enabled.
pub fn validate(query: &QueryDocument, nodes: &NodeTable) -> Vec<ValidationError> {
    Validator::new().validate(query, nodes)
}

/// Configurable dependency validator.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    detect_cycles: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self {
            detect_cycles: true,
        }
    }

    #[must_use]
    pub fn detect_cycles(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }

    /// Collect every error in `query`. Pure: equal inputs give equal outputs.
    pub fn validate(&self, query: &QueryDocument, nodes: &NodeTable) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        query.walk(|field, _| check_field(field, nodes, &mut errors));

        if self.detect_cycles {
            errors.extend(EventGraph::build(query, nodes).cycles());
        }

        #[cfg(feature = "tracing")]
        debug!(error_count = errors.len(), "validated dependency declarations");

        errors
    }
}

fn check_field(field: &FieldDecl, nodes: &NodeTable, errors: &mut Vec<ValidationError>) {
    let declared: HashSet<&str> = field.arguments.keys().map(String::as_str).collect();
    let mut bound: HashSet<&str> = HashSet::new();

    let undeclared = |argument: &str| ValidationError::UndeclaredArgument {
        field: field.result_name().to_string(),
        argument: argument.to_string(),
        location: field.location,
    };
    let unknown = |node: &NodeName| ValidationError::UnknownNode {
        field: field.result_name().to_string(),
        node: node.clone(),
        location: field.location,
    };

    for directive in &field.directives {
        match directive {
            Directive::Link { node, argument } => {
                if !declared.contains(argument.as_str()) {
                    errors.push(undeclared(argument.as_str()));
                    continue;
                }
                if !nodes.contains_key(node) {
                    errors.push(unknown(node));
                    continue;
                }
                if !bound.insert(argument.as_str()) {
                    errors.push(ValidationError::DuplicateArgumentBinding {
                        field: field.result_name().to_string(),
                        argument: argument.clone(),
                        location: field.location,
                    });
                }
            }
            Directive::Transform {
                argument,
                dependency_source,
                ..
            } => {
                if !declared.contains(argument.as_str()) {
                    errors.push(undeclared(argument.as_str()));
                    continue;
                }
                if let Some(node) = dependency_source {
                    if !nodes.contains_key(node) {
                        errors.push(unknown(node));
                    }
                }
            }
            Directive::Map {
                dependency_source: Some(node),
                ..
            } => {
                if !nodes.contains_key(node) {
                    errors.push(unknown(node));
                }
            }
            Directive::Map { .. } | Directive::Node { .. } | Directive::Filter { .. } => {}
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Node joined by a consumer edge, and the consuming field.
type Label<'q> = (&'q NodeName, usize);

struct FieldInfo<'q> {
    decl: &'q FieldDecl,
    parent: Option<usize>,
    key: FieldPath,
}

/// Wait-for graph over field events.
///
/// Each field has two events: *resolved* (its resolver may run) and *completed* (its
/// task is settled). An edge `a -> b` means `a` cannot happen before `b`.
#[derive(Default)]
struct EventGraph<'q> {
    fields: Vec<FieldInfo<'q>>,
    edges: Vec<Vec<(usize, Option<Label<'q>>)>>,
}

fn resolved(field: usize) -> usize {
    field * 2
}

fn completed(field: usize) -> usize {
    field * 2 + 1
}

impl<'q> EventGraph<'q> {
    fn build(query: &'q QueryDocument, nodes: &NodeTable) -> Self {
        let mut graph = Self::default();
        for field in &query.fields {
            graph.add_field(field, None, &FieldPath::root());
        }

        let by_key: HashMap<&FieldPath, usize> = graph
            .fields
            .iter()
            .enumerate()
            .rev()
            .map(|(index, info)| (&info.key, index))
            .collect();

        let mut consumer_edges = Vec::new();
        for (consumer, info) in graph.fields.iter().enumerate() {
            for node in info.decl.dependencies() {
                let Some(producers) = nodes.get(node) else {
                    continue;
                };
                let mut targets = Vec::new();
                for producer in producers.iter().filter_map(|key| by_key.get(key)) {
                    graph.waits_of(consumer, *producer, &mut targets);
                }
                for target in targets {
                    consumer_edges.push((resolved(consumer), target, (node, consumer)));
                }
            }
        }
        for (from, to, label) in consumer_edges {
            graph.edges[from].push((to, Some(label)));
        }
        graph
    }

    /// Structural edges: a child resolves after its parent, a field completes after it
    /// resolves and after its children complete.
    fn add_field(&mut self, decl: &'q FieldDecl, parent: Option<usize>, parent_key: &FieldPath) {
        let index = self.fields.len();
        let key = parent_key.field(decl.result_name());
        self.fields.push(FieldInfo {
            decl,
            parent,
            key: key.clone(),
        });
        self.edges.push(Vec::new());
        self.edges.push(Vec::new());

        self.edges[completed(index)].push((resolved(index), None));
        if let Some(parent) = parent {
            self.edges[resolved(index)].push((resolved(parent), None));
            self.edges[completed(parent)].push((completed(index), None));
        }
        for child in &decl.selections {
            self.add_field(child, Some(index), &key);
        }
    }

    /// Completion events `consumer` waits for when joining on `producer`: the producer, its
    /// ancestors not enclosing the consumer, and the list closing an aggregate producer.
    fn waits_of(&self, consumer: usize, producer: usize, targets: &mut Vec<usize>) {
        let mut push = |event: usize| {
            if !targets.contains(&event) {
                targets.push(event);
            }
        };
        push(completed(producer));

        let consumer_key = &self.fields[consumer].key;
        let mut closer = None;
        let mut ancestor = self.fields[producer].parent;
        while let Some(index) = ancestor {
            let info = &self.fields[index];
            if !consumer_key.starts_with(&info.key) {
                push(completed(index));
            }
            if info.decl.list {
                closer = Some(index);
            }
            ancestor = info.parent;
        }
        if let Some(closer) = closer {
            push(completed(closer));
        }
    }

    fn cycles(&self) -> Vec<ValidationError> {
        let mut marks = vec![None; self.edges.len()];
        let mut stack = Vec::new();
        let mut labels = Vec::new();
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        for start in 0..self.edges.len() {
            if marks[start].is_none() {
                let mut search = CycleSearch {
                    marks: &mut marks,
                    stack: &mut stack,
                    labels: &mut labels,
                    seen: &mut seen,
                    errors: &mut errors,
                };
                self.visit(start, &mut search);
            }
        }
        errors
    }

    fn visit(&self, event: usize, search: &mut CycleSearch<'_, 'q>) {
        search.marks[event] = Some(Mark::Visiting);
        search.stack.push(event);

        for &(next, label) in &self.edges[event] {
            match search.marks[next] {
                Some(Mark::Visiting) => {
                    let Some(start) = search.stack.iter().position(|e| *e == next) else {
                        continue;
                    };
                    let joins: Vec<Label<'q>> = search.labels[start..]
                        .iter()
                        .chain(std::iter::once(&label))
                        .filter_map(|label| *label)
                        .collect();
                    self.report(&joins, search);
                }
                Some(Mark::Done) => {}
                None => {
                    search.labels.push(label);
                    self.visit(next, search);
                    search.labels.pop();
                }
            }
        }

        search.stack.pop();
        search.marks[event] = Some(Mark::Done);
    }

    fn report(&self, joins: &[Label<'q>], search: &mut CycleSearch<'_, 'q>) {
        let Some(&(_, consumer)) = joins.last() else {
            return;
        };
        let members: Vec<&'q NodeName> = joins.iter().map(|(node, _)| *node).collect();
        let canonical = canonical(&members);
        if !search.seen.insert(canonical.clone()) {
            return;
        }

        let mut cycle: Vec<NodeName> = canonical.iter().map(|node| (*node).clone()).collect();
        if let Some(first) = canonical.first() {
            cycle.push((*first).clone());
        }
        let field = self.fields[consumer].decl;
        search.errors.push(ValidationError::DependencyCycle {
            field: field.result_name().to_string(),
            cycle,
            location: field.location,
        });
    }
}

struct CycleSearch<'s, 'q> {
    marks: &'s mut Vec<Option<Mark>>,
    stack: &'s mut Vec<usize>,
    /// Label of the edge from `stack[i]` to `stack[i + 1]`.
    labels: &'s mut Vec<Option<Label<'q>>>,
    seen: &'s mut HashSet<Vec<&'q NodeName>>,
    errors: &'s mut Vec<ValidationError>,
}

/// Rotation of a cycle starting at its smallest member.
fn canonical<'q>(members: &[&'q NodeName]) -> Vec<&'q NodeName> {
    let start = members
        .iter()
        .enumerate()
        .min_by_key(|(_, node)| **node)
        .map_or(0, |(index, _)| index);
    members[start..]
        .iter()
        .chain(members[..start].iter())
        .copied()
        .collect()
}
