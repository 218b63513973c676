//! Parsed query model consumed by discovery, validation and the resolution hooks.
//!
//! Directive syntax is parsed by the host; what reaches this crate is the field tree with
//! each field's declared arguments and its dependency directives, in declaration order.
//! Every type here deserializes from JSON so a host can hand over a query description
//! without linking against these types directly.

use serde::{Deserialize, Serialize};

use crate::types::{Bindings, NodeName, SourceLocation, Value};

/// How a `transform` directive rewrites its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformOp {
    /// Evaluate once against the whole argument value.
    Map,
    /// Keep the list elements whose expression is truthy.
    Filter,
    /// Evaluate once per list element, replacing it.
    ListMap,
}

/// A dependency directive attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "camelCase")]
pub enum Directive {
    /// Publish this field's value under `name`.
    #[serde(rename_all = "camelCase")]
    Node {
        name: NodeName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_convert: Option<String>,
    },

    /// Bind the value of `node` to the input `argument` before resolving.
    Link { node: NodeName, argument: String },

    /// Rewrite `argument` through `expression` before resolving.
    #[serde(rename_all = "camelCase")]
    Transform {
        #[serde(rename = "argumentName")]
        argument: String,
        operate_type: TransformOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dependency_source: Option<NodeName>,
        expression: String,
    },

    /// Replace the fetched value with `expression`.
    #[serde(rename_all = "camelCase")]
    Map {
        expression: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dependency_source: Option<NodeName>,
    },

    /// Drop fetched list elements for which `predicate` is falsy.
    Filter { predicate: String },
}

impl Directive {
    pub fn node(name: impl Into<NodeName>) -> Self {
        Directive::Node {
            name: name.into(),
            source_convert: None,
        }
    }

    pub fn node_converted(name: impl Into<NodeName>, source_convert: impl Into<String>) -> Self {
        Directive::Node {
            name: name.into(),
            source_convert: Some(source_convert.into()),
        }
    }

    pub fn link(node: impl Into<NodeName>, argument: impl Into<String>) -> Self {
        Directive::Link {
            node: node.into(),
            argument: argument.into(),
        }
    }

    pub fn transform(
        argument: impl Into<String>,
        operate_type: TransformOp,
        dependency_source: Option<NodeName>,
        expression: impl Into<String>,
    ) -> Self {
        Directive::Transform {
            argument: argument.into(),
            operate_type,
            dependency_source,
            expression: expression.into(),
        }
    }

    pub fn map(expression: impl Into<String>, dependency_source: Option<NodeName>) -> Self {
        Directive::Map {
            expression: expression.into(),
            dependency_source,
        }
    }

    pub fn filter(predicate: impl Into<String>) -> Self {
        Directive::Filter {
            predicate: predicate.into(),
        }
    }

    /// The node this directive consumes, if any.
    pub fn dependency(&self) -> Option<&NodeName> {
        match self {
            Directive::Link { node, .. } => Some(node),
            Directive::Transform {
                dependency_source, ..
            }
            | Directive::Map {
                dependency_source, ..
            } => dependency_source.as_ref(),
            Directive::Node { .. } | Directive::Filter { .. } => None,
        }
    }
}

/// One field of the query, with its selections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Arguments written in the query, with their literal or variable-substituted values.
    #[serde(default)]
    pub arguments: Bindings,
    #[serde(default)]
    pub directives: Vec<Directive>,
    /// Whether the field's type is a list.
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub selections: Vec<FieldDecl>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    #[must_use]
    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    #[must_use]
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = SourceLocation::new(line, column);
        self
    }

    #[must_use]
    pub fn select(mut self, field: FieldDecl) -> Self {
        self.selections.push(field);
        self
    }

    /// Alias if present, otherwise the field name.
    pub fn result_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn links(&self) -> impl Iterator<Item = (&NodeName, &str)> {
        self.directives.iter().filter_map(|directive| match directive {
            Directive::Link { node, argument } => Some((node, argument.as_str())),
            _ => None,
        })
    }

    pub fn published_nodes(&self) -> impl Iterator<Item = &NodeName> {
        self.directives.iter().filter_map(|directive| match directive {
            Directive::Node { name, .. } => Some(name),
            _ => None,
        })
    }

    /// Nodes this field waits on before it can resolve.
    pub fn dependencies(&self) -> impl Iterator<Item = &NodeName> {
        self.directives.iter().filter_map(Directive::dependency)
    }

    /// Whether resolving this field needs the argument resolver at all.
    pub fn needs_resolution_hook(&self) -> bool {
        self.directives
            .iter()
            .any(|directive| !matches!(directive, Directive::Node { .. }))
    }
}

/// The operation's top-level selections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDocument {
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

impl QueryDocument {
    pub fn new(fields: Vec<FieldDecl>) -> Self {
        Self { fields }
    }

    /// Visit every field depth-first, parents before children.
    pub fn walk<'a>(&'a self, mut visit: impl FnMut(&'a FieldDecl, &[&'a FieldDecl])) {
        fn go<'a>(
            field: &'a FieldDecl,
            ancestors: &mut Vec<&'a FieldDecl>,
            visit: &mut impl FnMut(&'a FieldDecl, &[&'a FieldDecl]),
        ) {
            visit(field, ancestors);
            ancestors.push(field);
            for child in &field.selections {
                go(child, ancestors, visit);
            }
            ancestors.pop();
        }

        let mut ancestors = Vec::new();
        for field in &self.fields {
            go(field, &mut ancestors, &mut visit);
        }
    }
}
