//! Core type definitions for field paths and node names.
//!
//! This module defines the identifiers used throughout the scheduler: the path of one field
//! occurrence in the result tree, the user-declared node names that fields publish under, and
//! source locations used in validation messages.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Values flowing through fields, nodes and expressions.
pub use serde_json::Value;

/// Name-to-value bindings handed to an expression evaluator.
pub type Bindings = serde_json::Map<String, Value>;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field, by result name (alias if present).
    Field(String),
    /// A position inside a list-valued parent.
    Index(usize),
}

/// Path of one field occurrence in the result tree.
///
/// Paths include list-index segments, so every occurrence of a repeated field has its own
/// path. Tasks are keyed by [`FieldPath::task_key`], which drops the indices so that all
/// occurrences of one field feed the same task.
///
/// # Examples
///
/// ```
/// use dagql::FieldPath;
///
/// let path = FieldPath::root().field("items").index(2).field("id");
/// assert_eq!(path.to_string(), "items[2].id");
/// assert_eq!(path.task_key().to_string(), "items.id");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// The empty path of the operation root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of a field directly under this one.
    #[must_use]
    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Field(name.into()));
        Self(segments)
    }

    /// Path of the list element at `index` under this one.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    /// Parse a dotted path such as `items[2].id`.
    ///
    /// Returns `None` for empty field names or malformed indices.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = Vec::new();
        if raw.is_empty() {
            return Some(Self(segments));
        }
        for part in raw.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(open) => part.split_at(open),
                None => (part, ""),
            };
            if name.is_empty() {
                return None;
            }
            segments.push(PathSegment::Field(name.to_string()));
            while !rest.is_empty() {
                let close = rest.find(']')?;
                let index = rest.get(1..close)?.parse().ok()?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return None;
                }
            }
        }
        Some(Self(segments))
    }

    /// The same path without list indices.
    pub fn task_key(&self) -> FieldPath {
        Self(
            self.0
                .iter()
                .filter(|segment| matches!(segment, PathSegment::Field(_)))
                .cloned()
                .collect(),
        )
    }

    /// Result name of the last field segment.
    pub fn result_name(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|segment| match segment {
            PathSegment::Field(name) => Some(name.as_str()),
            PathSegment::Index(_) => None,
        })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Whether `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            match segment {
                PathSegment::Field(name) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

/// Logical name under which fields publish values for other fields to consume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for NodeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Line and column of a declaration in the query text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Truthiness used by filters: `null`, `false`, `0` and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
