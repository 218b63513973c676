//! Test helpers for dagql's integration tests.
//!
//! This crate is not meant for public use and offers no stability guarantees.
//!
//! - [`ScriptedEvaluator`]: an [`Evaluator`](dagql::Evaluator) backed by a table of
//!   expression -> closure, falling back to plain binding lookup.
//! - [`MockHost`]: a small host execution engine that resolves a query tree concurrently and
//!   drives the [`ExecutionHooks`](dagql::ExecutionHooks) the way a real engine would.

#![cfg(not(tarpaulin_include))]

mod evaluator;
mod host;

pub use evaluator::{binding, ScriptedEvaluator};
pub use host::{ExecutionResult, MockHost};
