//! Workflow graph, engine and run results.
//!
//! This module provides:
//! - [`WorkflowGraph`], an interpreter over named stages and routed edges
//! - [`GraphBuilder`] with structural validation
//! - [`campaign_graph`], the manager → planning → branches → join graph
//! - [`WorkflowEngine`], which runs one traversal under a deadline
//! - The bounded [`poll`] loop used by long-running providers

mod builder;
mod campaign;
mod engine;
mod graph;
pub mod poll;
mod result;

#[cfg(test)]
mod integration_tests;

pub use builder::GraphBuilder;
pub use campaign::{campaign_graph, CAMPAIGN_GRAPH};
pub use engine::WorkflowEngine;
pub(crate) use graph::describe_join_error;
pub use graph::{Edge, FanOutRouter, GraphRun, Next, Router, WorkflowGraph};
pub use poll::{poll_until, PollOutcome};
pub use result::{RunOutcome, RunResult};
