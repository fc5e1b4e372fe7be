//! Run lifecycle events.
//!
//! The engine reports progress through an injected [`EventSink`]. Sinks
//! never influence control flow; a sink that drops events is always valid.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event emitted when a run starts.
pub const RUN_STARTED: &str = "run.started";
/// Event emitted before a stage executes.
pub const STAGE_STARTED: &str = "stage.started";
/// Event emitted after a stage returns.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// Event emitted when planning dispatches a branch.
pub const BRANCH_DISPATCHED: &str = "branch.dispatched";
/// Event emitted when a branch chain reaches the join.
pub const BRANCH_COMPLETED: &str = "branch.completed";
/// Event emitted once the join stage has run.
pub const JOIN_COMPLETED: &str = "join.completed";
/// Event emitted when a run completes.
pub const RUN_COMPLETED: &str = "run.completed";
/// Event emitted when a run exceeds its deadline.
pub const RUN_TIMEOUT: &str = "run.timeout";
/// Event emitted when a run ends with an unexpected fault.
pub const RUN_FAILED: &str = "run.failed";
