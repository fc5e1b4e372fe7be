//! Soft and hard failure taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of everything that can go wrong during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Planning call or parse failed; instructions default to null.
    Planning,
    /// A generation provider call failed; that branch outputs null.
    Generation,
    /// An artifact or record write failed.
    Publish,
    /// The join stage could not link the output record.
    Link,
    /// The video job never reached `completed`.
    PollTimeout,
    /// The run exceeded its overall deadline.
    WorkflowTimeout,
    /// An unexpected fault escaped a stage.
    Unhandled,
}

impl FailureKind {
    /// Returns true if the run continues after this failure.
    #[must_use]
    pub fn is_soft(self) -> bool {
        !matches!(self, Self::WorkflowTimeout | Self::Unhandled)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Planning => "planning_failure",
            Self::Generation => "generation_failure",
            Self::Publish => "publish_failure",
            Self::Link => "link_failure",
            Self::PollTimeout => "poll_timeout",
            Self::WorkflowTimeout => "workflow_timeout",
            Self::Unhandled => "unhandled_exception",
        };
        f.write_str(label)
    }
}

/// A failure that a stage absorbed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftFailure {
    /// What went wrong.
    pub kind: FailureKind,
    /// The stage that absorbed it.
    pub stage: String,
    /// Human-readable detail.
    pub message: String,
}

impl SoftFailure {
    /// Creates a new soft failure record.
    #[must_use]
    pub fn new(kind: FailureKind, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage: stage.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_and_hard_kinds() {
        assert!(FailureKind::Planning.is_soft());
        assert!(FailureKind::Link.is_soft());
        assert!(FailureKind::PollTimeout.is_soft());
        assert!(!FailureKind::WorkflowTimeout.is_soft());
        assert!(!FailureKind::Unhandled.is_soft());
    }

    #[test]
    fn test_failure_labels() {
        assert_eq!(FailureKind::Publish.to_string(), "publish_failure");
        let json = serde_json::to_string(&FailureKind::PollTimeout).unwrap();
        assert_eq!(json, r#""poll_timeout""#);
    }
}
