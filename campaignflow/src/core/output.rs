//! Stage output type with factory methods.

use super::{FailureKind, SoftFailure, StageStatus};
use crate::context::ContextUpdate;

/// The output of a stage execution.
///
/// A stage never mutates the run context directly; it returns the partial
/// update it wants merged, together with any failures it absorbed.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// The status of the stage execution.
    pub status: StageStatus,
    /// Fields to merge into the run context.
    pub update: ContextUpdate,
    /// Failures absorbed by the stage.
    pub failures: Vec<SoftFailure>,
    /// Error message (for failed executions).
    pub error: Option<String>,
    /// Skip reason (for skipped executions).
    pub skip_reason: Option<String>,
    /// Cancel reason (for cancelled executions).
    pub cancel_reason: Option<String>,
}

impl StageOutput {
    /// Creates a successful output carrying an update.
    #[must_use]
    pub fn ok(update: ContextUpdate) -> Self {
        Self {
            status: StageStatus::Ok,
            update,
            ..Self::default()
        }
    }

    /// Creates a successful output with no update.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::default()
    }

    /// Creates a skip output with a reason.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skip,
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Creates a cancel output with a reason.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Cancel,
            cancel_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Creates a failure output with an error message.
    ///
    /// A failed stage ends the run with an error result.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Fail,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Replaces the update carried by the output.
    #[must_use]
    pub fn with_update(mut self, update: ContextUpdate) -> Self {
        self.update = update;
        self
    }

    /// Records a failure the stage absorbed.
    #[must_use]
    pub fn with_failure(
        mut self,
        kind: FailureKind,
        stage: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failures.push(SoftFailure::new(kind, stage, message));
        self
    }

    /// Returns true if the run may continue past this output.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the stage absorbed at least one failure.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_output() {
        let output = StageOutput::ok(ContextUpdate::new().with_text_output(Some("copy".into())));
        assert_eq!(output.status, StageStatus::Ok);
        assert!(output.is_success());
        assert!(!output.update.is_empty());
    }

    #[test]
    fn test_skip_output_is_success() {
        let output = StageOutput::skip("no instruction");
        assert!(output.is_success());
        assert_eq!(output.skip_reason.as_deref(), Some("no instruction"));
        assert!(output.update.is_empty());
    }

    #[test]
    fn test_fail_and_cancel_are_not_success() {
        assert!(!StageOutput::fail("boom").is_success());
        assert!(!StageOutput::cancel("deadline").is_success());
    }

    #[test]
    fn test_with_failure_keeps_status() {
        let output = StageOutput::ok_empty().with_failure(
            FailureKind::Generation,
            "text",
            "provider down",
        );
        assert!(output.is_success());
        assert!(output.has_failures());
        assert_eq!(output.failures[0].kind, FailureKind::Generation);
    }
}
