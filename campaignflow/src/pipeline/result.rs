//! Run results reported by the engine.

use crate::context::{GeneratedOutputs, Instructions};
use crate::core::{FailureKind, RunStatus, SoftFailure, Terminal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// A run that reached a terminal route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Run identifier.
    pub run_id: Uuid,
    /// Final run status.
    pub status: Option<RunStatus>,
    /// Terminal route the manager chose.
    pub terminal: Terminal,
    /// Outputs produced by the branches.
    pub outputs: GeneratedOutputs,
    /// Instructions planning produced.
    pub instructions: Instructions,
    /// Generated-output record linked by the join stage.
    pub generated_output_id: Option<String>,
    /// Soft failures absorbed during the run.
    pub failures: Vec<SoftFailure>,
    /// Stages executed, in completion order.
    pub stages_executed: Vec<String>,
    /// Project name from the trigger.
    pub project_name: String,
    /// Automation flag from the trigger.
    pub automate_campaign: Option<bool>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

impl RunOutcome {
    /// Returns true if any soft failure of `kind` was recorded.
    #[must_use]
    pub fn has_failure(&self, kind: FailureKind) -> bool {
        self.failures.iter().any(|f| f.kind == kind)
    }
}

/// The terminal result of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunResult {
    /// The traversal finished; individual outputs may still be absent.
    Completed(RunOutcome),
    /// The run exceeded its deadline and in-flight work was cancelled.
    Timeout {
        /// Run identifier.
        run_id: Uuid,
        /// Configured deadline in seconds.
        seconds: f64,
    },
    /// An unexpected fault ended the run.
    Error {
        /// Run identifier.
        run_id: Uuid,
        /// Description of the fault.
        message: String,
    },
}

impl RunResult {
    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Completed(outcome) => outcome.run_id,
            Self::Timeout { run_id, .. } | Self::Error { run_id, .. } => *run_id,
        }
    }

    /// Returns true if the traversal completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns the outcome of a completed run.
    #[must_use]
    pub fn outcome(&self) -> Option<&RunOutcome> {
        match self {
            Self::Completed(outcome) => Some(outcome),
            Self::Timeout { .. } | Self::Error { .. } => None,
        }
    }

    /// Returns the error message of a failed or timed-out run.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Completed(_) => None,
            Self::Timeout { seconds, .. } => Some(format!("Workflow timed out after {seconds}s")),
            Self::Error { message, .. } => Some(message.clone()),
        }
    }

    /// Renders the flat result shape callers consume: the three outputs and
    /// status on completion, or an `error` entry otherwise.
    #[must_use]
    pub fn to_dict(&self) -> Value {
        match self {
            Self::Completed(outcome) => json!({
                "text": outcome.outputs.text,
                "image": outcome.outputs.image,
                "video": outcome.outputs.video,
                "status": outcome.status.as_ref().map(RunStatus::as_str),
            }),
            Self::Timeout { .. } | Self::Error { .. } => {
                json!({ "error": self.error_message() })
            }
        }
    }
}
