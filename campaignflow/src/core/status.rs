//! Run status, routing and stage status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The run-level generation status.
///
/// Values other than the known set are preserved verbatim in
/// [`RunStatus::Unrecognized`] so they can be logged and routed to a
/// terminal outcome instead of being rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    /// Generation has not run yet.
    #[default]
    NotStarted,
    /// Generation finished and outputs are ready for display.
    Generated,
    /// The campaign is being edited.
    Edit,
    /// The campaign is handed to automation.
    Automate,
    /// The campaign is finalized.
    Finalized,
    /// Any other status value.
    Unrecognized(String),
}

impl RunStatus {
    /// Returns the wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::Generated => "Generated",
            Self::Edit => "Edit",
            Self::Automate => "Automate",
            Self::Finalized => "Finalized",
            Self::Unrecognized(value) => value,
        }
    }

    /// Returns true for every status other than `NotStarted`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotStarted)
    }

    /// Position in the forward-only lifecycle.
    fn rank(&self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Generated => 1,
            Self::Edit | Self::Automate => 2,
            Self::Finalized | Self::Unrecognized(_) => 3,
        }
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`.
    ///
    /// Re-asserting the current status is allowed; moving backwards is not,
    /// and nothing may move into an unrecognized value other than itself.
    #[must_use]
    pub fn can_advance_to(&self, next: &Self) -> bool {
        if self == next {
            return true;
        }
        if matches!(next, Self::Unrecognized(_)) {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "NotStarted" => Self::NotStarted,
            "Generated" => Self::Generated,
            "Edit" => Self::Edit,
            "Automate" => Self::Automate,
            "Finalized" => Self::Finalized,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<&str> for RunStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Unrecognized(value) => value,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal outcome the manager routes to once generation is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    /// Outputs are ready to display.
    Display,
    /// Hand off to the editing flow.
    Edit,
    /// Hand off to the automation flow.
    Automate,
    /// Nothing further to do.
    Done,
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Display => write!(f, "display"),
            Self::Edit => write!(f, "edit"),
            Self::Automate => write!(f, "automate"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Where the manager sends a run next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Enter the planning stage.
    Planning,
    /// Stop with the given terminal outcome.
    Terminal(Terminal),
}

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Routes between paths without side effects (manager).
    Route,
    /// Transforms campaign metadata into instructions (planning).
    Transform,
    /// Calls a generation provider.
    #[default]
    Generate,
    /// Writes a result to an external store.
    Publish,
    /// Synchronizes branches.
    Join,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Route => write!(f, "route"),
            Self::Transform => write!(f, "transform"),
            Self::Generate => write!(f, "generate"),
            Self::Publish => write!(f, "publish"),
            Self::Join => write!(f, "join"),
        }
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed (possibly with soft failures recorded).
    #[default]
    Ok,
    /// Stage had nothing to do.
    Skip,
    /// Stage stopped because the run was cancelled.
    Cancel,
    /// Stage hit a fault the run cannot absorb.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::Cancel => write!(f, "cancel"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates the run may continue.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_round_trips_known_values() {
        for value in ["NotStarted", "Generated", "Edit", "Automate", "Finalized"] {
            let status = RunStatus::from(value);
            assert!(!matches!(status, RunStatus::Unrecognized(_)));
            assert_eq!(status.as_str(), value);
        }
    }

    #[test]
    fn test_run_status_preserves_unknown_values() {
        let status = RunStatus::from("Archived");
        assert_eq!(status, RunStatus::Unrecognized("Archived".to_string()));
        assert_eq!(status.to_string(), "Archived");
        assert!(status.is_terminal());
    }

    #[test]
    fn test_run_status_serializes_as_string() {
        let json = serde_json::to_string(&RunStatus::Generated).unwrap();
        assert_eq!(json, r#""Generated""#);

        let parsed: RunStatus = serde_json::from_str(r#""weird""#).unwrap();
        assert_eq!(parsed, RunStatus::Unrecognized("weird".to_string()));
    }

    #[test]
    fn test_forward_only_transitions() {
        assert!(RunStatus::NotStarted.can_advance_to(&RunStatus::Generated));
        assert!(RunStatus::Generated.can_advance_to(&RunStatus::Generated));
        assert!(RunStatus::Generated.can_advance_to(&RunStatus::Finalized));
        assert!(!RunStatus::Generated.can_advance_to(&RunStatus::NotStarted));
        assert!(!RunStatus::Finalized.can_advance_to(&RunStatus::Generated));
        assert!(!RunStatus::NotStarted.can_advance_to(&RunStatus::from("bogus")));
    }

    #[test]
    fn test_only_not_started_is_non_terminal() {
        assert!(!RunStatus::NotStarted.is_terminal());
        assert!(RunStatus::Generated.is_terminal());
        assert!(RunStatus::Edit.is_terminal());
        assert!(RunStatus::Automate.is_terminal());
        assert!(RunStatus::Finalized.is_terminal());
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(Terminal::Display.to_string(), "display");
        assert_eq!(StageKind::Join.to_string(), "join");
        assert_eq!(StageStatus::Cancel.to_string(), "cancel");
    }
}
