//! Manager stage: routes a run on its status.

use super::{Stage, StageContext};
use crate::core::{Route, RunStatus, StageKind, StageOutput, Terminal, MANAGER_STAGE};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Maps the current run status to the next step.
///
/// Only an absent status or `NotStarted` enters planning; every other value
/// ends the run.
#[must_use]
pub fn route_status(status: Option<&RunStatus>) -> Route {
    match status {
        None | Some(RunStatus::NotStarted) => Route::Planning,
        Some(RunStatus::Generated) => Route::Terminal(Terminal::Display),
        Some(RunStatus::Edit) => Route::Terminal(Terminal::Edit),
        Some(RunStatus::Automate) => Route::Terminal(Terminal::Automate),
        Some(RunStatus::Finalized | RunStatus::Unrecognized(_)) => Route::Terminal(Terminal::Done),
    }
}

/// Entry stage of the graph. Writes nothing; the routing itself happens on
/// the conditional edge leaving this stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManagerStage;

#[async_trait]
impl Stage for ManagerStage {
    fn name(&self) -> &str {
        MANAGER_STAGE
    }

    fn kind(&self) -> StageKind {
        StageKind::Route
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let status = ctx.run().status.as_ref();
        if let Some(RunStatus::Unrecognized(value)) = status {
            warn!(
                project_id = %ctx.project_id(),
                status = %value,
                "Unrecognized run status, ending run"
            );
        }
        debug!(
            project_id = %ctx.project_id(),
            route = ?route_status(status),
            "Manager routed run"
        );
        StageOutput::ok_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::context::Instructions;
    use crate::stages::test_support::{run_context, stage_context, Mocks};

    #[test]
    fn test_routing_table() {
        assert_eq!(route_status(None), Route::Planning);
        assert_eq!(route_status(Some(&RunStatus::NotStarted)), Route::Planning);
        assert_eq!(
            route_status(Some(&RunStatus::Generated)),
            Route::Terminal(Terminal::Display)
        );
        assert_eq!(
            route_status(Some(&RunStatus::Edit)),
            Route::Terminal(Terminal::Edit)
        );
        assert_eq!(
            route_status(Some(&RunStatus::Automate)),
            Route::Terminal(Terminal::Automate)
        );
        assert_eq!(
            route_status(Some(&RunStatus::Finalized)),
            Route::Terminal(Terminal::Done)
        );
    }

    #[test]
    fn test_only_unstarted_values_reach_planning() {
        for value in ["Generated", "Edit", "Automate", "Finalized", "notstarted", "", "Draft"] {
            let status = RunStatus::from(value);
            assert_ne!(route_status(Some(&status)), Route::Planning, "status {value:?}");
        }
    }

    #[tokio::test]
    async fn test_manager_stage_has_no_side_effects() {
        let mut run = run_context(Instructions::default(), 0.0);
        run.status = Some(RunStatus::from("Archived"));
        let ctx = stage_context(run, Mocks::new(), WorkflowConfig::default());

        let output = ManagerStage.execute(&ctx).await;

        assert!(output.is_success());
        assert!(output.update.is_empty());
        assert_eq!(ManagerStage.kind(), StageKind::Route);
    }
}
