//! Join stage: links the generated-output record and marks the run generated.

use super::{bounded, Stage, StageContext};
use crate::context::ContextUpdate;
use crate::core::{FailureKind, RunStatus, StageKind, StageOutput, JOIN_STAGE};
use crate::providers::LinkOutcome;
use async_trait::async_trait;
use tracing::{info, warn};

/// Runs once every dispatched branch has returned.
///
/// Always advances the status to `Generated`; a failed link is recorded
/// but never blocks the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct JoinStage;

#[async_trait]
impl Stage for JoinStage {
    fn name(&self) -> &str {
        JOIN_STAGE
    }

    fn kind(&self) -> StageKind {
        StageKind::Join
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let project_id = ctx.project_id();
        let projects = &ctx.services().projects;
        let limit = ctx.config().store_timeout();

        let (output_id, link_error) =
            match bounded(limit, "projects", projects.link_generated_output(project_id)).await {
                Ok(LinkOutcome::NoRecord) => {
                    info!(project_id = %project_id, "No generated output to link");
                    (None, None)
                }
                Ok(LinkOutcome::Linked { output_id }) => {
                    info!(
                        project_id = %project_id,
                        output_id = ?output_id,
                        "Generated output linked to project"
                    );
                    (output_id, None)
                }
                Err(e) => (None, Some(e)),
            };

        let output = StageOutput::ok(
            ContextUpdate::new()
                .with_generated_output_id(output_id)
                .with_status(RunStatus::Generated),
        );
        match link_error {
            None => output,
            Some(e) => {
                warn!(
                    project_id = %project_id,
                    failure = %FailureKind::Link,
                    error = %e,
                    "Linking generated output failed"
                );
                output.with_failure(FailureKind::Link, JOIN_STAGE, e.to_string())
            }
        }
    }
}
