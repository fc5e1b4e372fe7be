//! Video branch: submit a job, poll until it completes, publish the URL.

use super::{bounded, Stage, StageContext};
use crate::context::ContextUpdate;
use crate::core::{FailureKind, StageOutput, VIDEO_STAGE};
use crate::pipeline::poll::{poll_until, PollOutcome};
use crate::providers::{JobFilter, OutputField};
use async_trait::async_trait;
use tracing::{info, warn};

/// Drives the asynchronous video provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct VideoStage;

impl VideoStage {
    fn null_output(ctx: &StageContext, kind: FailureKind, message: String) -> StageOutput {
        warn!(
            project_id = %ctx.project_id(),
            branch = "video",
            failure = %kind,
            error = %message,
            "Video branch produced no output"
        );
        StageOutput::ok(ContextUpdate::new().with_video_output(None))
            .with_failure(kind, VIDEO_STAGE, message)
    }
}

#[async_trait]
impl Stage for VideoStage {
    fn name(&self) -> &str {
        VIDEO_STAGE
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let Some(prompt) = ctx.run().instructions.video_prompt.as_deref() else {
            return StageOutput::skip("no video instruction")
                .with_update(ContextUpdate::new().with_video_output(None));
        };
        let services = ctx.services();
        let brand_id = services.video_brand_id.as_str();

        let job_id = match bounded(
            ctx.config().provider_timeout(),
            "video",
            services.video.create(brand_id, prompt),
        )
        .await
        {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => {
                return Self::null_output(
                    ctx,
                    FailureKind::Generation,
                    "video provider returned no job id".to_string(),
                )
            }
            Err(e) => return Self::null_output(ctx, FailureKind::Generation, e.to_string()),
        };
        info!(project_id = %ctx.project_id(), job_id = %job_id, "Video job submitted");

        let filter = JobFilter::default();
        let provider_timeout = ctx.config().provider_timeout();
        let outcome = poll_until(&ctx.config().poll, ctx.cancel_token(), |attempt| {
            let job_id = job_id.as_str();
            let filter = &filter;
            async move {
                let jobs = bounded(
                    provider_timeout,
                    "video",
                    services.video.list_jobs(brand_id, filter),
                )
                .await?;
                tracing::debug!(attempt, jobs = jobs.len(), "Video status checked");
                Ok(jobs
                    .iter()
                    .find_map(|job| job.completed_url(job_id))
                    .map(str::to_string))
            }
        })
        .await;

        let url = match outcome {
            PollOutcome::Ready { value, attempts } => {
                info!(
                    project_id = %ctx.project_id(),
                    job_id = %job_id,
                    attempts,
                    "Video job completed"
                );
                value
            }
            PollOutcome::Exhausted { attempts } => {
                return Self::null_output(
                    ctx,
                    FailureKind::PollTimeout,
                    format!("job {job_id} not completed after {attempts} checks"),
                )
            }
            PollOutcome::Cancelled { attempts } => {
                return StageOutput::cancel(format!(
                    "run cancelled while polling job {job_id} after {attempts} checks"
                ));
            }
        };

        let mut output = StageOutput::ok(ContextUpdate::new().with_video_output(Some(url.clone())));
        if let Err(e) = bounded(
            ctx.config().store_timeout(),
            "projects",
            services
                .projects
                .upsert_output_field(ctx.project_id(), OutputField::Video, &url),
        )
        .await
        {
            warn!(
                project_id = %ctx.project_id(),
                branch = "video",
                failure = %FailureKind::Publish,
                error = %e,
                "Storing video URL failed"
            );
            output = output.with_failure(FailureKind::Publish, VIDEO_STAGE, e.to_string());
        }
        output
    }
}
