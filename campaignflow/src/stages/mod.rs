//! Stage trait and the campaign stages.
//!
//! Stages are the units of work the workflow graph schedules. Each one
//! reads an immutable snapshot of the run context and returns the partial
//! update it wants merged; none of them touches the context directly.

mod image;
mod join;
mod manager;
mod planning;
mod text;
mod video;

pub use image::{
    build_image_instruction, ImageGenerateStage, ImagePublishStage, DISCOUNT_OVERLAY_DIRECTIVE,
    IMAGE_PERSONA,
};
pub use join::JoinStage;
pub use manager::{route_status, ManagerStage};
pub use planning::{
    build_campaign_brief, parse_instructions, strip_code_fences, PlanningStage, PLANNER_PERSONA,
};
pub use text::{TextStage, COPYWRITER_PERSONA};
pub use video::VideoStage;

use crate::cancellation::CancellationToken;
use crate::config::WorkflowConfig;
use crate::context::RunContext;
use crate::core::{StageKind, StageOutput};
use crate::errors::ProviderError;
use crate::events::EventSink;
use crate::providers::Services;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A unit of work in the workflow graph.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns the kind of work the stage performs.
    fn kind(&self) -> StageKind {
        StageKind::Generate
    }

    /// Executes the stage against a context snapshot.
    async fn execute(&self, ctx: &StageContext) -> StageOutput;
}

/// Everything a stage may read while it executes.
#[derive(Clone)]
pub struct StageContext {
    run: Arc<RunContext>,
    services: Arc<Services>,
    config: Arc<WorkflowConfig>,
    cancel: Arc<CancellationToken>,
    events: Arc<dyn EventSink>,
    stage_name: String,
}

impl StageContext {
    /// Creates a stage context.
    #[must_use]
    pub fn new(
        run: Arc<RunContext>,
        services: Arc<Services>,
        config: Arc<WorkflowConfig>,
        cancel: Arc<CancellationToken>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            run,
            services,
            config,
            cancel,
            events,
            stage_name: String::new(),
        }
    }

    /// Returns a copy scoped to the named stage.
    #[must_use]
    pub fn for_stage(&self, name: impl Into<String>) -> Self {
        Self {
            stage_name: name.into(),
            ..self.clone()
        }
    }

    /// Returns a copy reading a newer context snapshot.
    #[must_use]
    pub fn with_run(&self, run: Arc<RunContext>) -> Self {
        Self {
            run,
            ..self.clone()
        }
    }

    /// Returns the run context snapshot.
    #[must_use]
    pub fn run(&self) -> &RunContext {
        &self.run
    }

    /// Returns the injected collaborators.
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Returns the workflow configuration.
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Returns the run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the executing stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the project id of the run.
    #[must_use]
    pub fn project_id(&self) -> &str {
        self.run.project_id()
    }

    /// Emits an event without awaiting the sink.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.try_emit(event_type, data);
    }
}

impl Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("run_id", &self.run.run_id)
            .field("stage", &self.stage_name)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Runs a provider call under a time limit.
pub(crate) async fn bounded<T, F>(limit: Duration, provider: &str, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(ProviderError::timeout(provider, limit.as_secs_f64())))
}
