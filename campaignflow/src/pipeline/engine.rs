//! Workflow engine: one deadline-bounded traversal per trigger.

use super::campaign::campaign_graph;
use super::graph::{describe_join_error, WorkflowGraph};
use super::result::{RunOutcome, RunResult};
use crate::cancellation::CancellationToken;
use crate::config::{ExecutionMode, WorkflowConfig};
use crate::context::{CampaignTrigger, RunContext};
use crate::core::FailureKind;
use crate::errors::CampaignflowError;
use crate::events::{EventSink, LoggingEventSink, RUN_COMPLETED, RUN_FAILED, RUN_STARTED, RUN_TIMEOUT};
use crate::observability::{RunSpanAttributes, SpanTimer};
use crate::providers::Services;
use crate::stages::StageContext;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives campaign runs through the workflow graph.
///
/// Each run executes on its own task under the configured deadline. When
/// the deadline passes the run's cancellation token fires, the task is
/// aborted and a [`RunResult::Timeout`] is returned; writes already issued
/// to collaborators stay committed.
#[derive(Clone)]
pub struct WorkflowEngine {
    graph: Arc<WorkflowGraph>,
    services: Arc<Services>,
    config: Arc<WorkflowConfig>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("graph", &self.graph.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Creates an engine over the campaign graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the graph fails
    /// validation.
    pub fn new(services: Services, config: WorkflowConfig) -> Result<Self, CampaignflowError> {
        config.validate()?;
        Ok(Self {
            graph: Arc::new(campaign_graph()?),
            services: Arc::new(services),
            config: Arc::new(config),
            events: Arc::new(LoggingEventSink::default()),
        })
    }

    /// Replaces the graph the engine traverses.
    #[must_use]
    pub fn with_graph(mut self, graph: WorkflowGraph) -> Self {
        self.graph = Arc::new(graph);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the branch execution mode.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        Arc::make_mut(&mut self.config).execution_mode = mode;
        self
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Runs a trigger under a fresh run id.
    pub async fn run(&self, trigger: CampaignTrigger) -> RunResult {
        self.run_as(Uuid::now_v7(), trigger).await
    }

    /// Runs a trigger under the given run id.
    pub async fn run_as(&self, run_id: Uuid, trigger: CampaignTrigger) -> RunResult {
        let run = RunContext::from_trigger(run_id, trigger);
        let project_name = run.params.project_name.clone();
        let automate_campaign = run.params.automate_campaign;
        let span = info_span!(
            "campaign_run",
            run_id = %run_id,
            project_id = %run.project_id()
        );

        let mode = self.config.execution_mode;
        let attrs = RunSpanAttributes::new()
            .with_run_id(run_id.to_string())
            .with_identity(run.identity.clone())
            .with_execution_mode(mode.to_string())
            .with_initial_status(
                run.status
                    .as_ref()
                    .map_or_else(|| "none".to_string(), ToString::to_string),
            );
        self.events.try_emit(RUN_STARTED, Some(json!(attrs.to_attributes())));

        let cancel = Arc::new(CancellationToken::new());
        let base = StageContext::new(
            Arc::new(run.clone()),
            Arc::clone(&self.services),
            Arc::clone(&self.config),
            Arc::clone(&cancel),
            Arc::clone(&self.events),
        );
        let graph = Arc::clone(&self.graph);
        let max_visits = self.config.max_stage_visits;

        let started_at = Utc::now();
        let timer = SpanTimer::start("campaign_run");
        let mut task = tokio::spawn(
            async move { graph.execute(run, base, mode, max_visits).await }.instrument(span.clone()),
        );

        let _task_guard = TaskGuard {
            abort: task.abort_handle(),
            cancel: Arc::clone(&cancel),
        };
        let deadline = self.config.deadline();
        let joined = if let Ok(joined) = tokio::time::timeout(deadline, &mut task).await {
            joined
        } else {
            cancel.cancel("workflow deadline exceeded");
            task.abort();
            let _ = task.await;
            let seconds = self.config.deadline_seconds;
            span.in_scope(|| {
                warn!(
                    failure = %FailureKind::WorkflowTimeout,
                    seconds,
                    "Run exceeded its deadline"
                );
            });
            self.events.try_emit(
                RUN_TIMEOUT,
                Some(json!({ "run_id": run_id.to_string(), "seconds": seconds })),
            );
            return RunResult::Timeout { run_id, seconds };
        };

        let traversal = match joined {
            Ok(Ok(traversal)) => traversal,
            Ok(Err(e)) => return self.fail(run_id, &span, e.to_string()),
            Err(join_error) => {
                let message = format!("run task failed: {}", describe_join_error(join_error));
                return self.fail(run_id, &span, message);
            }
        };

        let outcome = RunOutcome {
            run_id,
            status: traversal.context.status.clone(),
            terminal: traversal.terminal,
            outputs: traversal.context.outputs.clone(),
            instructions: traversal.context.instructions.clone(),
            generated_output_id: traversal.context.generated_output_id.clone(),
            failures: traversal.failures,
            stages_executed: traversal.stages_executed,
            project_name,
            automate_campaign,
            started_at,
            finished_at: Utc::now(),
            duration_ms: timer.elapsed_ms(),
        };
        span.in_scope(|| {
            info!(
                terminal = %outcome.terminal,
                outputs = outcome.outputs.produced_count(),
                failures = outcome.failures.len(),
                duration_ms = outcome.duration_ms,
                "Run completed"
            );
        });
        self.events.try_emit(
            RUN_COMPLETED,
            Some(json!({
                "run_id": run_id.to_string(),
                "terminal": outcome.terminal.to_string(),
                "status": outcome.status.as_ref().map(ToString::to_string),
                "outputs": outcome.outputs.produced_count(),
                "failures": outcome.failures.len(),
                "duration_ms": outcome.duration_ms,
            })),
        );
        RunResult::Completed(outcome)
    }

    fn fail(&self, run_id: Uuid, span: &tracing::Span, message: String) -> RunResult {
        span.in_scope(|| {
            error!(failure = %FailureKind::Unhandled, error = %message, "Run failed");
        });
        self.events.try_emit(
            RUN_FAILED,
            Some(json!({ "run_id": run_id.to_string(), "error": message })),
        );
        RunResult::Error { run_id, message }
    }
}

/// Stops the traversal task if the awaiting run future is dropped first.
struct TaskGuard {
    abort: AbortHandle,
    cancel: Arc<CancellationToken>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if !self.abort.is_finished() {
            self.cancel.cancel("run dropped");
            self.abort.abort();
        }
    }
}
