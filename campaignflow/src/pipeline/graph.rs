//! Workflow graph interpreter.
//!
//! A graph maps stage names to handlers and each stage to exactly one
//! outgoing edge. The driver loop follows static edges, asks conditional
//! routers where to go next, and resolves fan-out edges into branch chains
//! that run to the configured join stage before the join itself executes.

use crate::config::ExecutionMode;
use crate::context::{ContextUpdate, RunContext};
use crate::core::{Branch, SoftFailure, StageStatus, Terminal};
use crate::errors::CampaignflowError;
use crate::events::{BRANCH_COMPLETED, BRANCH_DISPATCHED, JOIN_COMPLETED, STAGE_COMPLETED, STAGE_STARTED};
use crate::observability::{SpanTimer, StageSpanAttributes};
use crate::stages::{Stage, StageContext};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info_span, Instrument};

/// Where a conditional router sends the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Continue with the named stage.
    Stage(String),
    /// Stop with a terminal outcome.
    End(Terminal),
}

/// Picks the next step from the current context.
pub type Router = Arc<dyn Fn(&RunContext) -> Next + Send + Sync>;

/// Picks the branch entry stages to dispatch from the current context.
pub type FanOutRouter = Arc<dyn Fn(&RunContext) -> Vec<String> + Send + Sync>;

/// The outgoing edge of a stage.
#[derive(Clone)]
pub enum Edge {
    /// Always continue with the named stage.
    Static(String),
    /// Ask a router; `targets` lists every stage it may name.
    Conditional {
        /// The routing function.
        router: Router,
        /// Stages the router may return.
        targets: Vec<String>,
    },
    /// Run the selected branches to `join`, then execute `join`.
    FanOut {
        /// The dispatch function.
        router: FanOutRouter,
        /// Branch entry stages the router may return.
        branches: Vec<String>,
        /// The stage every branch converges on.
        join: String,
    },
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(next) => f.debug_tuple("Static").field(next).finish(),
            Self::Conditional { targets, .. } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .finish_non_exhaustive(),
            Self::FanOut { branches, join, .. } => f
                .debug_struct("FanOut")
                .field("branches", branches)
                .field("join", join)
                .finish_non_exhaustive(),
        }
    }
}

/// The result of a completed traversal.
#[derive(Debug, Clone)]
pub struct GraphRun {
    /// Terminal outcome chosen by the last router.
    pub terminal: Terminal,
    /// Final run context.
    pub context: RunContext,
    /// Soft failures absorbed along the way, in completion order.
    pub failures: Vec<SoftFailure>,
    /// Stages executed, in completion order.
    pub stages_executed: Vec<String>,
}

/// What one branch chain produced.
#[derive(Debug)]
struct BranchRun {
    entry: String,
    update: ContextUpdate,
    failures: Vec<SoftFailure>,
    executed: Vec<String>,
}

/// A validated stage graph. Built with [`crate::pipeline::GraphBuilder`].
pub struct WorkflowGraph {
    name: String,
    entry: String,
    stages: HashMap<String, Arc<dyn Stage>>,
    edges: HashMap<String, Edge>,
    stage_order: Vec<String>,
}

impl fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("stages", &self.stage_order)
            .field("edges", &self.edges)
            .finish()
    }
}

impl WorkflowGraph {
    pub(crate) fn new(
        name: String,
        entry: String,
        stages: HashMap<String, Arc<dyn Stage>>,
        edges: HashMap<String, Edge>,
        stage_order: Vec<String>,
    ) -> Self {
        Self {
            name,
            entry,
            stages,
            edges,
            stage_order,
        }
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entry stage.
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns stage names in insertion order.
    #[must_use]
    pub fn stage_names(&self) -> &[String] {
        &self.stage_order
    }

    /// Returns the outgoing edge of a stage.
    #[must_use]
    pub fn edge(&self, stage: &str) -> Option<&Edge> {
        self.edges.get(stage)
    }

    fn stage(&self, name: &str) -> Result<&Arc<dyn Stage>, CampaignflowError> {
        self.stages
            .get(name)
            .ok_or_else(|| CampaignflowError::Internal(format!("unknown stage '{name}'")))
    }

    /// Resolves the stages of a branch, following static edges from
    /// `entry` until `join`.
    pub(crate) fn branch_chain(
        &self,
        entry: &str,
        join: &str,
    ) -> Result<Vec<Arc<dyn Stage>>, CampaignflowError> {
        let mut chain = Vec::new();
        let mut current = entry.to_string();
        while current != join {
            if chain.len() >= self.stages.len() {
                return Err(CampaignflowError::Internal(format!(
                    "branch '{entry}' never reaches '{join}'"
                )));
            }
            chain.push(Arc::clone(self.stage(&current)?));
            current = match self.edges.get(&current) {
                Some(Edge::Static(next)) => next.clone(),
                _ => {
                    return Err(CampaignflowError::Internal(format!(
                        "branch '{entry}' leaves static edges at '{current}'"
                    )))
                }
            };
        }
        Ok(chain)
    }

    /// Drives the graph from its entry stage until a router ends the run.
    ///
    /// `base` carries the injected services, config, cancellation token and
    /// event sink; its context snapshot is replaced before every stage.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage fails or is cancelled, a branch task
    /// panics, concurrent branches write the same field, a status update
    /// moves backwards, or `max_visits` stage executions are exceeded.
    pub async fn execute(
        &self,
        mut run: RunContext,
        base: StageContext,
        mode: ExecutionMode,
        max_visits: usize,
    ) -> Result<GraphRun, CampaignflowError> {
        let mut failures = Vec::new();
        let mut executed = Vec::new();
        let mut current = self.entry.clone();

        loop {
            if executed.len() >= max_visits {
                return Err(CampaignflowError::Internal(format!(
                    "stage visit limit of {max_visits} exceeded at '{current}'"
                )));
            }

            let stage = Arc::clone(self.stage(&current)?);
            let output = run_stage(stage.as_ref(), &run, &base).await?;
            failures.extend(output.failures);
            run.apply(output.update)?;
            executed.push(current.clone());

            let edge = self.edges.get(&current).ok_or_else(|| {
                CampaignflowError::Internal(format!("stage '{current}' has no outgoing edge"))
            })?;

            current = match edge {
                Edge::Static(next) => next.clone(),
                Edge::Conditional { router, .. } => match router(&run) {
                    Next::Stage(next) => next,
                    Next::End(terminal) => {
                        debug!(terminal = %terminal, "Run reached terminal route");
                        return Ok(GraphRun {
                            terminal,
                            context: run,
                            failures,
                            stages_executed: executed,
                        });
                    }
                },
                Edge::FanOut { router, join, .. } => {
                    let mut targets = router(&run);
                    let mut seen = std::collections::HashSet::new();
                    targets.retain(|target| seen.insert(target.clone()));

                    let branches = self.dispatch(&targets, join, &run, &base, mode).await?;
                    let update = ContextUpdate::merge_disjoint(
                        branches.iter().map(|b| (b.entry.as_str(), b.update.clone())),
                    )?;
                    for branch in branches {
                        failures.extend(branch.failures);
                        executed.extend(branch.executed);
                    }
                    run.apply(update)?;

                    let join_stage = Arc::clone(self.stage(join)?);
                    let output = run_stage(join_stage.as_ref(), &run, &base).await?;
                    failures.extend(output.failures);
                    run.apply(output.update)?;
                    executed.push(join.clone());
                    base.try_emit_event(
                        JOIN_COMPLETED,
                        Some(serde_json::json!({
                            "join": join,
                            "branches": targets,
                            "status": run.status.as_ref().map(ToString::to_string),
                        })),
                    );

                    match self.edges.get(join) {
                        Some(Edge::Static(next)) => next.clone(),
                        Some(Edge::Conditional { router, .. }) => match router(&run) {
                            Next::Stage(next) => next,
                            Next::End(terminal) => {
                                return Ok(GraphRun {
                                    terminal,
                                    context: run,
                                    failures,
                                    stages_executed: executed,
                                })
                            }
                        },
                        _ => {
                            return Err(CampaignflowError::Internal(format!(
                                "join stage '{join}' must continue with a static or conditional edge"
                            )))
                        }
                    }
                }
            };
        }
    }

    /// Runs the selected branch chains to completion.
    async fn dispatch(
        &self,
        targets: &[String],
        join: &str,
        run: &RunContext,
        base: &StageContext,
        mode: ExecutionMode,
    ) -> Result<Vec<BranchRun>, CampaignflowError> {
        let mut chains = Vec::with_capacity(targets.len());
        for target in targets {
            chains.push((target.clone(), self.branch_chain(target, join)?));
        }
        for (entry, _) in &chains {
            base.try_emit_event(
                BRANCH_DISPATCHED,
                Some(serde_json::json!({
                    "branch": Branch::from_entry_stage(entry).map(|b| b.to_string()),
                    "entry": entry,
                    "mode": mode.to_string(),
                })),
            );
        }

        let mut results = Vec::with_capacity(chains.len());
        match mode {
            ExecutionMode::Sequential => {
                for (entry, stages) in chains {
                    results.push(run_chain(entry, stages, run.clone(), base.clone()).await?);
                }
            }
            ExecutionMode::Parallel => {
                let mut set = JoinSet::new();
                for (entry, stages) in chains {
                    let span = info_span!("branch", entry = %entry);
                    set.spawn(run_chain(entry, stages, run.clone(), base.clone()).instrument(span));
                }
                while let Some(joined) = set.join_next().await {
                    let branch = joined.map_err(|e| {
                        CampaignflowError::Internal(format!("branch task failed: {}", describe_join_error(e)))
                    })??;
                    results.push(branch);
                }
                // Keep a stable merge order regardless of completion order.
                results.sort_by_key(|b| targets.iter().position(|t| *t == b.entry));
            }
        }
        Ok(results)
    }
}

/// Runs one branch chain against a private copy of the context.
async fn run_chain(
    entry: String,
    stages: Vec<Arc<dyn Stage>>,
    mut local: RunContext,
    base: StageContext,
) -> Result<BranchRun, CampaignflowError> {
    let timer = SpanTimer::start(entry.clone());
    let mut update = ContextUpdate::new();
    let mut failures = Vec::new();
    let mut executed = Vec::new();

    for stage in stages {
        let output = run_stage(stage.as_ref(), &local, &base).await?;
        failures.extend(output.failures);
        local.apply(output.update.clone())?;
        update.extend(output.update);
        executed.push(stage.name().to_string());
    }

    base.try_emit_event(
        BRANCH_COMPLETED,
        Some(serde_json::json!({
            "entry": entry,
            "stages": executed,
            "failures": failures.iter().map(|f| f.kind.to_string()).collect::<Vec<_>>(),
            "duration_ms": timer.elapsed_ms(),
        })),
    );
    Ok(BranchRun {
        entry,
        update,
        failures,
        executed,
    })
}

/// Executes one stage and converts hard outcomes into errors.
async fn run_stage(
    stage: &dyn Stage,
    run: &RunContext,
    base: &StageContext,
) -> Result<crate::core::StageOutput, CampaignflowError> {
    let name = stage.name().to_string();
    let ctx = base.with_run(Arc::new(run.clone())).for_stage(name.clone());
    ctx.try_emit_event(
        STAGE_STARTED,
        Some(serde_json::json!({ "stage": name, "kind": stage.kind().to_string() })),
    );

    let timer = SpanTimer::start(name.clone());
    let output = stage
        .execute(&ctx)
        .instrument(info_span!("stage", stage = %name, kind = %stage.kind()))
        .await;

    let attrs = StageSpanAttributes::new(name.clone())
        .with_kind(stage.kind().to_string())
        .with_status(output.status.to_string())
        .with_duration_ms(timer.elapsed_ms())
        .with_failures(output.failures.iter().map(|f| f.kind.to_string()).collect())
        .with_fields(output.update.fields().map(|f| f.to_string()).collect());
    ctx.try_emit_event(STAGE_COMPLETED, Some(attrs.to_json()));

    match output.status {
        StageStatus::Ok | StageStatus::Skip => Ok(output),
        StageStatus::Cancel => Err(CampaignflowError::Cancelled(
            output
                .cancel_reason
                .unwrap_or_else(|| format!("stage '{name}' cancelled")),
        )),
        StageStatus::Fail => Err(CampaignflowError::Internal(format!(
            "stage '{name}' failed: {}",
            output.error.unwrap_or_else(|| "unknown error".to_string())
        ))),
    }
}

/// Extracts a readable message from a failed task.
pub(crate) fn describe_join_error(error: tokio::task::JoinError) -> String {
    if error.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "task panicked".to_string()),
        Err(error) => error.to_string(),
    }
}
