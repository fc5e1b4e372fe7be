//! The campaign generation graph.

use super::builder::GraphBuilder;
use super::graph::{Next, WorkflowGraph};
use crate::core::{
    Branch, Route, IMAGE_GENERATE_STAGE, IMAGE_PUBLISH_STAGE, JOIN_STAGE, MANAGER_STAGE,
    PLANNING_STAGE, TEXT_STAGE, VIDEO_STAGE,
};
use crate::errors::GraphValidationError;
use crate::stages::{
    route_status, ImageGenerateStage, ImagePublishStage, JoinStage, ManagerStage, PlanningStage,
    TextStage, VideoStage,
};
use std::sync::Arc;

/// Name of the graph built by [`campaign_graph`].
pub const CAMPAIGN_GRAPH: &str = "campaign_generation";

/// Builds the graph every campaign run traverses:
///
/// ```text
/// manager ──► planning ══► { text | image_generate → image_publish | video } ──► join ──► manager
///    └──► end (display | edit | automate | done)
/// ```
///
/// Planning dispatches only the branches whose instruction is present.
pub fn campaign_graph() -> Result<WorkflowGraph, GraphValidationError> {
    GraphBuilder::new(CAMPAIGN_GRAPH)
        .stage(Arc::new(ManagerStage))?
        .stage(Arc::new(PlanningStage))?
        .stage(Arc::new(TextStage))?
        .stage(Arc::new(ImageGenerateStage))?
        .stage(Arc::new(ImagePublishStage))?
        .stage(Arc::new(VideoStage))?
        .stage(Arc::new(JoinStage))?
        .entry(MANAGER_STAGE)
        .conditional(MANAGER_STAGE, &[PLANNING_STAGE], |run| {
            match route_status(run.status.as_ref()) {
                Route::Planning => Next::Stage(PLANNING_STAGE.to_string()),
                Route::Terminal(terminal) => Next::End(terminal),
            }
        })?
        .fan_out(
            PLANNING_STAGE,
            &[TEXT_STAGE, IMAGE_GENERATE_STAGE, VIDEO_STAGE],
            JOIN_STAGE,
            |run| {
                run.instructions
                    .active_branches()
                    .into_iter()
                    .map(|branch: Branch| branch.entry_stage().to_string())
                    .collect()
            },
        )?
        .edge(TEXT_STAGE, JOIN_STAGE)?
        .edge(IMAGE_GENERATE_STAGE, IMAGE_PUBLISH_STAGE)?
        .edge(IMAGE_PUBLISH_STAGE, JOIN_STAGE)?
        .edge(VIDEO_STAGE, JOIN_STAGE)?
        .edge(JOIN_STAGE, MANAGER_STAGE)?
        .build()
}
