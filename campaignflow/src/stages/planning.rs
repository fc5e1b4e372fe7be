//! Planning stage: turns campaign parameters into per-modality instructions.

use super::{bounded, Stage, StageContext};
use crate::context::{ContextUpdate, Instructions, MarketingParams};
use crate::core::{FailureKind, StageKind, StageOutput, PLANNING_STAGE};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

/// System persona sent to the instruction planner.
pub const PLANNER_PERSONA: &str = "\
You are an expert prompt engineer who helps businesses market their products.
You write generation prompts that a multimodal model will follow to produce marketing content as text, images and videos.

Responsibilities:
- Work out the desired output format and write prompts ONLY for the formats it asks for.
- Every prompt you write must be clear, concrete and goal-oriented.

Image prompt rules:
- One or more reference images of the product are always supplied alongside the prompt.
- The image prompt must explicitly refer to those reference images.
- The product's exact appearance (color, shape, texture, branding) must be preserved as shown in the reference images.
- Only the background and surrounding context may be generated.
- If a discount greater than zero is given, ask for a small discount overlay such as a price tag.

Text prompt rules:
- Tailor the copy to the target audience.
- State the price and discount clearly and persuasively.

Video prompt rules:
- Write a video prompt ONLY when the desired output format explicitly asks for video.
- Keep the product appearance, audience and tone consistent with the other prompts.

If the desired output format is unclear or ambiguous, write prompts for text and image only and set video_prompt to null.
Do not invent requirements; follow the requested tone, platform and audience exactly.

Respond ONLY with a JSON object of this exact shape and nothing else:
{\"text_prompt\": \"...\" or null, \"image_prompt\": \"...\" or null, \"video_prompt\": \"...\" or null}";

/// Builds the campaign brief sent as the planner's user message.
#[must_use]
pub fn build_campaign_brief(params: &MarketingParams) -> String {
    format!(
        "Product Name: {}\nDescription: {}\nDiscount: {}% off\nTarget Audience: {}\nDesired Output Format: {}\n\n\
         Generate highly effective prompts suitable for generating this kind of content.",
        params.product_name,
        params.description,
        params.discount,
        params.target_audience,
        params.output_format,
    )
}

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").ok())
        .as_ref()
}

/// Removes a fenced-code wrapper, if present.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    fence_pattern()
        .and_then(|fence| fence.captures(raw))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| raw.trim(), |inner| inner.as_str())
}

/// Parses planner output into normalized instructions.
///
/// # Errors
///
/// Returns the decode error if the text is not a JSON object of the
/// expected shape.
pub fn parse_instructions(raw: &str) -> Result<Instructions, serde_json::Error> {
    match serde_json::from_str::<serde_json::Value>(strip_code_fences(raw))? {
        object @ serde_json::Value::Object(_) => {
            serde_json::from_value::<Instructions>(object).map(Instructions::normalized)
        }
        other => Err(serde::de::Error::custom(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Asks the planner for instructions, falling back to none on any failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanningStage;

#[async_trait]
impl Stage for PlanningStage {
    fn name(&self) -> &str {
        PLANNING_STAGE
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let brief = build_campaign_brief(&ctx.run().params);
        let response = bounded(
            ctx.config().planning_timeout(),
            "planner",
            ctx.services().planner.plan(PLANNER_PERSONA, &brief),
        )
        .await;

        let parsed = response
            .map_err(|e| e.to_string())
            .and_then(|raw| parse_instructions(&raw).map_err(|e| format!("unparseable plan: {e}")));

        match parsed {
            Ok(instructions) => {
                info!(
                    project_id = %ctx.project_id(),
                    branches = ?instructions.active_branches(),
                    "Planning produced instructions"
                );
                StageOutput::ok(ContextUpdate::new().with_instructions(instructions))
            }
            Err(message) => {
                warn!(
                    project_id = %ctx.project_id(),
                    failure = %FailureKind::Planning,
                    error = %message,
                    "Planning failed, continuing without instructions"
                );
                StageOutput::ok(ContextUpdate::new().with_instructions(Instructions::default()))
                    .with_failure(FailureKind::Planning, PLANNING_STAGE, message)
            }
        }
    }
}
