//! The mutable run context and the trigger payload it is built from.

use super::{CampaignIdentity, ContextUpdate, FieldUpdate};
use crate::core::{Branch, RunStatus};
use crate::errors::CampaignflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Marketing parameters supplied by the campaign trigger.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MarketingParams {
    /// Display name of the campaign project.
    #[serde(default, alias = "name")]
    pub project_name: String,
    /// Product name; also names the published image artifact.
    #[serde(default)]
    pub product_name: String,
    /// Product description.
    #[serde(default)]
    pub description: String,
    /// Product page URL, if any.
    #[serde(default)]
    pub product_url: Option<String>,
    /// Product price.
    #[serde(default)]
    pub price: f64,
    /// Discount percentage; values above zero request a discount overlay.
    #[serde(default)]
    pub discount: f64,
    /// Free-form description of the target audience.
    #[serde(default)]
    pub target_audience: String,
    /// Free-form description of the desired output format.
    #[serde(default)]
    pub output_format: String,
    /// Whether the campaign should be handed to automation afterwards.
    #[serde(default)]
    pub automate_campaign: Option<bool>,
}

impl MarketingParams {
    /// Returns true if a discount overlay should be requested.
    #[must_use]
    pub fn has_discount(&self) -> bool {
        self.discount > 0.0
    }
}

/// The orchestrator input produced by a campaign-creation event.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CampaignTrigger {
    /// Campaign identifiers.
    #[serde(flatten)]
    pub identity: CampaignIdentity,
    /// Marketing parameters.
    #[serde(flatten)]
    pub params: MarketingParams,
    /// Reference image identifiers for the product.
    #[serde(default)]
    pub image_ids: Vec<String>,
    /// Initial run status; absent payloads default to `NotStarted`.
    #[serde(default = "default_trigger_status", alias = "generationDone")]
    pub status: Option<RunStatus>,
}

#[allow(clippy::unnecessary_wraps)]
fn default_trigger_status() -> Option<RunStatus> {
    Some(RunStatus::NotStarted)
}

impl CampaignTrigger {
    /// Creates a trigger with `NotStarted` status.
    #[must_use]
    pub fn new(identity: CampaignIdentity, params: MarketingParams) -> Self {
        Self {
            identity,
            params,
            image_ids: Vec::new(),
            status: default_trigger_status(),
        }
    }

    /// Sets the reference image identifiers.
    #[must_use]
    pub fn with_image_ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.image_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the initial status.
    #[must_use]
    pub fn with_status(mut self, status: Option<RunStatus>) -> Self {
        self.status = status;
        self
    }
}

/// Per-modality generation instructions produced by planning.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Instructions {
    /// Instruction for the text branch.
    #[serde(default)]
    pub text_prompt: Option<String>,
    /// Instruction for the image branch.
    #[serde(default)]
    pub image_prompt: Option<String>,
    /// Instruction for the video branch.
    #[serde(default)]
    pub video_prompt: Option<String>,
}

impl Instructions {
    /// Returns the instruction for a branch.
    #[must_use]
    pub fn get(&self, branch: Branch) -> Option<&str> {
        match branch {
            Branch::Text => self.text_prompt.as_deref(),
            Branch::Image => self.image_prompt.as_deref(),
            Branch::Video => self.video_prompt.as_deref(),
        }
    }

    /// Treats blank instructions as absent.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        }
        Self {
            text_prompt: clean(self.text_prompt),
            image_prompt: clean(self.image_prompt),
            video_prompt: clean(self.video_prompt),
        }
    }

    /// Returns the branches that have an instruction, in dispatch order.
    #[must_use]
    pub fn active_branches(&self) -> Vec<Branch> {
        Branch::ALL
            .into_iter()
            .filter(|branch| self.get(*branch).is_some())
            .collect()
    }

    /// Returns true if no branch has an instruction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active_branches().is_empty()
    }
}

/// Outputs produced by the branches; each is independently nullable.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GeneratedOutputs {
    /// Generated marketing copy.
    pub text: Option<String>,
    /// Reference of the published image artifact.
    pub image: Option<String>,
    /// URL of the generated video.
    pub video: Option<String>,
}

impl GeneratedOutputs {
    /// Returns the output of a branch.
    #[must_use]
    pub fn get(&self, branch: Branch) -> Option<&str> {
        match branch {
            Branch::Text => self.text.as_deref(),
            Branch::Image => self.image.as_deref(),
            Branch::Video => self.video.as_deref(),
        }
    }

    /// Returns the number of non-null outputs.
    #[must_use]
    pub fn produced_count(&self) -> usize {
        Branch::ALL
            .into_iter()
            .filter(|branch| self.get(*branch).is_some())
            .count()
    }
}

/// Image bytes produced by the generate stage, awaiting publish.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub bytes: Vec<u8>,
    /// MIME type reported by the provider.
    pub mime_type: String,
}

impl GeneratedImage {
    /// Creates a new generated image.
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// The mutable state of one orchestration run.
///
/// Created from a [`CampaignTrigger`], mutated only by merging stage
/// updates, and discarded once the engine returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunContext {
    /// Unique identifier of the run.
    pub run_id: Uuid,
    /// Campaign identifiers.
    #[serde(flatten)]
    pub identity: CampaignIdentity,
    /// Marketing parameters.
    #[serde(flatten)]
    pub params: MarketingParams,
    /// Reference image identifiers.
    #[serde(default)]
    pub image_ids: Vec<String>,
    /// Instructions set by planning.
    #[serde(flatten)]
    pub instructions: Instructions,
    /// Branch outputs.
    pub outputs: GeneratedOutputs,
    /// Generated image bytes between the image stages.
    #[serde(skip)]
    pub generated_image: Option<GeneratedImage>,
    /// Identifier of the generated-output record linked by join.
    #[serde(default)]
    pub generated_output_id: Option<String>,
    /// Run status.
    pub status: Option<RunStatus>,
}

impl RunContext {
    /// Builds the initial context for a run.
    #[must_use]
    pub fn from_trigger(run_id: Uuid, trigger: CampaignTrigger) -> Self {
        Self {
            run_id,
            identity: trigger.identity,
            params: trigger.params,
            image_ids: trigger.image_ids,
            instructions: Instructions::default(),
            outputs: GeneratedOutputs::default(),
            generated_image: None,
            generated_output_id: None,
            status: trigger.status,
        }
    }

    /// Returns the project identifier.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.identity.project_id
    }

    /// Merges a stage update into the context.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the update would move the status
    /// backwards. The context is left untouched in that case.
    pub fn apply(&mut self, update: ContextUpdate) -> Result<(), CampaignflowError> {
        if let Some(FieldUpdate::Status(next)) = update.status_update() {
            let current = self.status.clone().unwrap_or_default();
            if !current.can_advance_to(next) {
                return Err(CampaignflowError::InvalidTransition {
                    from: current.to_string(),
                    to: next.to_string(),
                });
            }
        }

        for field in update.into_fields() {
            match field {
                FieldUpdate::Instructions(instructions) => self.instructions = instructions,
                FieldUpdate::TextOutput(text) => self.outputs.text = text,
                FieldUpdate::GeneratedImage(image) => self.generated_image = image,
                FieldUpdate::ImageOutput(reference) => self.outputs.image = reference,
                FieldUpdate::VideoOutput(url) => self.outputs.video = url,
                FieldUpdate::GeneratedOutputId(id) => self.generated_output_id = id,
                FieldUpdate::Status(status) => self.status = Some(status),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context() -> RunContext {
        let trigger = CampaignTrigger::new(
            CampaignIdentity::new("u1", "p1", "prod1"),
            MarketingParams {
                product_name: "Trail Shoe".into(),
                discount: 15.0,
                ..MarketingParams::default()
            },
        );
        RunContext::from_trigger(Uuid::new_v4(), trigger)
    }

    #[test]
    fn test_trigger_defaults_status_to_not_started() {
        let trigger: CampaignTrigger = serde_json::from_str(
            r#"{"user_id":"u","project_id":"p","product_name":"Mug","image_ids":["a"]}"#,
        )
        .unwrap();

        assert_eq!(trigger.status, Some(RunStatus::NotStarted));
        assert_eq!(trigger.params.product_name, "Mug");
        assert_eq!(trigger.image_ids, vec!["a".to_string()]);
    }

    #[test]
    fn test_trigger_accepts_null_and_legacy_status() {
        let trigger: CampaignTrigger =
            serde_json::from_str(r#"{"user_id":"u","project_id":"p","status":null}"#).unwrap();
        assert_eq!(trigger.status, None);

        let trigger: CampaignTrigger = serde_json::from_str(
            r#"{"user_id":"u","project_id":"p","generationDone":"Edit"}"#,
        )
        .unwrap();
        assert_eq!(trigger.status, Some(RunStatus::Edit));
    }

    #[test]
    fn test_instructions_normalize_blank_values() {
        let instructions = Instructions {
            text_prompt: Some("  write copy ".into()),
            image_prompt: Some("   ".into()),
            video_prompt: None,
        }
        .normalized();

        assert_eq!(instructions.text_prompt.as_deref(), Some("write copy"));
        assert_eq!(instructions.image_prompt, None);
        assert_eq!(instructions.active_branches(), vec![Branch::Text]);
    }

    #[test]
    fn test_apply_merges_fields() {
        let mut ctx = context();
        ctx.apply(
            ContextUpdate::new()
                .with_text_output(Some("copy".into()))
                .with_video_output(Some("https://cdn/v.mp4".into())),
        )
        .unwrap();

        assert_eq!(ctx.outputs.text.as_deref(), Some("copy"));
        assert_eq!(ctx.outputs.video.as_deref(), Some("https://cdn/v.mp4"));
        assert_eq!(ctx.outputs.produced_count(), 2);
    }

    #[test]
    fn test_apply_rejects_backward_status() {
        let mut ctx = context();
        ctx.apply(ContextUpdate::new().with_status(RunStatus::Generated))
            .unwrap();

        let err = ctx
            .apply(
                ContextUpdate::new()
                    .with_text_output(Some("late".into()))
                    .with_status(RunStatus::NotStarted),
            )
            .unwrap_err();

        assert!(matches!(err, CampaignflowError::InvalidTransition { .. }));
        assert_eq!(ctx.status, Some(RunStatus::Generated));
        assert_eq!(ctx.outputs.text, None);
    }

    #[test]
    fn test_generated_image_debug_hides_bytes() {
        let image = GeneratedImage::new(vec![1, 2, 3], "image/png");
        let rendered = format!("{image:?}");
        assert!(rendered.contains("len: 3"));
        assert!(!rendered.contains("[1, 2, 3]"));
    }

    #[test]
    fn test_discount_detection() {
        let mut params = MarketingParams::default();
        assert!(!params.has_discount());
        params.discount = 0.5;
        assert!(params.has_discount());
    }
}
