//! Text branch: one copywriting call, then a point update of the record.

use super::{bounded, Stage, StageContext};
use crate::context::ContextUpdate;
use crate::core::{FailureKind, StageOutput, TEXT_STAGE};
use crate::errors::ProviderError;
use crate::providers::OutputField;
use async_trait::async_trait;
use tracing::{info, warn};

/// System persona sent to the text generator.
pub const COPYWRITER_PERSONA: &str = "\
You are a senior marketing copywriter for a global brand.
Write short, persuasive and emotionally resonant marketing copy that goes straight into a digital campaign.

You must:
- Match a modern brand voice that feels native to social platforms and speaks directly to the target audience.
- Return final, ready-to-publish copy only. Never return suggestions, outlines, options or templates.
- Avoid lists, bullet points and meta commentary about what you are writing.
- Keep it to at most two concise, energetic paragraphs.

Return only the marketing text, with no headers, quotes or markdown.";

/// Generates marketing copy for the text instruction.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextStage;

#[async_trait]
impl Stage for TextStage {
    fn name(&self) -> &str {
        TEXT_STAGE
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let Some(prompt) = ctx.run().instructions.text_prompt.as_deref() else {
            return StageOutput::skip("no text instruction")
                .with_update(ContextUpdate::new().with_text_output(None));
        };
        let project_id = ctx.project_id();

        let generated = bounded(
            ctx.config().provider_timeout(),
            "text",
            ctx.services().text.generate(COPYWRITER_PERSONA, prompt),
        )
        .await
        .map(|text| text.trim().to_string())
        .and_then(|text| {
            if text.is_empty() {
                Err(ProviderError::empty("text"))
            } else {
                Ok(text)
            }
        });

        let text = match generated {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    project_id = %project_id,
                    branch = "text",
                    failure = %FailureKind::Generation,
                    error = %e,
                    "Text generation failed"
                );
                return StageOutput::ok(ContextUpdate::new().with_text_output(None))
                    .with_failure(FailureKind::Generation, TEXT_STAGE, e.to_string());
            }
        };

        let mut output = StageOutput::ok(ContextUpdate::new().with_text_output(Some(text.clone())));
        let published = bounded(
            ctx.config().store_timeout(),
            "projects",
            ctx.services()
                .projects
                .upsert_output_field(project_id, OutputField::Text, &text),
        )
        .await;

        match published {
            Ok(()) => info!(project_id = %project_id, branch = "text", "Text output stored"),
            Err(e) => {
                warn!(
                    project_id = %project_id,
                    branch = "text",
                    failure = %FailureKind::Publish,
                    error = %e,
                    "Storing text output failed"
                );
                output = output.with_failure(FailureKind::Publish, TEXT_STAGE, e.to_string());
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::context::{ContextField, FieldUpdate, Instructions};
    use crate::core::StageStatus;
    use crate::stages::test_support::{run_context, stage_context, Mocks};
    use mockall::predicate::*;

    fn with_text(prompt: Option<&str>) -> Instructions {
        Instructions {
            text_prompt: prompt.map(str::to_string),
            ..Instructions::default()
        }
    }

    fn text_of(output: &StageOutput) -> Option<String> {
        match output.update.get(ContextField::TextOutput) {
            Some(FieldUpdate::TextOutput(text)) => text.clone(),
            other => panic!("expected text output, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_instruction_makes_no_calls() {
        let mut mocks = Mocks::new();
        mocks.text.expect_generate().times(0);
        mocks.projects.expect_upsert_output_field().times(0);
        let ctx = stage_context(run_context(with_text(None), 0.0), mocks, WorkflowConfig::default());

        let output = TextStage.execute(&ctx).await;

        assert_eq!(output.status, StageStatus::Skip);
        assert_eq!(text_of(&output), None);
    }

    #[tokio::test]
    async fn test_generates_and_stores_text() {
        let mut mocks = Mocks::new();
        mocks
            .text
            .expect_generate()
            .with(eq(COPYWRITER_PERSONA), eq("write copy"))
            .times(1)
            .returning(|_, _| Ok("  Run further.  ".into()));
        mocks
            .projects
            .expect_upsert_output_field()
            .with(eq("project-1"), eq(OutputField::Text), eq("Run further."))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ctx = stage_context(
            run_context(with_text(Some("write copy")), 0.0),
            mocks,
            WorkflowConfig::default(),
        );

        let output = TextStage.execute(&ctx).await;

        assert_eq!(text_of(&output).as_deref(), Some("Run further."));
        assert!(!output.has_failures());
    }

    #[tokio::test]
    async fn test_store_failure_keeps_text() {
        let mut mocks = Mocks::new();
        mocks
            .text
            .expect_generate()
            .returning(|_, _| Ok("copy".into()));
        mocks
            .projects
            .expect_upsert_output_field()
            .returning(|_, _, _| Err(ProviderError::transport("projects", "refused")));
        let ctx = stage_context(
            run_context(with_text(Some("write copy")), 0.0),
            mocks,
            WorkflowConfig::default(),
        );

        let output = TextStage.execute(&ctx).await;

        assert_eq!(text_of(&output).as_deref(), Some("copy"));
        assert_eq!(output.failures[0].kind, FailureKind::Publish);
    }

    #[tokio::test]
    async fn test_generation_failure_outputs_null() {
        let mut mocks = Mocks::new();
        mocks
            .text
            .expect_generate()
            .returning(|_, _| Err(ProviderError::status("text", 500, "boom")));
        mocks.projects.expect_upsert_output_field().times(0);
        let ctx = stage_context(
            run_context(with_text(Some("write copy")), 0.0),
            mocks,
            WorkflowConfig::default(),
        );

        let output = TextStage.execute(&ctx).await;

        assert!(output.is_success());
        assert_eq!(text_of(&output), None);
        assert_eq!(output.failures[0].kind, FailureKind::Generation);
    }
}
