//! Image branch: multimodal generation followed by artifact publish.

use super::{bounded, Stage, StageContext};
use crate::context::{ContextUpdate, GeneratedImage, MarketingParams};
use crate::core::{FailureKind, StageKind, StageOutput, IMAGE_GENERATE_STAGE, IMAGE_PUBLISH_STAGE};
use crate::errors::ProviderError;
use crate::providers::{ArtifactUpload, ImageRequest, Modality, ReferenceImage, ResponsePart};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Leading instruction part of every image request.
pub const IMAGE_PERSONA: &str = "\
You are an expert marketing image generator.
Preserve the product's exact appearance as shown in the supplied reference image(s).
Generate only the background, context or marketing setting described below.";

/// Directive added when the campaign carries a discount.
pub const DISCOUNT_OVERLAY_DIRECTIVE: &str =
    "Add a small, clean discount overlay to the image (for example a price-tag badge) reading";

const UPLOAD_CONTENT_TYPE: &str = "image/jpeg";

/// Builds the instruction part for the image provider.
#[must_use]
pub fn build_image_instruction(prompt: &str, params: &MarketingParams) -> String {
    let mut instruction = String::from(IMAGE_PERSONA);
    if params.has_discount() {
        instruction.push_str(&format!(
            "\n{DISCOUNT_OVERLAY_DIRECTIVE} \"{}% off\".",
            params.discount
        ));
    }
    instruction.push_str("\n\n");
    instruction.push_str(prompt);
    instruction
}

fn first_inline_image(parts: Vec<ResponsePart>) -> Option<GeneratedImage> {
    parts.into_iter().find_map(|part| match part {
        ResponsePart::InlineData { mime_type, data } if !data.is_empty() => {
            Some(GeneratedImage::new(data, mime_type))
        }
        _ => None,
    })
}

/// Generates a campaign image from the image instruction and reference images.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageGenerateStage;

impl ImageGenerateStage {
    async fn load_references(ctx: &StageContext) -> Vec<ReferenceImage> {
        let ids = &ctx.run().image_ids;
        if ids.is_empty() {
            return Vec::new();
        }
        // One deadline per reference; a slow fetch only drops its own id.
        let limit = ctx.config().store_timeout();
        let source = &ctx.services().images;
        let fetches = ids.iter().map(|id| {
            bounded(limit, "images", async move {
                source
                    .fetch_images(std::slice::from_ref(id))
                    .await
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| Err(ProviderError::not_found("images", id.clone())))
            })
        });
        let results = futures::future::join_all(fetches).await;

        ids.iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!(
                        project_id = %ctx.project_id(),
                        image_id = %id,
                        error = %e,
                        "Skipping reference image"
                    );
                    None
                }
            })
            .collect()
    }

    fn generation_failed(ctx: &StageContext, error: &ProviderError) -> StageOutput {
        warn!(
            project_id = %ctx.project_id(),
            branch = "image",
            failure = %FailureKind::Generation,
            error = %error,
            "Image generation failed"
        );
        StageOutput::ok(ContextUpdate::new().with_generated_image(None).with_image_output(None))
            .with_failure(FailureKind::Generation, IMAGE_GENERATE_STAGE, error.to_string())
    }
}

#[async_trait]
impl Stage for ImageGenerateStage {
    fn name(&self) -> &str {
        IMAGE_GENERATE_STAGE
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let Some(prompt) = ctx.run().instructions.image_prompt.as_deref() else {
            return StageOutput::skip("no image instruction").with_update(
                ContextUpdate::new()
                    .with_generated_image(None)
                    .with_image_output(None),
            );
        };

        let images = Self::load_references(ctx).await;
        if images.is_empty() {
            return Self::generation_failed(ctx, &ProviderError::empty("images"));
        }
        debug!(
            project_id = %ctx.project_id(),
            references = images.len(),
            "Reference images loaded"
        );

        let request = ImageRequest {
            instruction: build_image_instruction(prompt, &ctx.run().params),
            images,
            modalities: vec![Modality::Text, Modality::Image],
        };
        let response = bounded(
            ctx.config().provider_timeout(),
            "image",
            ctx.services().image_generator.generate(request),
        )
        .await;

        match response.map(first_inline_image) {
            Ok(Some(image)) => {
                info!(
                    project_id = %ctx.project_id(),
                    branch = "image",
                    bytes = image.bytes.len(),
                    "Image generated"
                );
                StageOutput::ok(ContextUpdate::new().with_generated_image(Some(image)))
            }
            Ok(None) => Self::generation_failed(ctx, &ProviderError::empty("image")),
            Err(e) => Self::generation_failed(ctx, &e),
        }
    }
}

/// Uploads the generated image and records its reference.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagePublishStage;

#[async_trait]
impl Stage for ImagePublishStage {
    fn name(&self) -> &str {
        IMAGE_PUBLISH_STAGE
    }

    fn kind(&self) -> StageKind {
        StageKind::Publish
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let Some(image) = ctx.run().generated_image.clone() else {
            return StageOutput::skip("no generated image")
                .with_update(ContextUpdate::new().with_image_output(None));
        };

        let upload = ArtifactUpload {
            project_id: ctx.project_id().to_string(),
            name: format!("{}.jpg", ctx.run().params.product_name),
            content_type: UPLOAD_CONTENT_TYPE.to_string(),
            bytes: image.bytes,
        };
        let stored = bounded(
            ctx.config().store_timeout(),
            "artifacts",
            ctx.services().artifacts.store(upload),
        )
        .await;

        // Bytes are no longer needed once the upload has been attempted.
        let update = ContextUpdate::new().with_generated_image(None);
        match stored {
            Ok(reference) => {
                info!(
                    project_id = %ctx.project_id(),
                    branch = "image",
                    reference = %reference,
                    "Image published"
                );
                StageOutput::ok(update.with_image_output(Some(reference)))
            }
            Err(e) => {
                warn!(
                    project_id = %ctx.project_id(),
                    branch = "image",
                    failure = %FailureKind::Publish,
                    error = %e,
                    "Image publish failed"
                );
                StageOutput::ok(update.with_image_output(None)).with_failure(
                    FailureKind::Publish,
                    IMAGE_PUBLISH_STAGE,
                    e.to_string(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::context::{ContextField, FieldUpdate, Instructions};
    use crate::core::StageStatus;
    use crate::cancellation::CancellationToken;
    use crate::events::NoOpEventSink;
    use crate::providers::ReferenceImageSource;
    use crate::stages::test_support::{run_context, stage_context, Mocks};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    fn with_image(prompt: Option<&str>) -> Instructions {
        Instructions {
            image_prompt: prompt.map(str::to_string),
            ..Instructions::default()
        }
    }

    fn reference(byte: u8) -> ReferenceImage {
        ReferenceImage {
            bytes: vec![byte; 4],
            mime_type: "image/png".into(),
        }
    }

    fn generated_of(output: &StageOutput) -> Option<GeneratedImage> {
        match output.update.get(ContextField::GeneratedImage) {
            Some(FieldUpdate::GeneratedImage(image)) => image.clone(),
            other => panic!("expected generated image, got {other:?}"),
        }
    }

    fn image_output_of(output: &StageOutput) -> Option<String> {
        match output.update.get(ContextField::ImageOutput) {
            Some(FieldUpdate::ImageOutput(reference)) => reference.clone(),
            other => panic!("expected image output, got {other:?}"),
        }
    }

    #[test]
    fn test_discount_directive_only_with_discount() {
        let run = run_context(Instructions::default(), 20.0);
        let instruction = build_image_instruction("beach at sunset", &run.params);
        assert!(instruction.contains(DISCOUNT_OVERLAY_DIRECTIVE));
        assert!(instruction.contains("20% off"));
        assert!(instruction.ends_with("beach at sunset"));

        let run = run_context(Instructions::default(), 0.0);
        let instruction = build_image_instruction("beach at sunset", &run.params);
        assert!(!instruction.contains(DISCOUNT_OVERLAY_DIRECTIVE));
        assert!(instruction.starts_with(IMAGE_PERSONA));
    }

    #[tokio::test]
    async fn test_generate_skips_failed_references_and_takes_first_inline_part() {
        let captured: Arc<Mutex<Option<ImageRequest>>> = Arc::new(Mutex::new(None));
        let mut mocks = Mocks::new();
        mocks.images.expect_fetch_images().times(2).returning(|ids| {
            ids.iter()
                .map(|id| match id.as_str() {
                    "img-1" => Ok(reference(1)),
                    other => Err(ProviderError::not_found("images", other)),
                })
                .collect()
        });
        let sink = Arc::clone(&captured);
        mocks
            .image_generator
            .expect_generate()
            .times(1)
            .returning(move |request| {
                *sink.lock() = Some(request);
                Ok(vec![
                    ResponsePart::Text("here is your image".into()),
                    ResponsePart::InlineData {
                        mime_type: "image/png".into(),
                        data: vec![9, 9, 9],
                    },
                    ResponsePart::InlineData {
                        mime_type: "image/png".into(),
                        data: vec![7],
                    },
                ])
            });
        let ctx = stage_context(
            run_context(with_image(Some("studio shot")), 10.0),
            mocks,
            WorkflowConfig::default(),
        );

        let output = ImageGenerateStage.execute(&ctx).await;

        let image = generated_of(&output).unwrap();
        assert_eq!(image.bytes, vec![9, 9, 9]);
        let request = captured.lock().take().unwrap();
        assert_eq!(request.images, vec![reference(1)]);
        assert_eq!(request.modalities, vec![Modality::Text, Modality::Image]);
        assert!(request.instruction.contains(DISCOUNT_OVERLAY_DIRECTIVE));
    }

    #[tokio::test]
    async fn test_generate_aborts_when_no_reference_loads() {
        let mut mocks = Mocks::new();
        mocks.images.expect_fetch_images().returning(|ids| {
            ids.iter()
                .map(|id| Err(ProviderError::not_found("images", id.clone())))
                .collect()
        });
        mocks.image_generator.expect_generate().times(0);
        let ctx = stage_context(
            run_context(with_image(Some("studio shot")), 0.0),
            mocks,
            WorkflowConfig::default(),
        );

        let output = ImageGenerateStage.execute(&ctx).await;

        assert_eq!(generated_of(&output), None);
        assert_eq!(output.failures[0].kind, FailureKind::Generation);
    }

    struct SlowSecondReference;

    #[async_trait]
    impl ReferenceImageSource for SlowSecondReference {
        async fn fetch_images(&self, ids: &[String]) -> Vec<Result<ReferenceImage, ProviderError>> {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                if id == "img-2" {
                    tokio::time::sleep(Duration::from_secs(11)).await;
                }
                out.push(Ok(reference(1)));
            }
            out
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_reference_does_not_discard_loaded_ones() {
        let captured: Arc<Mutex<Option<ImageRequest>>> = Arc::new(Mutex::new(None));
        let mut mocks = Mocks::new();
        let sink = Arc::clone(&captured);
        mocks
            .image_generator
            .expect_generate()
            .times(1)
            .returning(move |request| {
                *sink.lock() = Some(request);
                Ok(vec![ResponsePart::InlineData {
                    mime_type: "image/png".into(),
                    data: vec![5],
                }])
            });
        let mut services = mocks.into_services();
        services.images = Arc::new(SlowSecondReference);
        let ctx = StageContext::new(
            Arc::new(run_context(with_image(Some("studio shot")), 0.0)),
            Arc::new(services),
            Arc::new(WorkflowConfig::default()),
            Arc::new(CancellationToken::new()),
            Arc::new(NoOpEventSink),
        );

        let output = ImageGenerateStage.execute(&ctx).await;

        assert_eq!(generated_of(&output).map(|image| image.bytes), Some(vec![5]));
        assert!(!output.has_failures());
        let request = captured.lock().take().unwrap();
        assert_eq!(request.images, vec![reference(1)]);
    }

    #[tokio::test]
    async fn test_generate_without_inline_data_outputs_null() {
        let mut mocks = Mocks::new();
        mocks
            .images
            .expect_fetch_images()
            .returning(|ids| ids.iter().map(|_| Ok(reference(1))).collect());
        mocks
            .image_generator
            .expect_generate()
            .returning(|_| Ok(vec![ResponsePart::Text("I cannot do that".into())]));
        let ctx = stage_context(
            run_context(with_image(Some("studio shot")), 0.0),
            mocks,
            WorkflowConfig::default(),
        );

        let output = ImageGenerateStage.execute(&ctx).await;

        assert_eq!(generated_of(&output), None);
        assert_eq!(image_output_of(&output), None);
    }

    #[tokio::test]
    async fn test_publish_not_invoked_without_bytes() {
        let mut mocks = Mocks::new();
        mocks.artifacts.expect_store().times(0);
        let ctx = stage_context(
            run_context(with_image(Some("studio shot")), 0.0),
            mocks,
            WorkflowConfig::default(),
        );

        let output = ImagePublishStage.execute(&ctx).await;

        assert_eq!(output.status, StageStatus::Skip);
        assert_eq!(image_output_of(&output), None);
    }

    #[tokio::test]
    async fn test_publish_uploads_deterministic_name() {
        let mut mocks = Mocks::new();
        mocks
            .artifacts
            .expect_store()
            .withf(|upload| {
                upload.name == "Trail Shoe.jpg"
                    && upload.content_type == "image/jpeg"
                    && upload.project_id == "project-1"
                    && upload.bytes == vec![1, 2, 3]
            })
            .times(1)
            .returning(|_| Ok("artifact-42".into()));
        let mut run = run_context(with_image(Some("studio shot")), 0.0);
        run.generated_image = Some(GeneratedImage::new(vec![1, 2, 3], "image/png"));
        let ctx = stage_context(run, mocks, WorkflowConfig::default());

        let output = ImagePublishStage.execute(&ctx).await;

        assert_eq!(image_output_of(&output).as_deref(), Some("artifact-42"));
        assert_eq!(generated_of(&output), None);
    }

    #[tokio::test]
    async fn test_publish_failure_outputs_null() {
        let mut mocks = Mocks::new();
        mocks
            .artifacts
            .expect_store()
            .returning(|_| Err(ProviderError::status("artifacts", 500, "disk full")));
        let mut run = run_context(with_image(Some("studio shot")), 0.0);
        run.generated_image = Some(GeneratedImage::new(vec![1], "image/png"));
        let ctx = stage_context(run, mocks, WorkflowConfig::default());

        let output = ImagePublishStage.execute(&ctx).await;

        assert_eq!(image_output_of(&output), None);
        assert_eq!(output.failures[0].kind, FailureKind::Publish);
    }
}
