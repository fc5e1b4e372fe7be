//! Collaborator interfaces consumed by the stages.
//!
//! Every external system the orchestrator talks to sits behind one of the
//! traits below. Stages receive them through an injected [`Services`]
//! bundle, so tests substitute mocks or the in-memory fakes from
//! [`crate::testing`].

use crate::errors::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// MIME type assumed for reference images that report none.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// A field of the external generated-output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputField {
    /// Generated marketing copy.
    Text,
    /// Stored image reference.
    Image,
    /// Video URL.
    Video,
}

impl OutputField {
    /// Returns the record field name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for OutputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The generated-output record attached to a project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeneratedOutputRecord {
    /// Record identifier.
    pub id: String,
    /// Text field, if set.
    #[serde(default)]
    pub text: Option<String>,
    /// Image field, if set.
    #[serde(default)]
    pub image: Option<String>,
    /// Video field, if set.
    #[serde(default)]
    pub video: Option<String>,
}

/// Result of stamping the generated-output record onto its project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The project has no generated-output record yet.
    NoRecord,
    /// The record was linked. The id is present when the store reports it.
    Linked {
        /// Linked record id.
        output_id: Option<String>,
    },
}

/// Point updates against the durable project record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Sets one field of the project's generated-output record.
    async fn upsert_output_field(
        &self,
        project_id: &str,
        field: OutputField,
        value: &str,
    ) -> Result<(), ProviderError>;

    /// Stamps the generated-output record onto the project.
    async fn link_output(&self, project_id: &str, output_id: &str) -> Result<(), ProviderError>;

    /// Looks up the generated-output record for a project.
    async fn get_generated_output(
        &self,
        project_id: &str,
    ) -> Result<Option<GeneratedOutputRecord>, ProviderError>;

    /// Looks up the project's generated-output record and links it.
    ///
    /// A record that disappears between lookup and link counts as absent.
    /// Stores whose link endpoint resolves the record themselves override
    /// this with a single call.
    async fn link_generated_output(&self, project_id: &str) -> Result<LinkOutcome, ProviderError> {
        let Some(record) = self.get_generated_output(project_id).await? else {
            return Ok(LinkOutcome::NoRecord);
        };
        match self.link_output(project_id, &record.id).await {
            Ok(()) => Ok(LinkOutcome::Linked {
                output_id: Some(record.id),
            }),
            Err(e) if e.is_not_found() => Ok(LinkOutcome::NoRecord),
            Err(e) => Err(e),
        }
    }
}

/// An artifact to upload.
#[derive(Clone, PartialEq, Eq)]
pub struct ArtifactUpload {
    /// Project the artifact belongs to.
    pub project_id: String,
    /// Deterministic artifact name.
    pub name: String,
    /// Content type of the bytes.
    pub content_type: String,
    /// Artifact bytes.
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ArtifactUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactUpload")
            .field("project_id", &self.project_id)
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Bytes fetched from the artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Artifact bytes.
    pub bytes: Vec<u8>,
    /// Content type reported by the store.
    pub content_type: Option<String>,
}

/// Binary storage for generated and reference images.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores an artifact and returns its reference.
    async fn store(&self, upload: ArtifactUpload) -> Result<String, ProviderError>;

    /// Fetches an artifact by reference.
    async fn fetch(&self, reference: &str) -> Result<StoredArtifact, ProviderError>;
}

/// A reference image loaded for the multimodal request.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    /// Image bytes.
    pub bytes: Vec<u8>,
    /// MIME type.
    pub mime_type: String,
}

impl fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Loads reference images by id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceImageSource: Send + Sync {
    /// Fetches each id independently; the result has one entry per id.
    async fn fetch_images(&self, ids: &[String]) -> Vec<Result<ReferenceImage, ProviderError>>;
}

/// Produces per-modality instructions from campaign context.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstructionPlanner: Send + Sync {
    /// Returns raw model text expected to hold a JSON object.
    async fn plan(&self, persona: &str, context: &str) -> Result<String, ProviderError>;
}

/// Produces marketing copy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for a prompt under a persona.
    async fn generate(&self, persona: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// A response modality requested from the image provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    /// Text parts.
    Text,
    /// Image parts.
    Image,
}

/// A multimodal image generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Instruction part, sent first.
    pub instruction: String,
    /// Reference images, sent after the instruction.
    pub images: Vec<ReferenceImage>,
    /// Requested response modalities.
    pub modalities: Vec<Modality>,
}

/// One typed part of a multimodal response.
#[derive(Clone, PartialEq, Eq)]
pub enum ResponsePart {
    /// A text part.
    Text(String),
    /// An inline binary payload.
    InlineData {
        /// MIME type of the payload.
        mime_type: String,
        /// Decoded payload bytes.
        data: Vec<u8>,
    },
}

impl fmt::Debug for ResponsePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::InlineData { mime_type, data } => f
                .debug_struct("InlineData")
                .field("mime_type", mime_type)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// Multimodal image generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates response parts for the request.
    async fn generate(&self, request: ImageRequest) -> Result<Vec<ResponsePart>, ProviderError>;
}

/// Filters for listing video jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    /// Media type to list.
    pub media_type: String,
    /// Page number, starting at 1.
    pub page: u32,
    /// Items per page.
    pub items: u32,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            media_type: "video".to_string(),
            page: 1,
            items: 5,
        }
    }
}

/// A video job as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJob {
    /// Job identifier.
    pub id: String,
    /// Provider status string.
    pub status: String,
    /// First media URL, once available.
    pub media_url: Option<String>,
}

impl VideoJob {
    /// Status string of a finished job.
    pub const COMPLETED: &'static str = "completed";

    /// Returns the media URL if this is the completed job `id`.
    #[must_use]
    pub fn completed_url(&self, id: &str) -> Option<&str> {
        if self.id == id && self.status == Self::COMPLETED {
            self.media_url.as_deref()
        } else {
            None
        }
    }
}

/// Asynchronous video generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Submits a job; `Ok(None)` means the provider returned no job id.
    async fn create(&self, brand_id: &str, prompt: &str) -> Result<Option<String>, ProviderError>;

    /// Lists recent jobs for the brand.
    async fn list_jobs(
        &self,
        brand_id: &str,
        filter: &JobFilter,
    ) -> Result<Vec<VideoJob>, ProviderError>;
}

/// Reference image source backed by an artifact store.
pub struct ArtifactImageSource {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactImageSource {
    /// Wraps an artifact store.
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReferenceImageSource for ArtifactImageSource {
    async fn fetch_images(&self, ids: &[String]) -> Vec<Result<ReferenceImage, ProviderError>> {
        let fetches = ids.iter().map(|id| async move {
            let artifact = self.store.fetch(id).await?;
            Ok(ReferenceImage {
                bytes: artifact.bytes,
                mime_type: artifact
                    .content_type
                    .filter(|mime| !mime.is_empty())
                    .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
            })
        });
        futures::future::join_all(fetches).await
    }
}

/// The collaborators a run depends on.
#[derive(Clone)]
pub struct Services {
    /// Project record store.
    pub projects: Arc<dyn ProjectStore>,
    /// Artifact store.
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Reference image source.
    pub images: Arc<dyn ReferenceImageSource>,
    /// Instruction planner.
    pub planner: Arc<dyn InstructionPlanner>,
    /// Text generator.
    pub text: Arc<dyn TextGenerator>,
    /// Multimodal image generator.
    pub image_generator: Arc<dyn ImageGenerator>,
    /// Video provider.
    pub video: Arc<dyn VideoProvider>,
    /// Brand the video provider bills to.
    pub video_brand_id: String,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("video_brand_id", &self.video_brand_id)
            .finish_non_exhaustive()
    }
}
