//! In-memory collaborators that record every call.

use crate::errors::ProviderError;
use crate::providers::{
    ArtifactImageSource, ArtifactStore, ArtifactUpload, GeneratedOutputRecord, ImageGenerator,
    ImageRequest, InstructionPlanner, JobFilter, OutputField, ProjectStore, ResponsePart,
    Services, StoredArtifact, TextGenerator, VideoJob, VideoProvider,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::fixtures::{planner_json, sample_image_bytes};

/// One collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Operation name, `service.method`.
    pub operation: String,
    /// Short description of the arguments.
    pub detail: String,
    /// When the call started.
    pub at: Instant,
}

/// Shared, ordered log of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call.
    pub fn record(&self, operation: &str, detail: impl Into<String>) {
        self.calls.lock().push(RecordedCall {
            operation: operation.to_string(),
            detail: detail.into(),
            at: Instant::now(),
        });
    }

    /// Returns every call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the calls to one operation.
    #[must_use]
    pub fn calls_to(&self, operation: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    /// Returns how many times an operation was called.
    #[must_use]
    pub fn count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|call| call.operation == operation).count()
    }

    /// Returns the log position of the first call to an operation.
    #[must_use]
    pub fn position(&self, operation: &str) -> Option<usize> {
        self.calls.lock().iter().position(|call| call.operation == operation)
    }

    /// Returns the log position of the last call to an operation.
    #[must_use]
    pub fn last_position(&self, operation: &str) -> Option<usize> {
        self.calls.lock().iter().rposition(|call| call.operation == operation)
    }
}

/// A canned response with an optional delay before it is returned.
#[derive(Debug, Clone)]
struct Scripted<T> {
    response: Result<T, ProviderError>,
    delay: Option<Duration>,
    panic_message: Option<String>,
}

impl<T: Clone> Scripted<T> {
    fn ok(value: T) -> Self {
        Self {
            response: Ok(value),
            delay: None,
            panic_message: None,
        }
    }

    async fn play(&self) -> Result<T, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.panic_message {
            panic!("{message}");
        }
        self.response.clone()
    }
}

/// Project record store backed by a map.
///
/// The first field write for a project creates its generated-output record,
/// the way the backend does.
#[derive(Debug, Default)]
pub struct FakeProjectStore {
    log: CallLog,
    records: Mutex<HashMap<String, GeneratedOutputRecord>>,
    links: Mutex<HashMap<String, String>>,
    fail_upserts: bool,
    fail_lookup: bool,
    fail_link: bool,
}

impl FakeProjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every field write fail.
    #[must_use]
    pub fn failing_upserts(mut self) -> Self {
        self.fail_upserts = true;
        self
    }

    /// Makes record lookups fail.
    #[must_use]
    pub fn failing_lookup(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    /// Makes linking fail.
    #[must_use]
    pub fn failing_link(mut self) -> Self {
        self.fail_link = true;
        self
    }

    /// Seeds a generated-output record.
    #[must_use]
    pub fn with_record(self, project_id: &str, record: GeneratedOutputRecord) -> Self {
        self.records.lock().insert(project_id.to_string(), record);
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Returns the record stored for a project.
    #[must_use]
    pub fn record(&self, project_id: &str) -> Option<GeneratedOutputRecord> {
        self.records.lock().get(project_id).cloned()
    }

    /// Returns the output id linked to a project.
    #[must_use]
    pub fn linked_output(&self, project_id: &str) -> Option<String> {
        self.links.lock().get(project_id).cloned()
    }
}

#[async_trait]
impl ProjectStore for FakeProjectStore {
    async fn upsert_output_field(
        &self,
        project_id: &str,
        field: OutputField,
        value: &str,
    ) -> Result<(), ProviderError> {
        self.log.record("projects.upsert_output_field", format!("{project_id}:{field}"));
        if self.fail_upserts {
            return Err(ProviderError::status("projects", 503, "store unavailable"));
        }
        let mut records = self.records.lock();
        let record = records
            .entry(project_id.to_string())
            .or_insert_with(|| GeneratedOutputRecord {
                id: format!("output-{project_id}"),
                ..GeneratedOutputRecord::default()
            });
        let slot = match field {
            OutputField::Text => &mut record.text,
            OutputField::Image => &mut record.image,
            OutputField::Video => &mut record.video,
        };
        *slot = Some(value.to_string());
        Ok(())
    }

    async fn link_output(&self, project_id: &str, output_id: &str) -> Result<(), ProviderError> {
        self.log.record("projects.link_output", format!("{project_id}:{output_id}"));
        if self.fail_link {
            return Err(ProviderError::status("projects", 500, "link rejected"));
        }
        self.links
            .lock()
            .insert(project_id.to_string(), output_id.to_string());
        Ok(())
    }

    async fn get_generated_output(
        &self,
        project_id: &str,
    ) -> Result<Option<GeneratedOutputRecord>, ProviderError> {
        self.log.record("projects.get_generated_output", project_id);
        if self.fail_lookup {
            return Err(ProviderError::transport("projects", "connection reset"));
        }
        Ok(self.records.lock().get(project_id).cloned())
    }
}

/// Artifact store backed by a map. Uploads are scoped to their project,
/// and storing an image artifact also fills the project record's `image`
/// field when a project store is attached.
#[derive(Debug, Default)]
pub struct FakeArtifactStore {
    log: CallLog,
    artifacts: Mutex<HashMap<String, StoredArtifact>>,
    uploads: Mutex<Vec<ArtifactUpload>>,
    projects: Mutex<Option<Arc<FakeProjectStore>>>,
    fail_store: bool,
}

impl FakeArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an artifact.
    #[must_use]
    pub fn with_artifact(self, reference: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        self.artifacts.lock().insert(
            reference.to_string(),
            StoredArtifact {
                bytes,
                content_type: content_type.map(str::to_string),
            },
        );
        self
    }

    /// Makes every upload fail.
    #[must_use]
    pub fn failing_store(mut self) -> Self {
        self.fail_store = true;
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    fn attach_projects(&self, projects: Arc<FakeProjectStore>) {
        *self.projects.lock() = Some(projects);
    }

    /// Returns every successful upload.
    #[must_use]
    pub fn uploads(&self) -> Vec<ArtifactUpload> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifactStore {
    async fn store(&self, upload: ArtifactUpload) -> Result<String, ProviderError> {
        self.log
            .record("artifacts.store", format!("{}:{}", upload.project_id, upload.name));
        if self.fail_store {
            return Err(ProviderError::status("artifacts", 507, "quota exceeded"));
        }
        let reference = format!("{}/{}", upload.project_id, upload.name);
        self.artifacts.lock().insert(
            reference.clone(),
            StoredArtifact {
                bytes: upload.bytes.clone(),
                content_type: Some(upload.content_type.clone()),
            },
        );
        if let Some(projects) = self.projects.lock().as_ref() {
            let mut records = projects.records.lock();
            let record = records
                .entry(upload.project_id.clone())
                .or_insert_with(|| GeneratedOutputRecord {
                    id: format!("output-{}", upload.project_id),
                    ..GeneratedOutputRecord::default()
                });
            record.image = Some(reference.clone());
        }
        self.uploads.lock().push(upload);
        Ok(reference)
    }

    async fn fetch(&self, reference: &str) -> Result<StoredArtifact, ProviderError> {
        self.log.record("artifacts.fetch", reference);
        self.artifacts
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("artifacts", reference))
    }
}

/// Planner returning a scripted response.
#[derive(Debug)]
pub struct FakePlanner {
    log: CallLog,
    script: Scripted<String>,
    briefs: Mutex<Vec<String>>,
}

impl FakePlanner {
    /// Responds with `raw` text.
    #[must_use]
    pub fn responding(raw: impl Into<String>) -> Self {
        Self {
            log: CallLog::new(),
            script: Scripted::ok(raw.into()),
            briefs: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call.
    #[must_use]
    pub fn failing(error: ProviderError) -> Self {
        let mut planner = Self::responding(String::new());
        planner.script.response = Err(error);
        planner
    }

    /// Waits before responding.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Returns every brief the planner received.
    #[must_use]
    pub fn briefs(&self) -> Vec<String> {
        self.briefs.lock().clone()
    }
}

#[async_trait]
impl InstructionPlanner for FakePlanner {
    async fn plan(&self, _persona: &str, context: &str) -> Result<String, ProviderError> {
        self.log.record("planner.plan", context.lines().next().unwrap_or_default());
        self.briefs.lock().push(context.to_string());
        self.script.play().await
    }
}

/// Text generator returning a scripted response.
#[derive(Debug)]
pub struct FakeTextGenerator {
    log: CallLog,
    script: Scripted<String>,
}

impl FakeTextGenerator {
    /// Responds with `text`.
    #[must_use]
    pub fn responding(text: impl Into<String>) -> Self {
        Self {
            log: CallLog::new(),
            script: Scripted::ok(text.into()),
        }
    }

    /// Fails every call.
    #[must_use]
    pub fn failing(error: ProviderError) -> Self {
        let mut generator = Self::responding(String::new());
        generator.script.response = Err(error);
        generator
    }

    /// Panics inside the call, simulating an unexpected fault.
    #[must_use]
    pub fn panicking(message: impl Into<String>) -> Self {
        let mut generator = Self::responding(String::new());
        generator.script.panic_message = Some(message.into());
        generator
    }

    /// Waits before responding.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    async fn generate(&self, _persona: &str, prompt: &str) -> Result<String, ProviderError> {
        self.log.record("text.generate", prompt);
        self.script.play().await
    }
}

/// Image generator returning scripted response parts.
#[derive(Debug)]
pub struct FakeImageGenerator {
    log: CallLog,
    script: Scripted<Vec<ResponsePart>>,
    requests: Mutex<Vec<ImageRequest>>,
}

impl FakeImageGenerator {
    /// Responds with `parts`.
    #[must_use]
    pub fn responding(parts: Vec<ResponsePart>) -> Self {
        Self {
            log: CallLog::new(),
            script: Scripted::ok(parts),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Responds with a text part followed by one inline JPEG.
    #[must_use]
    pub fn with_image() -> Self {
        Self::responding(vec![
            ResponsePart::Text("Here is your campaign image.".to_string()),
            ResponsePart::InlineData {
                mime_type: "image/png".to_string(),
                data: sample_image_bytes(),
            },
        ])
    }

    /// Fails every call.
    #[must_use]
    pub fn failing(error: ProviderError) -> Self {
        let mut generator = Self::responding(Vec::new());
        generator.script.response = Err(error);
        generator
    }

    /// Waits before responding.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Returns every request received.
    #[must_use]
    pub fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    async fn generate(&self, request: ImageRequest) -> Result<Vec<ResponsePart>, ProviderError> {
        self.log
            .record("image.generate", format!("{} images", request.images.len()));
        self.requests.lock().push(request);
        self.script.play().await
    }
}

/// Video provider whose job completes after a fixed number of status checks.
#[derive(Debug)]
pub struct FakeVideoProvider {
    log: CallLog,
    job_id: Result<Option<String>, ProviderError>,
    completes_after: Option<u32>,
    media_url: String,
    checks: AtomicU32,
}

impl FakeVideoProvider {
    /// Job `job_id` completes on the `checks`-th status check.
    #[must_use]
    pub fn completing_after(job_id: impl Into<String>, checks: u32) -> Self {
        Self {
            log: CallLog::new(),
            job_id: Ok(Some(job_id.into())),
            completes_after: Some(checks),
            media_url: "https://cdn.example.com/campaign.mp4".to_string(),
            checks: AtomicU32::new(0),
        }
    }

    /// The job never completes.
    #[must_use]
    pub fn never_completing(job_id: impl Into<String>) -> Self {
        let mut provider = Self::completing_after(job_id, 0);
        provider.completes_after = None;
        provider
    }

    /// Submission returns no job id.
    #[must_use]
    pub fn without_job_id() -> Self {
        let mut provider = Self::never_completing(String::new());
        provider.job_id = Ok(None);
        provider
    }

    /// Submission fails.
    #[must_use]
    pub fn failing(error: ProviderError) -> Self {
        let mut provider = Self::never_completing(String::new());
        provider.job_id = Err(error);
        provider
    }

    /// Sets the media URL of the completed job.
    #[must_use]
    pub fn with_media_url(mut self, url: impl Into<String>) -> Self {
        self.media_url = url.into();
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Returns the number of status checks made.
    #[must_use]
    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoProvider for FakeVideoProvider {
    async fn create(&self, brand_id: &str, prompt: &str) -> Result<Option<String>, ProviderError> {
        self.log.record("video.create", format!("{brand_id}:{prompt}"));
        self.job_id.clone()
    }

    async fn list_jobs(
        &self,
        brand_id: &str,
        filter: &JobFilter,
    ) -> Result<Vec<VideoJob>, ProviderError> {
        self.log
            .record("video.list_jobs", format!("{brand_id}:{}", filter.media_type));
        let check = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        let id = self.job_id.clone().ok().flatten().unwrap_or_default();
        let done = self.completes_after.is_some_and(|after| check >= after);
        Ok(vec![
            VideoJob {
                id: "older-job".to_string(),
                status: VideoJob::COMPLETED.to_string(),
                media_url: Some("https://cdn.example.com/older.mp4".to_string()),
            },
            VideoJob {
                id,
                status: if done { VideoJob::COMPLETED } else { "inProgress" }.to_string(),
                media_url: done.then(|| self.media_url.clone()),
            },
        ])
    }
}

/// A full set of fakes sharing one call log.
///
/// Defaults: the planner asks for all three modalities, every provider
/// succeeds, reference images `img-1` and `img-2` exist and the video job
/// completes on the second status check.
#[derive(Debug, Clone)]
pub struct FakeServices {
    /// Shared call log.
    pub log: CallLog,
    /// Project record store.
    pub projects: Arc<FakeProjectStore>,
    /// Artifact store, also serving reference images.
    pub artifacts: Arc<FakeArtifactStore>,
    /// Planner.
    pub planner: Arc<FakePlanner>,
    /// Text generator.
    pub text: Arc<FakeTextGenerator>,
    /// Image generator.
    pub image_generator: Arc<FakeImageGenerator>,
    /// Video provider.
    pub video: Arc<FakeVideoProvider>,
}

impl Default for FakeServices {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServices {
    /// Creates fakes with the default behavior.
    #[must_use]
    pub fn new() -> Self {
        let log = CallLog::new();
        let projects = Arc::new(FakeProjectStore::new().with_log(log.clone()));
        let artifacts = Arc::new(
            FakeArtifactStore::new()
                .with_artifact("img-1", sample_image_bytes(), Some("image/png"))
                .with_artifact("img-2", sample_image_bytes(), None)
                .with_log(log.clone()),
        );
        artifacts.attach_projects(Arc::clone(&projects));
        Self {
            planner: Arc::new(
                FakePlanner::responding(planner_json(
                    Some("Write an energetic caption"),
                    Some("Place the shoe on a city track at dawn"),
                    Some("A 15 second teaser of the shoe in motion"),
                ))
                .with_log(log.clone()),
            ),
            text: Arc::new(
                FakeTextGenerator::responding("Run further, pay less.").with_log(log.clone()),
            ),
            image_generator: Arc::new(FakeImageGenerator::with_image().with_log(log.clone())),
            video: Arc::new(FakeVideoProvider::completing_after("job-1", 2).with_log(log.clone())),
            log,
            projects,
            artifacts,
        }
    }

    /// Replaces the project store.
    #[must_use]
    pub fn with_projects(mut self, projects: FakeProjectStore) -> Self {
        self.projects = Arc::new(projects.with_log(self.log.clone()));
        self.artifacts.attach_projects(Arc::clone(&self.projects));
        self
    }

    /// Replaces the artifact store. Reference images `img-1` and `img-2`
    /// must be seeded on it if the image branch should find them.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: FakeArtifactStore) -> Self {
        self.artifacts = Arc::new(artifacts.with_log(self.log.clone()));
        self.artifacts.attach_projects(Arc::clone(&self.projects));
        self
    }

    /// Replaces the planner.
    #[must_use]
    pub fn with_planner(mut self, planner: FakePlanner) -> Self {
        self.planner = Arc::new(planner.with_log(self.log.clone()));
        self
    }

    /// Replaces the text generator.
    #[must_use]
    pub fn with_text(mut self, text: FakeTextGenerator) -> Self {
        self.text = Arc::new(text.with_log(self.log.clone()));
        self
    }

    /// Replaces the image generator.
    #[must_use]
    pub fn with_image_generator(mut self, generator: FakeImageGenerator) -> Self {
        self.image_generator = Arc::new(generator.with_log(self.log.clone()));
        self
    }

    /// Replaces the video provider.
    #[must_use]
    pub fn with_video(mut self, video: FakeVideoProvider) -> Self {
        self.video = Arc::new(video.with_log(self.log.clone()));
        self
    }

    /// Builds a [`Services`] bundle sharing these fakes.
    #[must_use]
    pub fn services(&self) -> Services {
        Services {
            projects: Arc::clone(&self.projects) as Arc<dyn ProjectStore>,
            artifacts: Arc::clone(&self.artifacts) as Arc<dyn ArtifactStore>,
            images: Arc::new(ArtifactImageSource::new(
                Arc::clone(&self.artifacts) as Arc<dyn ArtifactStore>
            )),
            planner: Arc::clone(&self.planner) as Arc<dyn InstructionPlanner>,
            text: Arc::clone(&self.text) as Arc<dyn TextGenerator>,
            image_generator: Arc::clone(&self.image_generator) as Arc<dyn ImageGenerator>,
            video: Arc::clone(&self.video) as Arc<dyn VideoProvider>,
            video_brand_id: "brand-test".to_string(),
        }
    }

    /// Consumes the fakes into a [`Services`] bundle.
    #[must_use]
    pub fn into_services(self) -> Services {
        self.services()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_project_store_creates_record_on_first_write() {
        let store = FakeProjectStore::new();
        assert_eq!(store.get_generated_output("p1").await.unwrap(), None);

        store
            .upsert_output_field("p1", OutputField::Text, "copy")
            .await
            .unwrap();

        let record = store.record("p1").unwrap();
        assert_eq!(record.id, "output-p1");
        assert_eq!(record.text.as_deref(), Some("copy"));
    }

    #[tokio::test]
    async fn test_video_completes_on_requested_check() {
        let video = FakeVideoProvider::completing_after("job-9", 2);
        let filter = JobFilter::default();

        let first = video.list_jobs("b", &filter).await.unwrap();
        assert!(first.iter().all(|job| job.completed_url("job-9").is_none()));

        let second = video.list_jobs("b", &filter).await.unwrap();
        assert_eq!(
            second.iter().find_map(|job| job.completed_url("job-9")),
            Some("https://cdn.example.com/campaign.mp4")
        );
        assert_eq!(video.checks(), 2);
    }

    #[tokio::test]
    async fn test_call_log_is_shared() {
        let fakes = FakeServices::new();
        let services = fakes.services();

        services.text.generate("persona", "prompt").await.unwrap();
        services.planner.plan("persona", "Product Name: x").await.unwrap();

        assert_eq!(fakes.log.count("text.generate"), 1);
        assert_eq!(fakes.log.position("planner.plan"), Some(1));
    }
}
