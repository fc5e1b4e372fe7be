//! Project backend client: generated-output records and image artifacts.

use super::{decode_json, join_url, send, transport_error};
use crate::errors::ProviderError;
use crate::providers::{
    ArtifactStore, ArtifactUpload, GeneratedOutputRecord, LinkOutcome, OutputField, ProjectStore,
    StoredArtifact,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

const PROVIDER: &str = "backend";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    image_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    video: Option<String>,
}

impl From<RecordResponse> for GeneratedOutputRecord {
    fn from(record: RecordResponse) -> Self {
        Self {
            id: record.id,
            text: record.text,
            image: record.image,
            video: record.video,
        }
    }
}

/// Client for the project backend's REST API.
///
/// Text and video fields are written with form PUTs. The image field is
/// written by the backend as a side effect of [`ArtifactStore::store`].
///
/// Linking goes straight to the backend's link endpoint, which resolves the
/// project's record itself and answers 404 when there is none. Record reads
/// need a lookup route set with [`BackendClient::with_output_route`].
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    output_route: Option<String>,
}

impl BackendClient {
    /// Creates a client against the backend root URL.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            output_route: None,
        }
    }

    /// Sets the generated-output lookup route.
    ///
    /// `{project_id}` is substituted before the request is sent.
    #[must_use]
    pub fn with_output_route(mut self, route: impl Into<String>) -> Self {
        self.output_route = Some(route.into());
        self
    }

    fn project_url(&self, path: &str, project_id: &str) -> String {
        join_url(&self.base_url, &format!("api/project/{path}/{project_id}"))
    }

    fn output_url(&self, project_id: &str) -> Option<String> {
        self.output_route
            .as_ref()
            .map(|route| join_url(&self.base_url, &route.replace("{project_id}", project_id)))
    }

    fn field_route(field: OutputField) -> Option<(&'static str, &'static str)> {
        match field {
            OutputField::Text => Some(("upload-generated-text", "text")),
            OutputField::Video => Some(("upload-generated-video", "video_output")),
            OutputField::Image => None,
        }
    }
}

#[async_trait]
impl ProjectStore for BackendClient {
    async fn upsert_output_field(
        &self,
        project_id: &str,
        field: OutputField,
        value: &str,
    ) -> Result<(), ProviderError> {
        let Some((path, form_field)) = Self::field_route(field) else {
            return Err(ProviderError::transport(
                PROVIDER,
                "image field is written through the artifact upload",
            ));
        };
        debug!(project_id, field = %field, "Writing generated output field");
        let request = self
            .client
            .put(self.project_url(path, project_id))
            .form(&[(form_field, value)]);
        send(PROVIDER, request).await?;
        Ok(())
    }

    async fn link_output(&self, project_id: &str, _output_id: &str) -> Result<(), ProviderError> {
        let request = self
            .client
            .put(self.project_url("update/generated-output", project_id));
        match send(PROVIDER, request).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                Err(ProviderError::not_found(PROVIDER, "generated output"))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_generated_output(
        &self,
        project_id: &str,
    ) -> Result<Option<GeneratedOutputRecord>, ProviderError> {
        let Some(url) = self.output_url(project_id) else {
            return Err(ProviderError::transport(
                PROVIDER,
                "no generated-output lookup route configured",
            ));
        };
        match send(PROVIDER, self.client.get(url)).await {
            Ok(response) => {
                let record: RecordResponse = decode_json(PROVIDER, response).await?;
                Ok(Some(record.into()))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn link_generated_output(&self, project_id: &str) -> Result<LinkOutcome, ProviderError> {
        debug!(project_id, "Linking generated output");
        match self.link_output(project_id, "").await {
            Ok(()) => Ok(LinkOutcome::Linked { output_id: None }),
            Err(e) if e.is_not_found() => Ok(LinkOutcome::NoRecord),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ArtifactStore for BackendClient {
    async fn store(&self, upload: ArtifactUpload) -> Result<String, ProviderError> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.name.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| ProviderError::transport(PROVIDER, e.to_string()))?;
        let request = self
            .client
            .put(self.project_url("upload-generated-image", &upload.project_id))
            .multipart(Form::new().part("image_output", part));

        let response = send(PROVIDER, request).await?;
        let body: UploadResponse = decode_json(PROVIDER, response).await?;
        Ok(body
            .image_id
            .filter(|id| !id.is_empty())
            .unwrap_or(upload.name))
    }

    async fn fetch(&self, reference: &str) -> Result<StoredArtifact, ProviderError> {
        let url = join_url(&self.base_url, &format!("api/project/uploaded/image/{reference}"));
        let response = match send(PROVIDER, self.client.get(url)).await {
            Ok(response) => response,
            Err(ProviderError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Err(ProviderError::not_found(PROVIDER, reference));
            }
            Err(e) => return Err(e),
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;
        Ok(StoredArtifact {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
