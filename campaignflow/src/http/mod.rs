//! HTTP-backed collaborators.
//!
//! Each client implements one or more of the traits in
//! [`crate::providers`] over `reqwest`:
//! - [`GroqPlanner`]: OpenAI-compatible chat completions for planning
//! - [`GeminiClient`]: text and multimodal image generation
//! - [`PredisClient`]: video job submission and listing
//! - [`BackendClient`]: the project backend (records and artifacts)
//!
//! [`build_services`] wires all of them into a [`Services`] bundle.

mod backend;
mod gemini;
mod groq;
mod predis;

pub use backend::BackendClient;
pub use gemini::GeminiClient;
pub use groq::GroqPlanner;
pub use predis::PredisClient;

use crate::config::ProviderConfig;
use crate::errors::{CampaignflowError, ProviderError};
use crate::providers::{ArtifactImageSource, Services};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout applied by the shared client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds the shared HTTP client.
///
/// # Errors
///
/// Returns a config error if the TLS backend cannot be initialized.
pub fn http_client() -> Result<reqwest::Client, CampaignflowError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| CampaignflowError::Config(format!("failed to build HTTP client: {e}")))
}

/// Builds the production collaborator bundle from provider settings.
///
/// # Errors
///
/// Returns a config error if the HTTP client cannot be built.
pub fn build_services(config: &ProviderConfig) -> Result<Services, CampaignflowError> {
    let client = http_client()?;

    let backend = Arc::new(BackendClient::new(client.clone(), &config.backend_url));
    let gemini = Arc::new(GeminiClient::new(
        client.clone(),
        &config.gemini_base_url,
        &config.google_api_key,
        &config.text_model,
        &config.image_model,
    ));
    let planner = GroqPlanner::new(
        client.clone(),
        &config.planner_base_url,
        &config.planner_api_key,
        &config.planner_model,
    );
    let video = PredisClient::new(client, &config.video_base_url, &config.video_api_key);

    Ok(Services {
        projects: backend.clone(),
        artifacts: backend.clone(),
        images: Arc::new(ArtifactImageSource::new(backend)),
        planner: Arc::new(planner),
        text: gemini.clone(),
        image_generator: gemini,
        video: Arc::new(video),
        video_brand_id: config.video_brand_id.clone(),
    })
}

pub(crate) fn transport_error(provider: &str, error: &reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(provider, REQUEST_TIMEOUT.as_secs_f64())
    } else {
        ProviderError::transport(provider, error.to_string())
    }
}

/// Sends a request, mapping transport failures and non-success statuses.
pub(crate) async fn send(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::status(provider, status.as_u16(), body))
}

pub(crate) async fn decode_json<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, &e))?;
    serde_json::from_str(&body).map_err(|e| ProviderError::decode(provider, e.to_string()))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
