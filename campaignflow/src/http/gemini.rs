//! Gemini `generateContent` client for copy and multimodal images.

use super::{decode_json, join_url, send};
use crate::errors::ProviderError;
use crate::providers::{ImageGenerator, ImageRequest, Modality, ResponsePart, TextGenerator};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

const TEXT_PROVIDER: &str = "text";
const IMAGE_PROVIDER: &str = "image";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<Modality>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }
}

impl GenerateResponse {
    fn into_parts(self) -> Vec<Part> {
        self.candidates
            .into_iter()
            .next()
            .map(|candidate| candidate.content.parts)
            .unwrap_or_default()
    }
}

fn text_request(persona: &str, prompt: &str) -> GenerateRequest {
    GenerateRequest {
        system_instruction: Some(Content {
            role: None,
            parts: vec![Part::text(persona)],
        }),
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(prompt)],
        }],
        generation_config: None,
    }
}

fn image_request(request: &ImageRequest) -> GenerateRequest {
    let mut parts = Vec::with_capacity(request.images.len() + 1);
    parts.push(Part::text(&request.instruction));
    parts.extend(request.images.iter().map(|image| Part {
        text: None,
        inline_data: Some(InlineData {
            mime_type: image.mime_type.clone(),
            data: STANDARD.encode(&image.bytes),
        }),
    }));
    GenerateRequest {
        system_instruction: None,
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: Some(GenerationConfig {
            response_modalities: request.modalities.clone(),
        }),
    }
}

/// Converts response parts, keeping text and the first decodable inline part.
///
/// Inline parts that fail to decode are skipped; the response is only
/// rejected when every inline part is undecodable.
fn response_parts(parts: Vec<Part>) -> Result<Vec<ResponsePart>, ProviderError> {
    let mut out = Vec::with_capacity(parts.len());
    let mut decode_error = None;
    for part in parts {
        if let Some(inline) = part.inline_data {
            match STANDARD.decode(inline.data.as_bytes()) {
                Ok(data) => {
                    out.push(ResponsePart::InlineData {
                        mime_type: inline.mime_type,
                        data,
                    });
                    return Ok(out);
                }
                Err(e) => {
                    debug!(error = %e, "Skipping undecodable inline part");
                    decode_error.get_or_insert(e);
                }
            }
        } else if let Some(text) = part.text {
            out.push(ResponsePart::Text(text));
        }
    }
    match decode_error {
        Some(e) => Err(ProviderError::decode(IMAGE_PROVIDER, e.to_string())),
        None => Ok(out),
    }
}

/// Gemini API client serving both text and image generation.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    /// Creates a client.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        text_model: &str,
        image_model: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            text_model: text_model.to_string(),
            image_model: image_model.to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        join_url(&self.base_url, &format!("models/{model}:generateContent"))
    }

    async fn generate_content(
        &self,
        provider: &str,
        model: &str,
        body: &GenerateRequest,
    ) -> Result<Vec<Part>, ProviderError> {
        debug!(model, "Calling generateContent");
        let request = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body);
        let response = send(provider, request).await?;
        let body: GenerateResponse = decode_json(provider, response).await?;
        Ok(body.into_parts())
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, persona: &str, prompt: &str) -> Result<String, ProviderError> {
        let parts = self
            .generate_content(TEXT_PROVIDER, &self.text_model, &text_request(persona, prompt))
            .await?;
        let text: String = parts.into_iter().filter_map(|part| part.text).collect();
        if text.trim().is_empty() {
            return Err(ProviderError::empty(TEXT_PROVIDER));
        }
        Ok(text)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(&self, request: ImageRequest) -> Result<Vec<ResponsePart>, ProviderError> {
        let parts = self
            .generate_content(IMAGE_PROVIDER, &self.image_model, &image_request(&request))
            .await?;
        response_parts(parts)
    }
}
