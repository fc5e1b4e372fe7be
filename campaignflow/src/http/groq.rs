//! Instruction planning over an OpenAI-compatible chat completions API.

use super::{decode_json, join_url, send};
use crate::errors::ProviderError;
use crate::providers::InstructionPlanner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PROVIDER: &str = "planner";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
    }
}

/// Chat-completions planner.
#[derive(Debug, Clone)]
pub struct GroqPlanner {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GroqPlanner {
    /// Creates a planner against `base_url` (e.g. `https://api.groq.com/openai/v1`).
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: join_url(base_url, "chat/completions"),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: 0.7,
        }
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request<'a>(&'a self, persona: &'a str, context: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: persona,
                },
                ChatMessage {
                    role: "user",
                    content: context,
                },
            ],
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl InstructionPlanner for GroqPlanner {
    async fn plan(&self, persona: &str, context: &str) -> Result<String, ProviderError> {
        debug!(model = %self.model, "Requesting campaign plan");
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(persona, context));
        let response = send(PROVIDER, request).await?;
        let body: ChatResponse = decode_json(PROVIDER, response).await?;
        body.into_content().ok_or_else(|| ProviderError::empty(PROVIDER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let planner = GroqPlanner::new(
            reqwest::Client::new(),
            "https://api.groq.com/openai/v1/",
            "key",
            "llama-3.1-8b-instant",
        );
        assert_eq!(
            planner.endpoint,
            "https://api.groq.com/openai/v1/chat/completions"
        );

        let value = serde_json::to_value(planner.request("persona", "context")).unwrap();
        assert_eq!(value["model"], "llama-3.1-8b-instant");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "persona");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "context");
        assert!((value["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_response_takes_first_choice() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [
                {"message": {"role": "assistant", "content": "{\"text_prompt\": \"x\"}"}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ]
        }))
        .unwrap();
        assert_eq!(body.into_content().as_deref(), Some("{\"text_prompt\": \"x\"}"));
    }

    #[test]
    fn test_blank_or_missing_content_is_empty() {
        let blank: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": "  "}}]})).unwrap();
        assert!(blank.into_content().is_none());

        let none: ChatResponse = serde_json::from_value(json!({})).unwrap();
        assert!(none.into_content().is_none());
    }
}
