//! Workflow and provider configuration.

use crate::errors::CampaignflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lower bound on the wait between video status checks.
pub const MIN_POLL_INTERVAL_SECONDS: f64 = 10.0;

/// Upper bound on the wait between video status checks.
pub const MAX_POLL_INTERVAL_SECONDS: f64 = 15.0;

/// Upper bound on video status checks per job.
pub const MAX_POLL_ATTEMPTS: u32 = 15;

/// Ceiling for the deadline and every timeout, in seconds (one day).
pub const MAX_TIMEOUT_SECONDS: f64 = 86_400.0;

/// Converts validated seconds to a duration without panicking on bad input.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.min(MAX_TIMEOUT_SECONDS)).unwrap_or_default()
}

/// How dispatched branches are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Dispatched branches run concurrently.
    #[default]
    Parallel,
    /// Dispatched branches run one after another in text, image, video order.
    Sequential,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

/// Bounds for the video status poll loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum number of status checks.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait before each status check, in seconds.
    #[serde(default = "default_interval")]
    pub interval_seconds: f64,
}

fn default_max_attempts() -> u32 {
    15
}

fn default_interval() -> f64 {
    15.0
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_seconds: default_interval(),
        }
    }
}

impl PollConfig {
    /// Creates a poll configuration.
    #[must_use]
    pub fn new(max_attempts: u32, interval_seconds: f64) -> Self {
        Self {
            max_attempts,
            interval_seconds,
        }
    }

    /// Returns the wait before each attempt.
    #[must_use]
    pub fn interval(&self) -> Duration {
        seconds(
            self.interval_seconds
                .max(MIN_POLL_INTERVAL_SECONDS)
                .min(MAX_POLL_INTERVAL_SECONDS),
        )
    }

    /// Returns the longest time the loop can spend waiting.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.interval() * self.max_attempts
    }

    /// Validates the bounds.
    ///
    /// # Errors
    ///
    /// Returns a config error when attempts fall outside `1..=15` or the
    /// interval falls outside 10 to 15 seconds.
    pub fn validate(&self) -> Result<(), CampaignflowError> {
        if !(1..=MAX_POLL_ATTEMPTS).contains(&self.max_attempts) {
            return Err(CampaignflowError::Config(format!(
                "poll.max_attempts must be between 1 and {MAX_POLL_ATTEMPTS}, got {}",
                self.max_attempts
            )));
        }
        if !(MIN_POLL_INTERVAL_SECONDS..=MAX_POLL_INTERVAL_SECONDS).contains(&self.interval_seconds) {
            return Err(CampaignflowError::Config(format!(
                "poll.interval_seconds must be between {MIN_POLL_INTERVAL_SECONDS} and \
                 {MAX_POLL_INTERVAL_SECONDS}, got {}",
                self.interval_seconds
            )));
        }
        Ok(())
    }
}

/// Engine-level configuration for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Overall run deadline in seconds.
    #[serde(default = "default_deadline")]
    pub deadline_seconds: f64,
    /// Branch scheduling mode.
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Video poll loop bounds.
    #[serde(default)]
    pub poll: PollConfig,
    /// Timeout for the planning call.
    #[serde(default = "default_planning_timeout")]
    pub planning_timeout_seconds: f64,
    /// Timeout for each generation provider call.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: f64,
    /// Timeout for each record-store or artifact-store call.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_seconds: f64,
    /// Upper bound on stage executions in one run.
    #[serde(default = "default_max_stage_visits")]
    pub max_stage_visits: usize,
}

fn default_deadline() -> f64 {
    300.0
}

fn default_planning_timeout() -> f64 {
    45.0
}

fn default_provider_timeout() -> f64 {
    30.0
}

fn default_store_timeout() -> f64 {
    10.0
}

fn default_max_stage_visits() -> usize {
    32
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: default_deadline(),
            execution_mode: ExecutionMode::default(),
            poll: PollConfig::default(),
            planning_timeout_seconds: default_planning_timeout(),
            provider_timeout_seconds: default_provider_timeout(),
            store_timeout_seconds: default_store_timeout(),
            max_stage_visits: default_max_stage_visits(),
        }
    }
}

impl WorkflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overall deadline.
    #[must_use]
    pub fn with_deadline_seconds(mut self, seconds: f64) -> Self {
        self.deadline_seconds = seconds;
        self
    }

    /// Sets the execution mode.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Sets the poll bounds.
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Sets the planning timeout.
    #[must_use]
    pub fn with_planning_timeout_seconds(mut self, seconds: f64) -> Self {
        self.planning_timeout_seconds = seconds;
        self
    }

    /// Sets the provider call timeout.
    #[must_use]
    pub fn with_provider_timeout_seconds(mut self, seconds: f64) -> Self {
        self.provider_timeout_seconds = seconds;
        self
    }

    /// Sets the store call timeout.
    #[must_use]
    pub fn with_store_timeout_seconds(mut self, seconds: f64) -> Self {
        self.store_timeout_seconds = seconds;
        self
    }

    /// Returns the overall deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        seconds(self.deadline_seconds)
    }

    /// Returns the planning timeout.
    #[must_use]
    pub fn planning_timeout(&self) -> Duration {
        seconds(self.planning_timeout_seconds)
    }

    /// Returns the provider call timeout.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        seconds(self.provider_timeout_seconds)
    }

    /// Returns the store call timeout.
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        seconds(self.store_timeout_seconds)
    }

    /// Validates every bound.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first invalid setting.
    pub fn validate(&self) -> Result<(), CampaignflowError> {
        for (name, value) in [
            ("deadline_seconds", self.deadline_seconds),
            ("planning_timeout_seconds", self.planning_timeout_seconds),
            ("provider_timeout_seconds", self.provider_timeout_seconds),
            ("store_timeout_seconds", self.store_timeout_seconds),
        ] {
            if !(value > 0.0 && value <= MAX_TIMEOUT_SECONDS) {
                return Err(CampaignflowError::Config(format!(
                    "{name} must be positive and at most {MAX_TIMEOUT_SECONDS} seconds, got {value}"
                )));
            }
        }
        if self.max_stage_visits == 0 {
            return Err(CampaignflowError::Config(
                "max_stage_visits must be at least 1".to_string(),
            ));
        }
        self.poll.validate()
    }
}

/// Credentials and endpoints for the HTTP-backed collaborators.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key for the instruction planner.
    pub planner_api_key: String,
    /// API key for the text and image generation provider.
    pub google_api_key: String,
    /// Brand identifier for the video provider.
    pub video_brand_id: String,
    /// API key for the video provider.
    pub video_api_key: String,
    /// Base URL of the project backend.
    pub backend_url: String,
    /// Planner chat model.
    #[serde(default = "default_planner_model")]
    pub planner_model: String,
    /// Text generation model.
    #[serde(default = "default_text_model")]
    pub text_model: String,
    /// Image generation model.
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Base URL of the OpenAI-compatible planner API.
    #[serde(default = "default_planner_base_url")]
    pub planner_base_url: String,
    /// Base URL of the Gemini API.
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    /// Base URL of the video provider API.
    #[serde(default = "default_video_base_url")]
    pub video_base_url: String,
}

fn default_planner_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_text_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_image_model() -> String {
    "gemini-2.0-flash-preview-image-generation".to_string()
}

fn default_planner_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_video_base_url() -> String {
    "https://brain.predis.ai/predis_api/v1".to_string()
}

impl ProviderConfig {
    /// Loads the configuration from environment variables.
    ///
    /// Required: `GROQ_API`, `GOOGLE_API_KEY`, `PREDIS_BRAND_ID`,
    /// `PREDIS_API_KEY`, `CAMPAIGN_BACKEND_URL`. Optional model overrides:
    /// `PLANNER_MODEL`, `TEXT_MODEL`, `IMAGE_MODEL`.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first missing variable.
    pub fn from_env() -> Result<Self, CampaignflowError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first missing variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CampaignflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| {
                    CampaignflowError::Config(format!("missing environment variable {key}"))
                })
        };
        let optional = |key: &str, default: fn() -> String| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(default)
        };

        Ok(Self {
            planner_api_key: required("GROQ_API")?,
            google_api_key: required("GOOGLE_API_KEY")?,
            video_brand_id: required("PREDIS_BRAND_ID")?,
            video_api_key: required("PREDIS_API_KEY")?,
            backend_url: required("CAMPAIGN_BACKEND_URL")?
                .trim_end_matches('/')
                .to_string(),
            planner_model: optional("PLANNER_MODEL", default_planner_model),
            text_model: optional("TEXT_MODEL", default_text_model),
            image_model: optional("IMAGE_MODEL", default_image_model),
            planner_base_url: default_planner_base_url(),
            gemini_base_url: default_gemini_base_url(),
            video_base_url: default_video_base_url(),
        })
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("ProviderConfig")
            .field("planner_api_key", &REDACTED)
            .field("google_api_key", &REDACTED)
            .field("video_brand_id", &self.video_brand_id)
            .field("video_api_key", &REDACTED)
            .field("backend_url", &self.backend_url)
            .field("planner_model", &self.planner_model)
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .finish_non_exhaustive()
    }
}
