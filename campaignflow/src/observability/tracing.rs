//! Structured tracing for orchestration runs.

use crate::context::CampaignIdentity;
use crate::errors::CampaignflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. With `json`
/// set, events are written as one JSON object per line.
///
/// # Errors
///
/// Returns a config error if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<(), CampaignflowError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| CampaignflowError::Config(format!("tracing init failed: {e}")))
}

/// Span attributes for a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSpanAttributes {
    /// Run ID.
    pub run_id: Option<String>,
    /// Campaign identifiers.
    pub identity: Option<CampaignIdentity>,
    /// Execution mode.
    pub execution_mode: Option<String>,
    /// Initial run status.
    pub initial_status: Option<String>,
}

impl RunSpanAttributes {
    /// Creates new run span attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run ID.
    #[must_use]
    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    /// Sets the campaign identifiers.
    #[must_use]
    pub fn with_identity(mut self, identity: CampaignIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sets the execution mode.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: impl Into<String>) -> Self {
        self.execution_mode = Some(mode.into());
        self
    }

    /// Sets the status the run started from.
    #[must_use]
    pub fn with_initial_status(mut self, status: impl Into<String>) -> Self {
        self.initial_status = Some(status.into());
        self
    }

    /// Flattens into string attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = self
            .identity
            .as_ref()
            .map(CampaignIdentity::to_attributes)
            .unwrap_or_default();

        if let Some(ref v) = self.run_id {
            attrs.insert("run.id".to_string(), v.clone());
        }
        if let Some(ref v) = self.execution_mode {
            attrs.insert("run.execution_mode".to_string(), v.clone());
        }
        if let Some(ref v) = self.initial_status {
            attrs.insert("run.initial_status".to_string(), v.clone());
        }
        attrs
    }
}

/// Span attributes for one stage execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage_name: String,
    /// Stage kind.
    pub stage_kind: Option<String>,
    /// Stage status.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Soft failures absorbed by the stage.
    pub failures: Vec<String>,
    /// Context fields written.
    pub fields: Vec<String>,
}

impl StageSpanAttributes {
    /// Creates new stage span attributes.
    #[must_use]
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            ..Default::default()
        }
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.stage_kind = Some(kind.into());
        self
    }

    /// Sets the stage status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the absorbed failure labels.
    #[must_use]
    pub fn with_failures(mut self, failures: Vec<String>) -> Self {
        self.failures = failures;
        self
    }

    /// Sets the written field names.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// Converts to a JSON payload for event sinks.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "stage": self.stage_name,
            "kind": self.stage_kind,
            "status": self.status,
            "duration_ms": self.duration_ms,
            "failures": self.failures,
            "fields": self.fields,
        })
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_attributes_include_identity() {
        let attrs = RunSpanAttributes::new()
            .with_run_id("run-1")
            .with_identity(CampaignIdentity::new("u", "p", "prod"))
            .with_execution_mode("parallel")
            .to_attributes();

        assert_eq!(attrs.get("run.id"), Some(&"run-1".to_string()));
        assert_eq!(attrs.get("campaign.project_id"), Some(&"p".to_string()));
        assert_eq!(attrs.get("run.execution_mode"), Some(&"parallel".to_string()));
        assert!(!attrs.contains_key("run.initial_status"));
    }

    #[test]
    fn test_stage_attributes_json() {
        let json = StageSpanAttributes::new("video")
            .with_kind("generate")
            .with_status("ok")
            .with_failures(vec!["poll_timeout".into()])
            .to_json();

        assert_eq!(json["stage"], "video");
        assert_eq!(json["failures"][0], "poll_timeout");
        assert!(json["duration_ms"].is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn test_span_timer_tracks_virtual_time() {
        let timer = SpanTimer::start("planning");
        tokio::time::advance(std::time::Duration::from_millis(250)).await;
        assert!(timer.elapsed_ms() >= 250.0);
        assert_eq!(timer.name(), "planning");
    }
}
