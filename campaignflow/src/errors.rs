//! Error types for the campaignflow orchestrator.
//!
//! Provider calls fail with [`ProviderError`]; stages convert those into soft
//! failures. [`CampaignflowError`] is reserved for faults that end a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for campaignflow operations.
#[derive(Debug, Error)]
pub enum CampaignflowError {
    /// The stage graph failed validation.
    #[error("{0}")]
    Validation(#[from] GraphValidationError),

    /// Two branches wrote the same context field in one pass.
    #[error("{0}")]
    DataConflict(#[from] DataConflictError),

    /// A provider call failed and was not absorbed by a stage.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// A run status moved backwards.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Status before the update.
        from: String,
        /// Rejected target status.
        to: String,
    },

    /// The run exceeded its deadline.
    #[error("Workflow timed out after {seconds}s")]
    Timeout {
        /// Configured deadline in seconds.
        seconds: f64,
    },

    /// The run was cancelled.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// A configuration value was missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by external collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// The request could not be sent or the connection failed.
    #[error("{provider}: transport error: {message}")]
    Transport {
        /// Provider name.
        provider: String,
        /// Underlying error message.
        message: String,
    },

    /// The provider answered with a non-success status code.
    #[error("{provider}: HTTP {status}: {body}")]
    Status {
        /// Provider name.
        provider: String,
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// The response body could not be decoded.
    #[error("{provider}: invalid response: {message}")]
    Decode {
        /// Provider name.
        provider: String,
        /// Decoder message.
        message: String,
    },

    /// The response was well-formed but carried nothing usable.
    #[error("{provider}: empty response")]
    Empty {
        /// Provider name.
        provider: String,
    },

    /// The call did not finish within its time limit.
    #[error("{provider}: timed out after {seconds}s")]
    Timeout {
        /// Provider name.
        provider: String,
        /// Limit in seconds.
        seconds: f64,
    },

    /// The requested resource does not exist.
    #[error("{provider}: not found: {resource}")]
    NotFound {
        /// Provider name.
        provider: String,
        /// Resource identifier.
        resource: String,
    },
}

impl ProviderError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a status error, truncating long bodies.
    #[must_use]
    pub fn status(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > 512 {
            let mut cut = 512;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self::Status {
            provider: provider.into(),
            status,
            body,
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates an empty-response error.
    #[must_use]
    pub fn empty(provider: impl Into<String>) -> Self {
        Self::Empty {
            provider: provider.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(provider: impl Into<String>, seconds: f64) -> Self {
        Self::Timeout {
            provider: provider.into(),
            seconds,
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(provider: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::NotFound {
            provider: provider.into(),
            resource: resource.into(),
        }
    }

    /// Returns true for errors caused by a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Status { status: 404, .. })
    }
}

/// Metadata about a graph validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-UNKNOWN-TARGET").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a stage graph is malformed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl GraphValidationError {
    /// Creates a new graph validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when two writers claim the same context field in one pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Data conflict: field '{field}' written by both '{first}' and '{second}'")]
pub struct DataConflictError {
    /// The contested field.
    pub field: String,
    /// The writer that claimed the field first.
    pub first: String,
    /// The conflicting writer.
    pub second: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            first: first.into(),
            second: second.into(),
        }
    }
}
