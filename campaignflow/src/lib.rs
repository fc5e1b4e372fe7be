//! # Campaignflow
//!
//! A generation workflow orchestrator for multimodal marketing campaigns.
//!
//! Campaignflow turns a campaign trigger (product, audience, desired output
//! format, reference images) into generated marketing content by driving a
//! small stage graph:
//!
//! - **Manager**: routes on the run status, entering planning exactly once
//! - **Planning**: asks an instruction provider for per-modality prompts
//! - **Branches**: text, image (generate then publish) and video (submit,
//!   bounded poll, publish) run concurrently for whichever prompts exist
//! - **Join**: waits for every dispatched branch and stamps completion
//!
//! Every per-branch failure is soft: a missing output, not an error, signals
//! that a modality could not be produced. Only the outer deadline and
//! unexpected faults end a run with a hard failure.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use campaignflow::prelude::*;
//!
//! let engine = WorkflowEngine::new(services, WorkflowConfig::default())?;
//! let supervisor = RunSupervisor::new(Arc::new(engine));
//!
//! let handle = supervisor.submit(trigger);
//! let result = handle.wait().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod jobs;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod stages;
pub mod testing;

#[cfg(feature = "http")]
pub mod http;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{ExecutionMode, PollConfig, ProviderConfig, WorkflowConfig};
    pub use crate::context::{
        CampaignIdentity, CampaignTrigger, ContextUpdate, GeneratedOutputs, Instructions,
        MarketingParams, RunContext,
    };
    pub use crate::core::{
        Branch, FailureKind, Route, RunStatus, SoftFailure, StageKind, StageOutput, StageStatus,
        Terminal,
    };
    pub use crate::errors::{CampaignflowError, GraphValidationError, ProviderError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::jobs::{RunHandle, RunSupervisor};
    pub use crate::pipeline::{
        campaign_graph, GraphBuilder, RunOutcome, RunResult, WorkflowEngine, WorkflowGraph,
    };
    pub use crate::providers::{
        ArtifactStore, ImageGenerator, InstructionPlanner, LinkOutcome, OutputField, ProjectStore,
        ReferenceImageSource, Services, TextGenerator, VideoProvider,
    };
    pub use crate::stages::{Stage, StageContext};
    pub use std::sync::Arc;
}
