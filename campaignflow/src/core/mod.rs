//! Core domain model types for campaignflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Run status, routes and terminal outcomes
//! - Stage status and kind enums
//! - Stage output type with factory methods
//! - The soft/hard failure taxonomy

mod branch;
mod failure;
mod output;
mod status;

pub use branch::{
    Branch, IMAGE_GENERATE_STAGE, IMAGE_PUBLISH_STAGE, JOIN_STAGE, MANAGER_STAGE, PLANNING_STAGE,
    TEXT_STAGE, VIDEO_STAGE,
};
pub use failure::{FailureKind, SoftFailure};
pub use output::StageOutput;
pub use status::{Route, RunStatus, StageKind, StageStatus, Terminal};
