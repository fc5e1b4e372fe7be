//! Run context and partial updates.
//!
//! This module provides:
//! - Campaign identifiers and marketing parameters from the trigger payload
//! - The mutable [`RunContext`] threaded through a run
//! - Field-owned [`ContextUpdate`]s that stages return for merging

mod identity;
mod run;
mod update;

pub use identity::CampaignIdentity;
pub use run::{
    CampaignTrigger, GeneratedImage, GeneratedOutputs, Instructions, MarketingParams, RunContext,
};
pub use update::{ContextField, ContextUpdate, FieldUpdate};
