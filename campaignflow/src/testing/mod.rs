//! Testing utilities for campaignflow runs.
//!
//! This module provides:
//! - In-memory fakes for every collaborator, sharing one call log
//! - Sample triggers and provider payloads
//! - Assertions over run results and event streams

mod assertions;
mod fakes;
mod fixtures;

pub use assertions::{
    assert_branch_output, assert_completed, assert_events_before, assert_failure_recorded,
    assert_generated, assert_no_failures,
};
pub use fakes::{
    CallLog, FakeArtifactStore, FakeImageGenerator, FakePlanner, FakeProjectStore, FakeServices,
    FakeTextGenerator, FakeVideoProvider, RecordedCall,
};
pub use fixtures::{planner_json, sample_image_bytes, sample_trigger, SAMPLE_PROJECT_ID};
