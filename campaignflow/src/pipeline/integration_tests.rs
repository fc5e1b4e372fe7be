//! End-to-end runs of the campaign graph against in-memory collaborators.

use super::*;
use crate::config::{ExecutionMode, WorkflowConfig};
use crate::core::{Branch, FailureKind, RunStatus, Terminal};
use crate::errors::ProviderError;
use crate::events::{
    CollectingEventSink, BRANCH_COMPLETED, BRANCH_DISPATCHED, JOIN_COMPLETED, RUN_COMPLETED,
    RUN_FAILED, RUN_TIMEOUT,
};
use crate::providers::ResponsePart;
use crate::stages::DISCOUNT_OVERLAY_DIRECTIVE;
use crate::testing::{
    assert_branch_output, assert_completed, assert_events_before, assert_failure_recorded,
    assert_generated, assert_no_failures, planner_json, sample_trigger, FakeImageGenerator,
    FakePlanner, FakeProjectStore, FakeServices, FakeTextGenerator, FakeVideoProvider,
    SAMPLE_PROJECT_ID,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const VIDEO_URL: &str = "https://cdn.example.com/campaign.mp4";

fn engine(fakes: &FakeServices, config: WorkflowConfig) -> (WorkflowEngine, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let engine = WorkflowEngine::new(fakes.services(), config)
        .unwrap()
        .with_event_sink(sink.clone());
    (engine, sink)
}

fn text_and_image_only() -> FakePlanner {
    FakePlanner::responding(planner_json(
        Some("Write an energetic caption"),
        Some("Place the shoe on a city track"),
        None,
    ))
}

#[tokio::test(start_paused = true)]
async fn test_all_branches_run_and_join_after_every_branch() {
    let fakes = FakeServices::new();
    let (engine, sink) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_eq!(outcome.terminal, Terminal::Display);
    assert_branch_output(outcome, Branch::Text, Some("Run further, pay less."));
    assert_branch_output(outcome, Branch::Image, Some("project-1/Trail Shoe.jpg"));
    assert_branch_output(outcome, Branch::Video, Some(VIDEO_URL));
    assert_no_failures(outcome);
    assert_eq!(
        outcome.stages_executed,
        vec![
            "manager",
            "planning",
            "text",
            "image_generate",
            "image_publish",
            "video",
            "join",
            "manager"
        ]
    );

    assert_eq!(sink.events_of_type(BRANCH_DISPATCHED).len(), 3);
    assert_eq!(sink.events_of_type(BRANCH_COMPLETED).len(), 3);
    assert_eq!(sink.events_of_type(JOIN_COMPLETED).len(), 1);
    assert_events_before(&sink, BRANCH_COMPLETED, JOIN_COMPLETED);
    assert_events_before(&sink, JOIN_COMPLETED, RUN_COMPLETED);

    let join_lookup = fakes.log.position("projects.get_generated_output").unwrap();
    for operation in ["text.generate", "artifacts.store", "video.list_jobs", "projects.upsert_output_field"] {
        assert!(fakes.log.last_position(operation).unwrap() < join_lookup, "{operation} after join");
    }

    let record = fakes.projects.record(SAMPLE_PROJECT_ID).unwrap();
    assert_eq!(record.text.as_deref(), Some("Run further, pay less."));
    assert_eq!(record.image.as_deref(), Some("project-1/Trail Shoe.jpg"));
    assert_eq!(record.video.as_deref(), Some(VIDEO_URL));
    assert_eq!(
        fakes.projects.linked_output(SAMPLE_PROJECT_ID).as_deref(),
        Some("output-project-1")
    );
    assert_eq!(outcome.generated_output_id.as_deref(), Some("output-project-1"));
    assert_eq!(outcome.project_name, "Spring Launch");
    assert_eq!(outcome.automate_campaign, Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_branches_start_together_in_parallel_mode() {
    let fakes = FakeServices::new()
        .with_text(FakeTextGenerator::responding("copy").with_delay(Duration::from_secs(20)));
    let (engine, _) = engine(&fakes, WorkflowConfig::default());

    assert_generated(&engine.run(sample_trigger()).await);

    let text = &fakes.log.calls_to("text.generate")[0];
    let image = &fakes.log.calls_to("image.generate")[0];
    let video = &fakes.log.calls_to("video.create")[0];
    assert_eq!(text.at, image.at);
    assert_eq!(text.at, video.at);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_mode_runs_branches_in_order() {
    let fakes = FakeServices::new()
        .with_text(FakeTextGenerator::responding("copy").with_delay(Duration::from_secs(20)));
    let (engine, sink) = engine(
        &fakes,
        WorkflowConfig::default().with_execution_mode(ExecutionMode::Sequential),
    );

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_branch_output(outcome, Branch::Text, Some("copy"));
    assert_branch_output(outcome, Branch::Video, Some(VIDEO_URL));
    let text = &fakes.log.calls_to("text.generate")[0];
    let image = &fakes.log.calls_to("image.generate")[0];
    let video = &fakes.log.calls_to("video.create")[0];
    assert!(image.at - text.at >= Duration::from_secs(20));
    assert!(fakes.log.position("artifacts.store") < fakes.log.position("video.create"));
    assert!(video.at >= image.at);
    assert_eq!(sink.events_of_type(JOIN_COMPLETED).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_image_without_bytes_never_publishes() {
    let fakes = FakeServices::new().with_image_generator(FakeImageGenerator::responding(vec![
        ResponsePart::Text("I cannot draw that".to_string()),
    ]));
    let (engine, _) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_branch_output(outcome, Branch::Image, None);
    assert_failure_recorded(outcome, FailureKind::Generation);
    assert_eq!(fakes.log.count("artifacts.store"), 0);
    assert_eq!(fakes.projects.record(SAMPLE_PROJECT_ID).unwrap().image, None);
    assert_branch_output(outcome, Branch::Text, Some("Run further, pay less."));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_plan_short_circuits_every_branch() {
    let fakes = FakeServices::new().with_planner(FakePlanner::responding("Sure! Here are prompts."));
    let (engine, sink) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_failure_recorded(outcome, FailureKind::Planning);
    assert!(outcome.instructions.is_empty());
    assert_eq!(outcome.outputs.produced_count(), 0);
    for operation in ["text.generate", "image.generate", "video.create", "artifacts.fetch"] {
        assert_eq!(fakes.log.count(operation), 0, "{operation} was called");
    }
    assert!(sink.events_of_type(BRANCH_DISPATCHED).is_empty());
    assert_eq!(sink.events_of_type(JOIN_COMPLETED).len(), 1);
    // No branch wrote anything, so there is no record to link.
    assert_eq!(fakes.log.count("projects.get_generated_output"), 1);
    assert_eq!(fakes.log.count("projects.link_output"), 0);
    assert_eq!(outcome.generated_output_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_planning_timeout_still_reports_generated() {
    let fakes = FakeServices::new().with_planner(
        FakePlanner::responding(planner_json(Some("copy"), None, None))
            .with_delay(Duration::from_secs(120)),
    );
    let (engine, _) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_failure_recorded(outcome, FailureKind::Planning);
    assert_eq!(outcome.outputs.produced_count(), 0);
    assert_eq!(
        result.to_dict(),
        serde_json::json!({ "text": null, "image": null, "video": null, "status": "Generated" })
    );
}

#[tokio::test(start_paused = true)]
async fn test_poll_gives_up_after_fifteen_spaced_checks() {
    let fakes = FakeServices::new().with_video(FakeVideoProvider::never_completing("job-1"));
    let (engine, _) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_branch_output(outcome, Branch::Video, None);
    assert_failure_recorded(outcome, FailureKind::PollTimeout);
    let checks = fakes.log.calls_to("video.list_jobs");
    assert_eq!(checks.len(), 15);
    for pair in checks.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_secs(10));
    }
    assert_eq!(fakes.projects.record(SAMPLE_PROJECT_ID).unwrap().video, None);
}

#[tokio::test(start_paused = true)]
async fn test_missing_video_prompt_makes_no_video_calls() {
    let fakes = FakeServices::new().with_planner(text_and_image_only());
    let (engine, sink) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_branch_output(outcome, Branch::Video, None);
    assert_branch_output(outcome, Branch::Text, Some("Run further, pay less."));
    assert_branch_output(outcome, Branch::Image, Some("project-1/Trail Shoe.jpg"));
    assert_eq!(fakes.log.count("video.create"), 0);
    assert_eq!(fakes.log.count("video.list_jobs"), 0);
    assert_eq!(sink.events_of_type(BRANCH_DISPATCHED).len(), 2);
    assert_eq!(sink.events_of_type(JOIN_COMPLETED).len(), 1);
    assert!(!outcome.stages_executed.contains(&"video".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_video_without_job_id_skips_polling() {
    let fakes = FakeServices::new().with_video(FakeVideoProvider::without_job_id());
    let (engine, _) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_branch_output(outcome, Branch::Video, None);
    assert_failure_recorded(outcome, FailureKind::Generation);
    assert_eq!(fakes.log.count("video.create"), 1);
    assert_eq!(fakes.log.count("video.list_jobs"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_discount_controls_overlay_directive() {
    for (discount, expect_overlay) in [(20.0, true), (0.0, false)] {
        let fakes = FakeServices::new();
        let (engine, _) = engine(&fakes, WorkflowConfig::default());
        let mut trigger = sample_trigger();
        trigger.params.discount = discount;

        assert_generated(&engine.run(trigger).await);

        let request = &fakes.image_generator.requests()[0];
        assert_eq!(
            request.instruction.contains(DISCOUNT_OVERLAY_DIRECTIVE),
            expect_overlay,
            "discount {discount}"
        );
        assert_eq!(request.images.len(), 2);
        assert_eq!(request.images[1].mime_type, "image/jpeg");
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_reference_images_are_skipped() {
    let fakes = FakeServices::new();
    let (engine, _) = engine(&fakes, WorkflowConfig::default());
    let trigger = sample_trigger().with_image_ids(["img-1", "missing"]);

    let result = engine.run(trigger).await;

    let outcome = assert_generated(&result);
    assert_eq!(fakes.image_generator.requests()[0].images.len(), 1);
    assert!(outcome.outputs.image.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_terminal_statuses_skip_generation() {
    for (status, terminal) in [
        (RunStatus::Generated, Terminal::Display),
        (RunStatus::Edit, Terminal::Edit),
        (RunStatus::Automate, Terminal::Automate),
        (RunStatus::Finalized, Terminal::Done),
        (RunStatus::from("Archived"), Terminal::Done),
    ] {
        let fakes = FakeServices::new();
        let (engine, _) = engine(&fakes, WorkflowConfig::default());

        let result = engine
            .run(sample_trigger().with_status(Some(status.clone())))
            .await;

        let outcome = assert_completed(&result);
        assert_eq!(outcome.terminal, terminal);
        assert_eq!(outcome.status, Some(status));
        assert_eq!(outcome.stages_executed, vec!["manager"]);
        assert!(fakes.log.calls().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_link_failure_still_advances_status() {
    let fakes = FakeServices::new().with_projects(FakeProjectStore::new().failing_link());
    let (engine, _) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_failure_recorded(outcome, FailureKind::Link);
    assert_eq!(fakes.log.count("projects.link_output"), 1);
    assert_branch_output(outcome, Branch::Text, Some("Run further, pay less."));
}

#[tokio::test(start_paused = true)]
async fn test_record_write_failure_keeps_outputs() {
    let fakes = FakeServices::new().with_projects(FakeProjectStore::new().failing_upserts());
    let (engine, _) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_failure_recorded(outcome, FailureKind::Publish);
    assert_branch_output(outcome, Branch::Text, Some("Run further, pay less."));
    assert_branch_output(outcome, Branch::Video, Some(VIDEO_URL));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_polling_and_keeps_committed_writes() {
    let fakes = FakeServices::new().with_video(FakeVideoProvider::never_completing("job-1"));
    let (engine, sink) = engine(&fakes, WorkflowConfig::default().with_deadline_seconds(100.0));

    let result = engine.run(sample_trigger()).await;

    assert_eq!(
        result,
        RunResult::Timeout {
            run_id: result.run_id(),
            seconds: 100.0
        }
    );
    assert_eq!(
        result.to_dict(),
        serde_json::json!({ "error": "Workflow timed out after 100s" })
    );
    assert_eq!(sink.events_of_type(RUN_TIMEOUT).len(), 1);
    assert!(sink.events_of_type(JOIN_COMPLETED).is_empty());

    let checks_at_deadline = fakes.video.checks();
    assert!(checks_at_deadline < 15);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(fakes.video.checks(), checks_at_deadline);

    let record = fakes.projects.record(SAMPLE_PROJECT_ID).unwrap();
    assert_eq!(record.text.as_deref(), Some("Run further, pay less."));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_provider_becomes_error_result() {
    for mode in [ExecutionMode::Parallel, ExecutionMode::Sequential] {
        let fakes = FakeServices::new().with_text(FakeTextGenerator::panicking("copy model exploded"));
        let (engine, sink) = engine(&fakes, WorkflowConfig::default().with_execution_mode(mode));

        let result = engine.run(sample_trigger()).await;

        let message = result.error_message().unwrap();
        assert!(matches!(result, RunResult::Error { .. }), "{mode}: {result:?}");
        assert!(message.contains("copy model exploded"), "{mode}: {message}");
        assert_eq!(sink.events_of_type(RUN_FAILED).len(), 1);
        assert!(sink.events_of_type(JOIN_COMPLETED).is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_provider_errors_are_soft() {
    let fakes = FakeServices::new()
        .with_text(FakeTextGenerator::failing(ProviderError::status("text", 429, "rate limited")))
        .with_image_generator(FakeImageGenerator::failing(ProviderError::timeout("image", 30.0)))
        .with_video(FakeVideoProvider::failing(ProviderError::transport("video", "dns")));
    let (engine, _) = engine(&fakes, WorkflowConfig::default());

    let result = engine.run(sample_trigger()).await;

    let outcome = assert_generated(&result);
    assert_eq!(outcome.outputs.produced_count(), 0);
    assert_eq!(
        outcome
            .failures
            .iter()
            .filter(|f| f.kind == FailureKind::Generation)
            .count(),
        3
    );
}
