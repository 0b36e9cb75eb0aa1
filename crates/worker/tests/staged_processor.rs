//! Staged processor and batch runner, driven end to end through a real
//! scheduler with in-process backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use atelier_core::job::{AssetRef, Job, JobOutput, JobSubmission};
use atelier_core::job_events::{EVENT_JOB_OUTPUT_CHANGED, EVENT_JOB_PROGRESS};
use atelier_core::mode::Mode;
use atelier_core::status::JobStatus;
use atelier_events::EventBus;
use atelier_scheduler::{
    ModeConfig, ModeDispatcher, Processor, ProcessorError, Scheduler, SchedulerConfig,
    SchedulerError,
};
use atelier_worker::backend::SIMULATE_FAILURE_PARAM;
use atelier_worker::runner::{parse_submissions, run_batch};
use atelier_worker::{DryRunBackend, StageBackend, StageCall, StagedProcessor};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scheduler_for(processor: Arc<dyn Processor>) -> Scheduler {
    let dispatcher = ModeDispatcher::builder(&SchedulerConfig::default())
        .register_all(processor)
        .build();
    Scheduler::new(dispatcher, Arc::new(EventBus::default()))
}

fn dry_run_scheduler() -> Scheduler {
    scheduler_for(Arc::new(StagedProcessor::new(DryRunBackend::new(
        Duration::ZERO,
    ))))
}

fn submission(mode: Mode) -> JobSubmission {
    let submission = JobSubmission::new(mode);
    if mode.requires_asset() {
        submission.with_asset(AssetRef::new("s3://bucket/product.png"))
    } else {
        submission.with_params(serde_json::json!({ "prompt": "spring launch" }))
    }
}

async fn run(scheduler: &Scheduler, submissions: Vec<JobSubmission>) {
    tokio::time::timeout(Duration::from_secs(5), run_batch(scheduler, submissions))
        .await
        .expect("batch finished in time")
        .expect("batch accepted");
}

/// Fails one named stage and counts how many stages it was asked to run.
struct FailingStageBackend {
    fail_at: JobStatus,
    calls: AtomicUsize,
}

#[async_trait]
impl StageBackend for FailingStageBackend {
    async fn run_stage(&self, call: StageCall<'_>) -> Result<serde_json::Value, ProcessorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if call.stage == self.fail_at {
            return Err(ProcessorError::Backend("GPU pool exhausted".into()));
        }
        Ok(serde_json::json!({ "script": "draft", "video": { "uri": "ad.mp4" } }))
    }

    async fn regenerate(
        &self,
        _job: &Job,
        _index: usize,
        _config: &ModeConfig,
    ) -> Result<AssetRef, ProcessorError> {
        Err(ProcessorError::Unsupported)
    }
}

// ---------------------------------------------------------------------------
// Test: every mode runs to completion against the dry-run backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dry_run_batch_completes_every_mode() {
    let scheduler = dry_run_scheduler();
    let submissions = Mode::ALL.into_iter().map(submission).collect();

    run(&scheduler, submissions).await;

    let counts = scheduler.counts();
    assert_eq!(counts.completed, Mode::ALL.len());
    assert_eq!(counts.failed, 0);
    assert!(!scheduler.is_processing());
    for job in scheduler.list() {
        assert_eq!(job.output.as_ref().map(JobOutput::mode), Some(job.mode));
        assert_eq!(job.progress, Some(100));
        assert_eq!(job.attempts, 1);
    }
}

#[tokio::test]
async fn run_batch_rejects_second_seed() {
    let scheduler = dry_run_scheduler();
    run(&scheduler, vec![submission(Mode::Upscale)]).await;

    let second = run_batch(&scheduler, vec![submission(Mode::Upscale)]).await;
    assert_matches!(second, Err(SchedulerError::Core(_)));
    assert_eq!(scheduler.list().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: stages are reported in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stages_are_reported_in_declared_order() {
    let scheduler = dry_run_scheduler();
    let mut events = scheduler.subscribe();

    run(&scheduler, vec![submission(Mode::VideoAd)]).await;

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.event_type == EVENT_JOB_PROGRESS {
            statuses.extend(event.status);
        }
    }
    assert_eq!(statuses, vec![JobStatus::Scripting, JobStatus::RenderingVideo]);
}

// ---------------------------------------------------------------------------
// Test: failures end in a terminal status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simulated_failure_fails_only_that_job() {
    let scheduler = dry_run_scheduler();
    let failing = submission(Mode::Localize)
        .with_params(serde_json::json!({ SIMULATE_FAILURE_PARAM: "locale pack missing" }));

    run(&scheduler, vec![submission(Mode::Localize), failing, submission(Mode::Localize)]).await;

    let jobs = scheduler.list();
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[2].status, JobStatus::Completed);
    assert_eq!(jobs[1].status, JobStatus::Failed);
    let error = jobs[1].error.as_deref().unwrap();
    assert!(error.contains("locale pack missing"), "{error}");
    assert!(jobs[1].output.is_none());
}

#[tokio::test]
async fn backend_error_stops_remaining_stages() {
    let backend = Arc::new(FailingStageBackend {
        fail_at: JobStatus::Scripting,
        calls: AtomicUsize::new(0),
    });
    let scheduler = scheduler_for(Arc::new(StagedProcessor::new(ArcBackend(Arc::clone(
        &backend,
    )))));

    run(&scheduler, vec![submission(Mode::VideoAd)]).await;

    let job = &scheduler.list()[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("GPU pool exhausted"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_final_response_fails_job() {
    let backend = FailingStageBackend {
        fail_at: JobStatus::Failed,
        calls: AtomicUsize::new(0),
    };
    let scheduler = scheduler_for(Arc::new(StagedProcessor::new(backend)));

    // The backend always answers with a video-ad shape, which is not a
    // valid upscale output.
    run(&scheduler, vec![submission(Mode::Upscale)]).await;

    let job = &scheduler.list()[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("invalid backend output"));
}

/// Lets a test keep a handle on a backend the processor owns.
struct ArcBackend<B>(Arc<B>);

#[async_trait]
impl<B: StageBackend> StageBackend for ArcBackend<B> {
    async fn run_stage(&self, call: StageCall<'_>) -> Result<serde_json::Value, ProcessorError> {
        self.0.run_stage(call).await
    }

    async fn regenerate(
        &self,
        job: &Job,
        index: usize,
        config: &ModeConfig,
    ) -> Result<AssetRef, ProcessorError> {
        self.0.regenerate(job, index, config).await
    }
}

// ---------------------------------------------------------------------------
// Test: regeneration goes through the backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dry_run_regeneration_replaces_layer() {
    let scheduler = dry_run_scheduler();
    run(&scheduler, vec![submission(Mode::LayerDecompose)]).await;
    let job = scheduler.list().remove(0);
    let before = job.output.clone().unwrap();

    let mut events = scheduler.subscribe();
    scheduler.regenerate_asset(job.id, 2).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(event) = events.recv().await {
                if event.event_type == EVENT_JOB_OUTPUT_CHANGED {
                    break;
                }
            }
        }
    })
    .await
    .expect("regeneration finished");

    let after = scheduler.get(job.id).unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    let output = after.output.unwrap();
    assert_eq!(output.asset(0), before.asset(0));
    assert_ne!(output.asset(2), before.asset(2));
    assert!(output.asset(2).unwrap().uri.ends_with("regenerated-2.png"));
}

// ---------------------------------------------------------------------------
// Test: jobs file parsing
// ---------------------------------------------------------------------------

#[test]
fn parse_submissions_reads_wire_format() {
    let raw = r#"[
        { "mode": "remove-bg", "asset": { "uri": "a.png" } },
        { "mode": "text-script", "params": { "prompt": "launch" } },
        { "mode": "refresh", "asset": { "uri": "b.png" }, "initial_status": "completed",
          "output": { "mode": "refresh", "variants": [{ "uri": "v0.png" }] } }
    ]"#;
    let submissions = parse_submissions(raw).unwrap();
    assert_eq!(submissions.len(), 3);
    assert_eq!(submissions[1].mode, Mode::TextScript);
    assert_eq!(submissions[2].initial_status, Some(JobStatus::Completed));
}

#[test]
fn parse_submissions_rejects_unknown_mode() {
    assert!(parse_submissions(r#"[{ "mode": "teleport" }]"#).is_err());
}
