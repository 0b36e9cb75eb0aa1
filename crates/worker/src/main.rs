use std::sync::Arc;

use anyhow::Context;
use atelier_core::status::JobStatus;
use atelier_events::EventBus;
use atelier_scheduler::{ModeDispatcher, Scheduler, SchedulerConfig};
use atelier_worker::runner;
use atelier_worker::WorkerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let scheduler_config = SchedulerConfig::from_env()?;
    let worker_config = WorkerConfig::from_env()?;
    tracing::info!(
        default_concurrency = scheduler_config.default_concurrency,
        high_throughput_concurrency = scheduler_config.high_throughput_concurrency,
        jobs_file = %worker_config.jobs_file.display(),
        dry_run = worker_config.is_dry_run(),
        "Worker starting",
    );

    let raw = tokio::fs::read_to_string(&worker_config.jobs_file)
        .await
        .with_context(|| format!("reading {}", worker_config.jobs_file.display()))?;
    let submissions = runner::parse_submissions(&raw)
        .with_context(|| format!("parsing {}", worker_config.jobs_file.display()))?;

    let dispatcher = ModeDispatcher::builder(&scheduler_config)
        .register_all(runner::build_processor(&worker_config))
        .build();
    let events = Arc::new(EventBus::new(scheduler_config.event_capacity));
    let scheduler = Scheduler::new(dispatcher, events);

    let counts = tokio::select! {
        counts = runner::run_batch(&scheduler, submissions) => counts?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; no further jobs will be dispatched");
            scheduler.stop_processing();
            scheduler.counts()
        }
    };

    for job in scheduler.query(|job| job.status == JobStatus::Failed) {
        tracing::error!(
            job_id = %job.id,
            mode = %job.mode,
            error = job.error.as_deref().unwrap_or("unknown error"),
            "Job failed",
        );
    }
    tracing::info!(
        completed = counts.completed,
        failed = counts.failed,
        queued = counts.queued,
        active = counts.active,
        "Worker finished",
    );
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atelier_worker=debug,atelier_scheduler=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
