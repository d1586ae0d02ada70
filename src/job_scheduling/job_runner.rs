//! Executes a started job's workloads on their own task

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::job::Job;
use super::types::{ErrorCategory, ErrorRecord, JobPhase, JobState};
use super::workload::{JobContext, Workload};
use crate::errors::JobError;

enum Outcome {
    Completed,
    Failed(anyhow::Error),
    Stopped,
}

/// Drives one job from `Running` to a terminal state
///
/// The optional initialization workload runs first; the main workload only
/// runs once it has completed. The runner reports every transition through
/// the job itself, so subscribers (the throttled queue among them) see the
/// terminal notification exactly once.
pub struct JobRunner {
    job: Arc<Job>,
}

impl JobRunner {
    pub(crate) fn new(job: Arc<Job>) -> Self {
        Self { job }
    }

    pub(crate) fn spawn(self, handle: &Handle) -> JoinHandle<()> {
        handle.spawn(self.run())
    }

    async fn run(self) {
        let job = self.job;
        let token = job.cancellation_token();
        let ctx = JobContext::new(Arc::clone(&job), token.clone());
        let started = Instant::now();

        if let Some(initialization) = job.initialization().cloned() {
            job.set_phase(JobPhase::Initializing);
            debug!(job_id = %job.id(), "Running initialization workload");

            match Self::execute(initialization.as_ref(), &ctx, &token).await {
                Outcome::Completed => {}
                Outcome::Failed(error) => {
                    Self::fail(
                        &job,
                        "InitializationFailed",
                        ErrorCategory::InitializationFailed,
                        format!("Initialization failed: {error:#}"),
                    );
                    return;
                }
                Outcome::Stopped => {
                    job.set_job_state(
                        JobState::Stopped,
                        Some("stopped during initialization".to_string()),
                    );
                    return;
                }
            }
        }

        job.set_phase(JobPhase::Executing);
        let workload = Arc::clone(job.workload());
        match Self::execute(workload.as_ref(), &ctx, &token).await {
            Outcome::Completed => {
                job.set_job_state(JobState::Completed, None);
            }
            Outcome::Failed(error) => {
                warn!(job_id = %job.id(), job_name = %job.name(), "Job failed: {:#}", error);
                job.report_error(JobError::Execution(error));
            }
            Outcome::Stopped => {
                job.set_job_state(JobState::Stopped, Some("stop requested".to_string()));
            }
        }

        debug!(
            job_id = %job.id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job runner finished"
        );
    }

    async fn execute(
        workload: &dyn Workload,
        ctx: &JobContext,
        token: &CancellationToken,
    ) -> Outcome {
        let guarded = AssertUnwindSafe(workload.run(ctx)).catch_unwind();

        tokio::select! {
            biased;
            _ = token.cancelled() => Outcome::Stopped,
            result = guarded => match result {
                Ok(Ok(())) => Outcome::Completed,
                Ok(Err(error)) => Outcome::Failed(error),
                Err(panic) => Outcome::Failed(anyhow::anyhow!(
                    "workload panicked: {}",
                    panic_message(panic.as_ref())
                )),
            },
        }
    }

    // The error record goes out before the transition closes the streams.
    fn fail(job: &Job, error_id: &str, category: ErrorCategory, message: String) {
        warn!(job_id = %job.id(), job_name = %job.name(), "{}", message);
        if let Err(e) = job
            .streams()
            .error
            .push(ErrorRecord::new(error_id, category, message.clone()))
        {
            debug!(job_id = %job.id(), "Could not record failure: {}", e);
        }
        job.set_job_state(JobState::Failed, Some(message));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
