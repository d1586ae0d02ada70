//! Process-level entry point for submitting jobs

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::job::{Job, JobBuilder};
use super::registry::InMemoryJobRegistry;
use super::throttled_queue::{ThrottledQueue, ThrottledQueueStats};
use super::types::JobState;
use crate::config::SchedulerConfig;
use crate::errors::{JobError, JobResult};
use crate::observability::SchedulerMetrics;

/// One throttle domain plus the registry of every job submitted to it
///
/// Construct one per process (or per isolated scheduling domain) and pass
/// clones to submission sites.
#[derive(Debug, Clone)]
pub struct ThreadJobApi {
    queue: ThrottledQueue,
    registry: Arc<InMemoryJobRegistry>,
}

impl ThreadJobApi {
    pub fn new(throttle_limit: usize) -> JobResult<Self> {
        Self::with_metrics(throttle_limit, SchedulerMetrics::default())
    }

    pub fn with_metrics(throttle_limit: usize, metrics: SchedulerMetrics) -> JobResult<Self> {
        Ok(Self {
            queue: ThrottledQueue::with_metrics(throttle_limit, metrics)?,
            registry: Arc::new(InMemoryJobRegistry::new()),
        })
    }

    pub fn from_config(config: &SchedulerConfig, metrics: SchedulerMetrics) -> JobResult<Self> {
        Self::with_metrics(config.throttle_limit, metrics)
    }

    pub fn queue(&self) -> &ThrottledQueue {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<InMemoryJobRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> ThrottledQueueStats {
        self.queue.stats()
    }

    /// Build, register and enqueue a job
    ///
    /// `throttle_limit == 0` keeps the queue's current limit. A job that
    /// cannot be enqueued is stopped and dropped from the registry again.
    pub fn start_job(&self, builder: JobBuilder, throttle_limit: usize) -> JobResult<Arc<Job>> {
        let job = builder.registry(self.registry.clone()).build()?;

        if let Err(error) = self.queue.enqueue(Arc::clone(&job), throttle_limit) {
            warn!(job_id = %job.id(), job_name = %job.name(), "Could not enqueue job: {}", error);
            self.registry.remove(&job);
            return Err(error);
        }
        Ok(job)
    }

    /// Streaming submission: records arriving after the first become job input
    pub fn submission(&self, builder: JobBuilder, throttle_limit: usize) -> JobSubmission {
        JobSubmission {
            api: self.clone(),
            stage: Stage::Pending(builder),
            throttle_limit,
        }
    }

    pub fn stop_all(&self) {
        self.queue.stop_all();
    }

    pub async fn wait_for_idle(&self) {
        self.queue.wait_for_idle().await;
    }
}

/// A job fed from a stream of input records
///
/// The first `process` call creates and enqueues the job, with that record
/// as its initial input. Later records are injected into the running job.
/// `finish` closes the job's input.
pub struct JobSubmission {
    api: ThreadJobApi,
    stage: Stage,
    throttle_limit: usize,
}

enum Stage {
    Pending(JobBuilder),
    Submitted(Arc<Job>),
    Rejected,
}

impl JobSubmission {
    pub fn process(&mut self, record: Option<Value>) -> JobResult<Arc<Job>> {
        match std::mem::replace(&mut self.stage, Stage::Rejected) {
            Stage::Submitted(job) => {
                if let Some(record) = record {
                    job.inject_input(record);
                }
                self.stage = Stage::Submitted(Arc::clone(&job));
                Ok(job)
            }
            Stage::Pending(mut builder) => {
                if let Some(record) = record {
                    builder = builder.input(record);
                }
                let job = self.api.start_job(builder, self.throttle_limit)?;
                debug!(job_id = %job.id(), "Submission created job");
                self.stage = Stage::Submitted(Arc::clone(&job));
                Ok(job)
            }
            Stage::Rejected => Err(JobError::InvalidState {
                operation: "process",
                job: "<rejected submission>".to_string(),
                state: JobState::Failed,
            }),
        }
    }

    pub fn job(&self) -> Option<&Arc<Job>> {
        match &self.stage {
            Stage::Submitted(job) => Some(job),
            Stage::Pending(_) | Stage::Rejected => None,
        }
    }

    /// Close the job's input, creating the job first if no record arrived
    pub fn finish(mut self) -> JobResult<Arc<Job>> {
        let job = self.process(None)?;
        job.close_input();
        Ok(job)
    }
}
