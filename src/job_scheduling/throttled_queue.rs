//! FIFO job queue that keeps at most `throttle_limit` jobs running
//!
//! Submitted jobs wait in a pending queue. A single dispatcher task per
//! active period pops them in order and starts them while the running set
//! is below the limit, parking on a [`Gate`] once the limit is reached.
//! Each job's terminal notification removes it from the running set and
//! reopens the gate. Limit changes, dispatch and terminal bookkeeping all
//! happen under one mutex, so the running count can never drift from the
//! jobs actually running.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::gate::Gate;
use super::job::Job;
use super::types::{JobId, JobState, JobStateEvent, SubscriptionId};
use crate::errors::{JobError, JobResult};
use crate::observability::SchedulerMetrics;

/// Largest accepted throttle limit
pub const MAX_THROTTLE_LIMIT: usize = 1_000_000;

/// Point-in-time view of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThrottledQueueStats {
    pub pending: usize,
    pub running: usize,
    pub throttle_limit: usize,
    pub dispatcher_active: bool,
}

struct QueueState {
    pending: VecDeque<Arc<Job>>,
    running: HashMap<JobId, Arc<Job>>,
    subscriptions: HashMap<JobId, SubscriptionId>,
    throttle_limit: usize,
    dispatcher_active: bool,
}

impl QueueState {
    fn outstanding(&self) -> usize {
        self.pending.len() + self.running.len()
    }
}

struct QueueShared {
    state: Mutex<QueueState>,
    gate: Gate,
    outstanding: watch::Sender<usize>,
    metrics: SchedulerMetrics,
}

impl QueueShared {
    // Poisoning means the bookkeeping can no longer be trusted.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .expect("throttled queue state lock poisoned")
    }

    fn publish_outstanding(&self, state: &QueueState) {
        self.outstanding.send_replace(state.outstanding());
    }

    async fn dispatch(self: Arc<Self>) {
        debug!("Dispatcher started");
        loop {
            {
                let mut state = self.lock();
                if state.pending.is_empty() {
                    state.dispatcher_active = false;
                    debug!("Dispatcher idle, exiting");
                    return;
                }
            }
            self.gate.wait().await;

            let job = {
                let mut state = self.lock();
                if state.running.len() >= state.throttle_limit {
                    // Limit reached (or lowered) since the gate opened.
                    self.gate.close();
                    continue;
                }
                let Some(job) = state.pending.pop_front() else {
                    state.dispatcher_active = false;
                    debug!("Dispatcher idle, exiting");
                    return;
                };
                state.running.insert(job.id(), Arc::clone(&job));
                if state.running.len() >= state.throttle_limit {
                    self.gate.close();
                }
                job
            };
            self.metrics.record_dispatched();

            debug!(job_id = %job.id(), job_name = %job.name(), "Dispatching job");
            match job.start() {
                Ok(()) => self.metrics.record_started(),
                Err(error) => self.roll_back_start(&job, error),
            }
        }
    }

    fn roll_back_start(&self, job: &Job, error: JobError) {
        self.metrics.record_start_failure();
        {
            let mut state = self.lock();
            if state.running.remove(&job.id()).is_some() {
                self.metrics.record_released();
            }
            if state.running.len() < state.throttle_limit {
                self.gate.open();
            }
            self.publish_outstanding(&state);
        }

        match error {
            // Someone else moved the job on; its own notification settles the rest.
            JobError::InvalidState { .. } => {
                debug!(job_id = %job.id(), "Skipping job that is no longer startable: {}", error);
            }
            error => {
                warn!(job_id = %job.id(), job_name = %job.name(), "Failed to start job: {}", error);
                job.report_error(error);
            }
        }
    }

    fn on_job_terminal(&self, job: &Job, event: &JobStateEvent) {
        let (subscription, was_running) = {
            let mut state = self.lock();
            // No subscription entry: enqueue rejected the job after subscribing.
            let Some(subscription) = state.subscriptions.remove(&job.id()) else {
                return;
            };
            let was_running = state.running.remove(&job.id()).is_some();
            if !was_running {
                // Stopped while still pending
                state.pending.retain(|pending| pending.id() != job.id());
            }
            // An emptied queue also wakes a parked dispatcher so it can exit.
            if state.running.len() < state.throttle_limit || state.pending.is_empty() {
                self.gate.open();
            }
            self.publish_outstanding(&state);
            (subscription, was_running)
        };

        job.unsubscribe(subscription);

        if was_running {
            self.metrics.record_released();
        }
        let duration = job
            .started_at()
            .zip(job.finished_at())
            .and_then(|(started, finished)| (finished - started).to_std().ok());
        self.metrics.record_finished(event.state, duration);

        debug!(
            job_id = %job.id(),
            job_name = %job.name(),
            state = %event.state,
            "Released job from throttled queue"
        );
    }
}

/// Bounded-concurrency scheduler for jobs
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct ThrottledQueue {
    shared: Arc<QueueShared>,
}

impl std::fmt::Debug for ThrottledQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

fn validate_limit(limit: usize) -> JobResult<()> {
    if limit == 0 || limit > MAX_THROTTLE_LIMIT {
        return Err(JobError::InvalidArgument {
            argument: "throttle_limit",
            reason: format!("must be between 1 and {MAX_THROTTLE_LIMIT}, got {limit}"),
        });
    }
    Ok(())
}

impl ThrottledQueue {
    pub fn new(throttle_limit: usize) -> JobResult<Self> {
        Self::with_metrics(throttle_limit, SchedulerMetrics::default())
    }

    pub fn with_metrics(throttle_limit: usize, metrics: SchedulerMetrics) -> JobResult<Self> {
        validate_limit(throttle_limit)?;
        let (outstanding, _) = watch::channel(0);

        Ok(Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: HashMap::new(),
                    subscriptions: HashMap::new(),
                    throttle_limit,
                    dispatcher_active: false,
                }),
                gate: Gate::new(),
                outstanding,
                metrics,
            }),
        })
    }

    /// Submit a job
    ///
    /// `throttle_limit == 0` keeps the current limit; any other value
    /// replaces it before the job is queued. The job must be `NotStarted`
    /// and must not have been submitted to any queue before.
    pub fn enqueue(&self, job: Arc<Job>, throttle_limit: usize) -> JobResult<()> {
        if throttle_limit > MAX_THROTTLE_LIMIT {
            return Err(JobError::InvalidArgument {
                argument: "throttle_limit",
                reason: format!("must not exceed {MAX_THROTTLE_LIMIT}, got {throttle_limit}"),
            });
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| JobError::NoRuntime { operation: "enqueue" })?;

        let state = job.state();
        if state != JobState::NotStarted {
            return Err(JobError::InvalidState {
                operation: "enqueue",
                job: job.name(),
                state,
            });
        }
        if !job.mark_submitted() {
            return Err(JobError::InvalidState {
                operation: "enqueue (already submitted to a queue)",
                job: job.name(),
                state,
            });
        }

        if throttle_limit > 0 {
            self.set_throttle_limit(throttle_limit)?;
        }

        let spawn_dispatcher = {
            let mut queue = self.shared.lock();

            let weak: Weak<QueueShared> = Arc::downgrade(&self.shared);
            let subscription = job.subscribe(move |job, event| {
                if event.is_terminal() {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_job_terminal(job, event);
                    }
                }
            });

            // A stop that landed before the subscription would go unnoticed.
            let state = job.state();
            if state != JobState::NotStarted {
                job.unsubscribe(subscription);
                return Err(JobError::InvalidState {
                    operation: "enqueue",
                    job: job.name(),
                    state,
                });
            }

            queue.subscriptions.insert(job.id(), subscription);
            queue.pending.push_back(Arc::clone(&job));
            self.shared.publish_outstanding(&queue);
            !std::mem::replace(&mut queue.dispatcher_active, true)
        };

        self.shared.metrics.record_enqueued();
        info!(job_id = %job.id(), job_name = %job.name(), command = %job.command(), "Enqueued job");

        if spawn_dispatcher {
            runtime.spawn(Arc::clone(&self.shared).dispatch());
        }
        Ok(())
    }

    /// Change the limit; takes effect immediately
    ///
    /// Lowering it below the running count never stops running jobs, it only
    /// holds back further dispatch until enough of them finish.
    pub fn set_throttle_limit(&self, limit: usize) -> JobResult<()> {
        validate_limit(limit)?;
        let mut state = self.shared.lock();
        if state.throttle_limit != limit {
            info!("Throttle limit changed from {} to {}", state.throttle_limit, limit);
        }
        state.throttle_limit = limit;
        if state.running.len() < limit {
            self.shared.gate.open();
        } else {
            self.shared.gate.close();
        }
        Ok(())
    }

    pub fn throttle_limit(&self) -> usize {
        self.shared.lock().throttle_limit
    }

    pub fn running_count(&self) -> usize {
        self.shared.lock().running.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn stats(&self) -> ThrottledQueueStats {
        let state = self.shared.lock();
        ThrottledQueueStats {
            pending: state.pending.len(),
            running: state.running.len(),
            throttle_limit: state.throttle_limit,
            dispatcher_active: state.dispatcher_active,
        }
    }

    /// Stop every pending and running job
    pub fn stop_all(&self) {
        let jobs: Vec<Arc<Job>> = {
            let state = self.shared.lock();
            state
                .pending
                .iter()
                .chain(state.running.values())
                .cloned()
                .collect()
        };

        info!("Stopping {} queued jobs", jobs.len());
        for job in jobs {
            job.stop();
        }
    }

    /// Wait until no job is pending or running
    pub async fn wait_for_idle(&self) {
        let mut outstanding = self.shared.outstanding.subscribe();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = outstanding.wait_for(|count| *count == 0).await;
    }
}
