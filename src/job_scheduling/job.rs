//! The job: an executable payload with an observable lifecycle
//!
//! A job moves through `NotStarted -> Running -> {Completed, Failed, Stopped}`
//! and never leaves a terminal state. Every transition is delivered
//! synchronously, in order, to the subscribed handlers and published on a
//! `watch` channel for async observers. Reaching a terminal state disposes
//! the execution context: the cancellation token fires and all streams are
//! closed.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::debugger::{Debugger, JobDebugger};
use super::job_runner::JobRunner;
use super::registry::JobRegistry;
use super::stream::{DataStream, JobStreams};
use super::types::{
    ErrorCategory, ErrorRecord, JobId, JobPhase, JobState, JobStateEvent, JobStateInfo,
    SubscriptionId,
};
use super::workload::{SharedWorkload, Workload};
use crate::errors::{JobError, JobResult};

/// Synchronous state-change handler
///
/// Handlers run on the thread performing the transition while the job's
/// transition lock is held. They must be quick and must not call back into
/// state-changing methods of the same job.
pub type StateChangeHandler = Arc<dyn Fn(&Job, &JobStateEvent) + Send + Sync>;

#[derive(Debug, Default, Clone, Copy)]
struct JobTimes {
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// A unit of work with its own execution context
pub struct Job {
    id: JobId,
    instance_id: Uuid,
    name: RwLock<String>,
    command: String,
    workload: SharedWorkload,
    initialization: Option<SharedWorkload>,
    arguments: Vec<Value>,
    working_directory: Option<PathBuf>,
    streams: JobStreams,
    input: DataStream<Value>,
    state: watch::Sender<JobStateInfo>,
    transition_lock: Mutex<()>,
    phase: AtomicU8,
    subscribers: Mutex<Vec<(SubscriptionId, StateChangeHandler)>>,
    next_subscription: AtomicU64,
    cancellation: CancellationToken,
    submitted: AtomicBool,
    disposed: AtomicBool,
    debugger: Mutex<Option<Arc<dyn Debugger>>>,
    job_debugger: Mutex<Option<JobDebugger>>,
    created_at: DateTime<Utc>,
    times: Mutex<JobTimes>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("instance_id", &self.instance_id)
            .field("name", &self.name())
            .field("command", &self.command)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Job {
    /// Start building a job around `workload`
    pub fn builder(workload: impl Workload + 'static) -> JobBuilder {
        JobBuilder::new(workload)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn name(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rename the job; only allowed before it starts
    pub fn set_name(&self, name: impl Into<String>) -> JobResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(JobError::InvalidArgument {
                argument: "name",
                reason: "job name must not be empty".to_string(),
            });
        }

        let _transition = lock(&self.transition_lock);
        let state = self.state();
        if state != JobState::NotStarted {
            return Err(JobError::InvalidState {
                operation: "rename",
                job: self.name(),
                state,
            });
        }
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = name;
        Ok(())
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Where the job executes
    pub fn location(&self) -> &'static str {
        "local"
    }

    pub fn status_message(&self) -> &'static str {
        ""
    }

    pub fn state(&self) -> JobState {
        self.state.borrow().state
    }

    pub fn state_info(&self) -> JobStateInfo {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> JobPhase {
        JobPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn streams(&self) -> &JobStreams {
        &self.streams
    }

    pub fn input(&self) -> &DataStream<Value> {
        &self.input
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn has_more_data(&self) -> bool {
        self.streams.has_more_data()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.times).started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.times).finished_at
    }

    /// Start the job's execution context
    ///
    /// Fails with `InvalidState` unless the job is `NotStarted`. On success
    /// the job is `Running` when this returns and its workload executes on
    /// its own task.
    pub fn start(self: &Arc<Self>) -> JobResult<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| JobError::NoRuntime { operation: "start" })?;

        {
            let _transition = lock(&self.transition_lock);
            let state = self.state();
            if state != JobState::NotStarted {
                return Err(JobError::InvalidState {
                    operation: "start",
                    job: self.name(),
                    state,
                });
            }
            lock(&self.times).started_at = Some(Utc::now());
            self.apply_transition(JobState::Running, None);
        }

        // Spawned after the Running notification so observers always see
        // Running before the terminal transition.
        JobRunner::new(Arc::clone(self)).spawn(&handle);
        Ok(())
    }

    /// Request cooperative cancellation
    ///
    /// A job that never started goes straight to `Stopped`; a running job
    /// reaches `Stopped` once its runner observes the request. Terminal jobs
    /// are left untouched.
    pub fn stop(&self) {
        let _transition = lock(&self.transition_lock);
        match self.state() {
            JobState::NotStarted => {
                self.apply_transition(JobState::Stopped, Some("stopped before start".to_string()));
            }
            JobState::Running => {
                debug!(job_id = %self.id, "Stop requested");
                self.cancellation.cancel();
            }
            JobState::Completed | JobState::Failed | JobState::Stopped => {}
        }
    }

    /// Request cancellation and wait until the job is terminal
    pub async fn stop_async(&self) -> JobStateInfo {
        self.stop();
        self.wait_for_terminal().await
    }

    pub fn suspend(&self) -> JobResult<()> {
        Err(JobError::NotSupported { operation: "suspend" })
    }

    pub fn resume(&self) -> JobResult<()> {
        Err(JobError::NotSupported { operation: "resume" })
    }

    pub fn unblock(&self) -> JobResult<()> {
        Err(JobError::NotSupported { operation: "unblock" })
    }

    /// Feed a value to the job's input; ignored once input is closed
    pub fn inject_input(&self, value: impl Into<Value>) {
        if let Err(e) = self.input.push(value.into()) {
            trace!(job_id = %self.id, "Ignoring injected input: {}", e);
        }
    }

    /// Signal end of input to the execution context
    pub fn close_input(&self) {
        self.input.close();
    }

    /// Subscribe to state changes
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Job, &JobStateEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Async view of the job's state
    pub fn state_changes(&self) -> watch::Receiver<JobStateInfo> {
        self.state.subscribe()
    }

    /// Wait until the job reaches a terminal state
    pub async fn wait_for_terminal(&self) -> JobStateInfo {
        let mut receiver = self.state.subscribe();
        match receiver.wait_for(|info| info.state.is_terminal()).await {
            Ok(info) => info.clone(),
            Err(_) => self.state_info(),
        }
    }

    /// Record `error` on the error stream and fail the job
    ///
    /// Safe to call on a disposed or terminal job: the error is dropped
    /// silently in that case.
    pub fn report_error(&self, error: JobError) {
        let category = match &error {
            JobError::Execution(_) => ErrorCategory::ExecutionFailed,
            _ => ErrorCategory::InvalidOperation,
        };
        let message = error.to_string();

        if let Err(e) = self
            .streams
            .error
            .push(ErrorRecord::new(error.error_id(), category, message.clone()))
        {
            debug!(job_id = %self.id, "Dropping error report: {}", e);
        }
        self.set_job_state(JobState::Failed, Some(message));
    }

    /// Tear down the execution context; idempotent
    pub fn dispose(&self) {
        self.stop();
        self.dispose_context();
    }

    /// Make the execution context's debugger available to `debugger()`
    pub fn attach_debugger(&self, debugger: Arc<dyn Debugger>) {
        *lock(&self.debugger) = Some(debugger);
        *lock(&self.job_debugger) = None;
    }

    /// Job-scoped debugger, if the execution context exposed one
    pub fn debugger(&self) -> Option<JobDebugger> {
        let mut cached = lock(&self.job_debugger);
        if cached.is_none() {
            let raw = lock(&self.debugger).clone();
            *cached = raw.map(|raw| JobDebugger::new(raw, self.name()));
        }
        cached.clone()
    }

    /// Claim the job for a queue; false if some queue already owns it
    pub(crate) fn mark_submitted(&self) -> bool {
        !self.submitted.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn workload(&self) -> &SharedWorkload {
        &self.workload
    }

    pub(crate) fn initialization(&self) -> Option<&SharedWorkload> {
        self.initialization.as_ref()
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub(crate) fn set_phase(&self, phase: JobPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    /// Move to `state` if the state machine allows it
    pub(crate) fn set_job_state(&self, state: JobState, reason: Option<String>) -> bool {
        let _transition = lock(&self.transition_lock);
        self.apply_transition(state, reason)
    }

    // Caller holds the transition lock.
    fn apply_transition(&self, state: JobState, reason: Option<String>) -> bool {
        let previous = self.state();
        if !previous.can_transition_to(state) {
            debug!(
                job_id = %self.id,
                "Ignoring transition {} -> {}",
                previous, state
            );
            return false;
        }

        if state.is_terminal() {
            self.set_phase(JobPhase::Finished);
            lock(&self.times).finished_at = Some(Utc::now());
            self.dispose_context();
        }

        self.state
            .send_replace(JobStateInfo::new(state, reason.clone()));
        info!(
            job_id = %self.id,
            job_name = %self.name(),
            "Job state {} -> {}{}",
            previous,
            state,
            reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
        );

        let event = JobStateEvent {
            previous,
            state,
            reason,
        };
        let handlers: Vec<StateChangeHandler> = lock(&self.subscribers)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(self, &event);
        }
        true
    }

    fn dispose_context(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!(job_id = %self.id, "Disposing execution context");
        self.cancellation.cancel();
        self.input.close();
        self.streams.close_all();
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        self.dispose_context();
    }
}

/// Builder for `Job`
pub struct JobBuilder {
    workload: SharedWorkload,
    name: Option<String>,
    command: Option<String>,
    initialization: Option<SharedWorkload>,
    arguments: Vec<Value>,
    input: Vec<Value>,
    working_directory: Option<PathBuf>,
    registry: Option<Arc<dyn JobRegistry>>,
}

impl JobBuilder {
    pub fn new(workload: impl Workload + 'static) -> Self {
        Self::from_shared(Arc::new(workload))
    }

    pub fn from_shared(workload: SharedWorkload) -> Self {
        Self {
            workload,
            name: None,
            command: None,
            initialization: None,
            arguments: Vec::new(),
            input: Vec::new(),
            working_directory: None,
            registry: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the command text; defaults to the workload's description
    #[must_use]
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Workload that must complete before the main workload runs
    #[must_use]
    pub fn initialization(mut self, workload: impl Workload + 'static) -> Self {
        self.initialization = Some(Arc::new(workload));
        self
    }

    #[must_use]
    pub fn argument(mut self, argument: impl Into<Value>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    #[must_use]
    pub fn arguments<I, V>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Value placed on the input channel before the job starts
    #[must_use]
    pub fn input(mut self, value: impl Into<Value>) -> Self {
        self.input.push(value.into());
        self
    }

    #[must_use]
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Registry the job is registered with once built
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn JobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> JobResult<Arc<Job>> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(JobError::InvalidArgument {
                    argument: "name",
                    reason: "job name must not be empty".to_string(),
                });
            }
        }

        let id = JobId::next();
        let name = self.name.unwrap_or_else(|| format!("Job{id}"));
        let command = self
            .command
            .unwrap_or_else(|| self.workload.describe());

        let input = DataStream::new("input");
        for value in self.input {
            // A fresh stream is open, so this cannot fail.
            let _ = input.push(value);
        }

        let (state, _) = watch::channel(JobStateInfo::default());
        let job = Arc::new(Job {
            id,
            instance_id: Uuid::new_v4(),
            name: RwLock::new(name),
            command,
            workload: self.workload,
            initialization: self.initialization,
            arguments: self.arguments,
            working_directory: self.working_directory,
            streams: JobStreams::new(),
            input,
            state,
            transition_lock: Mutex::new(()),
            phase: AtomicU8::new(JobPhase::Idle.as_u8()),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            cancellation: CancellationToken::new(),
            submitted: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            debugger: Mutex::new(None),
            job_debugger: Mutex::new(None),
            created_at: Utc::now(),
            times: Mutex::new(JobTimes::default()),
        });

        debug!(job_id = %job.id, job_name = %job.name(), command = %job.command, "Created job");
        if let Some(registry) = self.registry {
            registry.register(Arc::clone(&job));
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::debugger::tests::RecordingDebugger;
    use crate::job_scheduling::debugger::{DebugEvent, ExecutionStop};
    use crate::job_scheduling::workload::FnWorkload;
    use std::time::Duration;
    use tokio::time::timeout;

    fn instant_job() -> Arc<Job> {
        Job::builder(FnWorkload::new("instant", |ctx| async move {
            ctx.write_output("done")?;
            Ok(())
        }))
        .build()
        .unwrap()
    }

    fn blocking_job() -> Arc<Job> {
        Job::builder(FnWorkload::new("forever", |_ctx| async move {
            std::future::pending::<()>().await;
            Ok(())
        }))
        .build()
        .unwrap()
    }

    fn record_states(job: &Job) -> Arc<Mutex<Vec<JobStateEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        job.subscribe(move |_job, event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn test_new_job_defaults() {
        let job = instant_job();
        assert_eq!(job.state(), JobState::NotStarted);
        assert_eq!(job.phase(), JobPhase::Idle);
        assert_eq!(job.name(), format!("Job{}", job.id()));
        assert_eq!(job.command(), "instant");
        assert_eq!(job.location(), "local");
        assert!(job.started_at().is_none());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let result = Job::builder(FnWorkload::new("x", |_ctx| async { Ok(()) }))
            .name("  ")
            .build();
        assert!(matches!(result, Err(JobError::InvalidArgument { argument: "name", .. })));
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let job = instant_job();
        assert!(matches!(job.start(), Err(JobError::NoRuntime { .. })));
        assert_eq!(job.state(), JobState::NotStarted);
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let job = instant_job();
        let events = record_states(&job);

        job.start().unwrap();
        let info = timeout(Duration::from_secs(1), job.wait_for_terminal())
            .await
            .unwrap();

        assert_eq!(info.state, JobState::Completed);
        assert_eq!(job.streams().output.drain(), vec![Value::from("done")]);
        assert!(job.streams().output.is_closed());
        assert!(job.finished_at().is_some());

        let states: Vec<_> = events.lock().unwrap().iter().map(|e| e.state).collect();
        assert_eq!(states, vec![JobState::Running, JobState::Completed]);
    }

    #[tokio::test]
    async fn test_start_twice_fails_with_invalid_state() {
        let job = blocking_job();
        job.start().unwrap();

        let second = job.start();
        assert!(matches!(
            second,
            Err(JobError::InvalidState { operation: "start", state: JobState::Running, .. })
        ));
        job.stop_async().await;
    }

    #[tokio::test]
    async fn test_rename_only_before_start() {
        let job = blocking_job();
        job.set_name("renamed").unwrap();
        assert_eq!(job.name(), "renamed");

        job.start().unwrap();
        assert!(matches!(job.set_name("late"), Err(JobError::InvalidState { .. })));
        job.stop_async().await;
    }

    #[tokio::test]
    async fn test_stop_twice_produces_one_terminal_transition() {
        let job = blocking_job();
        let events = record_states(&job);
        job.start().unwrap();

        job.stop();
        job.stop();
        let info = timeout(Duration::from_secs(1), job.wait_for_terminal())
            .await
            .unwrap();
        job.stop();

        assert_eq!(info.state, JobState::Stopped);
        let terminal = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.state.is_terminal())
            .count();
        assert_eq!(terminal, 1);
    }

    #[test]
    fn test_stop_before_start_moves_to_stopped() {
        let job = instant_job();
        job.stop();
        assert_eq!(job.state(), JobState::Stopped);
        assert!(job.input().is_closed());
    }

    #[test]
    fn test_suspend_and_resume_are_not_supported() {
        let job = instant_job();
        assert!(matches!(job.suspend(), Err(JobError::NotSupported { operation: "suspend" })));
        assert!(matches!(job.resume(), Err(JobError::NotSupported { operation: "resume" })));
        assert!(matches!(job.unblock(), Err(JobError::NotSupported { .. })));
        assert_eq!(job.state(), JobState::NotStarted);
    }

    #[test]
    fn test_inject_after_close_is_ignored() {
        let job = Job::builder(FnWorkload::new("x", |_ctx| async { Ok(()) }))
            .input(1)
            .build()
            .unwrap();
        job.inject_input(2);
        job.close_input();
        job.inject_input(3);

        assert_eq!(job.input().drain(), vec![Value::from(1), Value::from(2)]);
        assert_eq!(job.state(), JobState::NotStarted);
    }

    #[test]
    fn test_report_error_fails_job_and_records_error() {
        let job = instant_job();
        job.report_error(JobError::Execution(anyhow::anyhow!("boom")));

        assert_eq!(job.state(), JobState::Failed);
        let errors = job.streams().error.drain();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_id, "ExecutionFailure");
        assert_eq!(errors[0].category, ErrorCategory::ExecutionFailed);
    }

    #[test]
    fn test_report_error_on_terminal_job_is_silent() {
        let job = instant_job();
        job.stop();
        job.report_error(JobError::Execution(anyhow::anyhow!("late")));

        assert_eq!(job.state(), JobState::Stopped);
        assert!(job.streams().error.is_empty());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let job = instant_job();
        job.dispose();
        job.dispose();
        assert_eq!(job.state(), JobState::Stopped);
        assert!(job.streams().error.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispose_and_stop_finish_once() {
        use std::sync::atomic::AtomicUsize;

        for started in [false, true] {
            let job = blocking_job();
            if started {
                job.start().unwrap();
            }
            let terminal = Arc::new(AtomicUsize::new(0));
            let sink = terminal.clone();
            job.subscribe(move |_, event| {
                if event.is_terminal() {
                    sink.fetch_add(1, Ordering::SeqCst);
                }
            });

            let barrier = Arc::new(tokio::sync::Barrier::new(8));
            let tasks: Vec<_> = (0..8)
                .map(|i| {
                    let job = job.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        if i % 2 == 0 {
                            job.dispose();
                        } else {
                            job.stop();
                        }
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            let info = timeout(Duration::from_secs(1), job.wait_for_terminal())
                .await
                .unwrap();
            assert_eq!(info.state, JobState::Stopped);
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(terminal.load(Ordering::SeqCst), 1, "started: {started}");
            assert!(job.streams().output.is_closed());
            assert!(job.input().is_closed());
        }
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let job = instant_job();
        let events = Arc::new(Mutex::new(0));
        let sink = events.clone();
        let id = job.subscribe(move |_, _| *sink.lock().unwrap() += 1);

        assert!(job.unsubscribe(id));
        assert!(!job.unsubscribe(id));
        job.stop();
        assert_eq!(*events.lock().unwrap(), 0);
    }

    #[test]
    fn test_debugger_is_wrapped_with_job_name() {
        let job = Job::builder(FnWorkload::new("x", |_ctx| async { Ok(()) }))
            .name("inspect-me")
            .build()
            .unwrap();
        assert!(job.debugger().is_none());

        let raw = Arc::new(RecordingDebugger::default());
        job.attach_debugger(raw.clone());
        let debugger = job.debugger().unwrap();
        assert_eq!(debugger.job_name(), "inspect-me");

        let stops = Arc::new(Mutex::new(0));
        let sink = stops.clone();
        debugger.add_listener(Arc::new(move |event: &DebugEvent| {
            if matches!(event, DebugEvent::ExecutionStopped(_)) {
                *sink.lock().unwrap() += 1;
            }
        }));
        raw.raise(DebugEvent::ExecutionStopped(ExecutionStop {
            location: "line 1".into(),
            breakpoints: vec![],
        }));
        assert_eq!(*stops.lock().unwrap(), 1);
    }
}
