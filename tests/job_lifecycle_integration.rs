use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threadjob::errors::JobError;
use threadjob::job_scheduling::{
    CommandWorkload, ErrorCategory, FnWorkload, Job, JobState, ThreadJobApi,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn state_log(job: &Job) -> Arc<Mutex<Vec<JobState>>> {
    let log = Arc::new(Mutex::new(vec![job.state()]));
    let sink = log.clone();
    job.subscribe(move |_job, event| sink.lock().unwrap().push(event.state));
    log
}

/// Failing initialization fails the job and the main workload never runs
#[tokio::test]
async fn test_failing_initialization_fails_job() {
    let api = ThreadJobApi::new(2).unwrap();
    let main_started = Arc::new(AtomicBool::new(false));
    let flag = main_started.clone();

    let job = api
        .start_job(
            Job::builder(FnWorkload::new("main", move |_ctx| {
                let flag = flag.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .initialization(CommandWorkload::shell("sh", "-c", "exit 3")),
            0,
        )
        .unwrap();

    let info = timeout(WAIT, job.wait_for_terminal()).await.unwrap();
    assert_eq!(info.state, JobState::Failed);
    assert!(!main_started.load(Ordering::SeqCst));

    let errors = job.streams().error.drain();
    assert!(
        errors
            .iter()
            .any(|record| record.category == ErrorCategory::InitializationFailed),
        "error stream: {errors:?}"
    );
}

/// Stop issued twice yields one terminal transition, and the observed
/// sequence is NotStarted, Running, Stopped
#[tokio::test]
async fn test_stop_twice_is_one_transition() {
    let api = ThreadJobApi::new(1).unwrap();
    let job = Job::builder(FnWorkload::new("forever", |ctx| async move {
        ctx.cancellation_token().cancelled().await;
        Ok(())
    }))
    .build()
    .unwrap();
    let log = state_log(&job);

    api.queue().enqueue(job.clone(), 0).unwrap();
    timeout(WAIT, async {
        let mut states = job.state_changes();
        states
            .wait_for(|info| info.state == JobState::Running)
            .await
            .unwrap();
    })
    .await
    .unwrap();

    job.stop();
    job.stop();
    let info = timeout(WAIT, job.stop_async()).await.unwrap();

    assert_eq!(info.state, JobState::Stopped);
    assert_eq!(
        *log.lock().unwrap(),
        vec![JobState::NotStarted, JobState::Running, JobState::Stopped]
    );
}

/// Input injected after the channel is closed is silently dropped
#[tokio::test]
async fn test_inject_after_close_is_noop() {
    let job = Job::builder(FnWorkload::new("collect", |ctx| async move {
        let values = ctx.input().collect().await;
        ctx.write_output(Value::Array(values))?;
        Ok(())
    }))
    .input(json!({"seed": true}))
    .build()
    .unwrap();

    job.start().unwrap();
    job.inject_input(1);
    job.close_input();
    job.inject_input(2);

    let info = timeout(WAIT, job.wait_for_terminal()).await.unwrap();
    assert_eq!(info.state, JobState::Completed);
    assert_eq!(
        job.streams().output.drain(),
        vec![json!([{"seed": true}, 1])]
    );
}

#[tokio::test]
async fn test_suspend_and_resume_never_change_state() {
    let job = Job::builder(FnWorkload::new("forever", |ctx| async move {
        ctx.cancellation_token().cancelled().await;
        Ok(())
    }))
    .build()
    .unwrap();
    job.start().unwrap();

    assert!(matches!(job.suspend(), Err(JobError::NotSupported { .. })));
    assert!(matches!(job.resume(), Err(JobError::NotSupported { .. })));
    assert_eq!(job.state(), JobState::Running);

    timeout(WAIT, job.stop_async()).await.unwrap();
}

/// A command job streams stdout lines as output and reads job input on stdin
#[tokio::test]
async fn test_command_job_pipes_input_and_output() {
    let api = ThreadJobApi::new(1).unwrap();
    let mut submission = api.submission(
        Job::builder(CommandWorkload::shell("sh", "-c", "cat; echo done")).name("cat"),
        0,
    );

    let job = submission.process(Some(json!("first"))).unwrap();
    submission.process(Some(json!("second"))).unwrap();
    submission.finish().unwrap();

    let info = timeout(WAIT, job.wait_for_terminal()).await.unwrap();
    assert_eq!(info.state, JobState::Completed, "reason: {:?}", info.reason);
    assert_eq!(job.command(), "cat; echo done");
    assert_eq!(
        job.streams().output.drain(),
        vec![json!("first"), json!("second"), json!("done")]
    );
}

/// Non-zero exit fails the job; stderr lines land on the error stream
#[tokio::test]
async fn test_command_job_failure_is_contained() {
    let api = ThreadJobApi::new(1).unwrap();
    let job = api
        .submission(
            Job::builder(CommandWorkload::shell("sh", "-c", "echo oops >&2; exit 4")),
            0,
        )
        .finish()
        .unwrap();

    let info = timeout(WAIT, job.wait_for_terminal()).await.unwrap();
    assert_eq!(info.state, JobState::Failed);

    let errors = job.streams().error.drain();
    assert!(errors.iter().any(|record| record.message == "oops"));
    assert!(
        errors
            .iter()
            .any(|record| record.category == ErrorCategory::ExecutionFailed
                && record.error_id == "ExecutionFailure")
    );

    // The queue is free for the next job
    timeout(WAIT, api.wait_for_idle()).await.unwrap();
    assert_eq!(api.stats().running, 0);
}

/// Arguments and working directory reach the command
#[tokio::test]
async fn test_command_job_receives_arguments_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    let job = Job::builder(CommandWorkload::shell("sh", "-c", "pwd; echo \"$0 $1\""))
        .arguments(["alpha", "beta"])
        .working_directory(dir.path())
        .build()
        .unwrap();
    job.close_input();
    job.start().unwrap();

    let info = timeout(WAIT, job.wait_for_terminal()).await.unwrap();
    assert_eq!(info.state, JobState::Completed, "reason: {:?}", info.reason);

    let output = job.streams().output.drain();
    let cwd = std::fs::canonicalize(dir.path()).unwrap();
    let reported = std::fs::canonicalize(output[0].as_str().unwrap()).unwrap();
    assert_eq!(reported, cwd);
    assert_eq!(output[1], json!("alpha beta"));
}

/// Stopping a queued command job kills the child process
#[tokio::test]
async fn test_stopping_command_job_kills_child() {
    let api = ThreadJobApi::new(1).unwrap();
    let job = api
        .start_job(Job::builder(CommandWorkload::shell("sh", "-c", "sleep 30")), 0)
        .unwrap();

    timeout(WAIT, async {
        let mut states = job.state_changes();
        states
            .wait_for(|info| info.state == JobState::Running)
            .await
            .unwrap();
    })
    .await
    .unwrap();

    let info = timeout(WAIT, job.stop_async()).await.unwrap();
    assert_eq!(info.state, JobState::Stopped);
    timeout(WAIT, api.wait_for_idle()).await.unwrap();
}

/// Registry removal stops the job and forgets it
#[tokio::test]
async fn test_registry_remove_stops_running_job() {
    let api = ThreadJobApi::new(1).unwrap();
    let job = api
        .start_job(
            Job::builder(FnWorkload::new("forever", |ctx| async move {
                ctx.cancellation_token().cancelled().await;
                Ok(())
            }))
            .name("Nightly"),
            0,
        )
        .unwrap();

    assert_eq!(api.registry().by_name("nightly").len(), 1);
    assert!(api.registry().remove(&job));

    let info = timeout(WAIT, job.wait_for_terminal()).await.unwrap();
    assert_eq!(info.state, JobState::Stopped);
    assert!(api.registry().by_name("nightly").is_empty());
}

/// Job input is left for the main script, the initialization command reads an empty stdin
#[tokio::test]
async fn test_initialization_command_does_not_consume_input() {
    let api = ThreadJobApi::new(1).unwrap();
    let mut submission = api.submission(
        Job::builder(CommandWorkload::shell("sh", "-c", "cat"))
            .initialization(CommandWorkload::shell("sh", "-c", "cat")),
        0,
    );
    let job = submission.process(Some(json!("kept"))).unwrap();
    submission.finish().unwrap();

    let info = timeout(WAIT, job.wait_for_terminal()).await.unwrap();
    assert_eq!(info.state, JobState::Completed, "reason: {:?}", info.reason);
    assert_eq!(job.streams().output.drain(), vec![json!("kept")]);
}
