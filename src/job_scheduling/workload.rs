//! Workloads a job can execute and the context they run with

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::debugger::Debugger;
use super::job::Job;
use super::stream::DataStream;
use super::types::{
    DiagnosticLevel, DiagnosticRecord, ErrorCategory, ErrorRecord, JobId, JobPhase,
    ProgressRecord, WarningRecord,
};
use crate::errors::StreamResult;

/// Executable payload of a job
///
/// The payload is run by the job's runner on its own task. Returning an
/// error fails the job; the error is recorded on the job's error stream.
/// Cancellation is cooperative: the runner drops the future when the job
/// is stopped, and long-running payloads can also watch
/// `JobContext::cancellation_token`.
#[async_trait]
pub trait Workload: Send + Sync {
    async fn run(&self, ctx: &JobContext) -> Result<()>;

    /// Human readable description, used as the job's command text
    fn describe(&self) -> String;
}

/// Handle a running workload uses to talk to its job
#[derive(Clone)]
pub struct JobContext {
    job: Arc<Job>,
    cancellation: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(job: Arc<Job>, cancellation: CancellationToken) -> Self {
        Self { job, cancellation }
    }

    pub fn job_id(&self) -> JobId {
        self.job.id()
    }

    pub fn job_name(&self) -> String {
        self.job.name()
    }

    /// Arguments supplied when the job was built
    pub fn arguments(&self) -> &[Value] {
        self.job.arguments()
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.job.working_directory()
    }

    /// The job's input channel; `next().await` yields `None` after `close_input`
    pub fn input(&self) -> &DataStream<Value> {
        self.job.input()
    }

    /// True while the job's initialization workload is the one running
    pub fn is_initializing(&self) -> bool {
        self.job.phase() == JobPhase::Initializing
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn write_output(&self, value: impl Into<Value>) -> StreamResult<()> {
        self.job.streams().output.push(value.into())
    }

    pub fn write_error(&self, record: ErrorRecord) -> StreamResult<()> {
        self.job.streams().error.push(record)
    }

    pub fn write_progress(&self, record: ProgressRecord) -> StreamResult<()> {
        self.job.streams().progress.push(record)
    }

    pub fn write_warning(&self, message: impl Into<String>) -> StreamResult<()> {
        self.job.streams().warning.push(WarningRecord::new(message))
    }

    pub fn write_verbose(&self, message: impl Into<String>) -> StreamResult<()> {
        self.write_diagnostic(DiagnosticLevel::Verbose, message)
    }

    pub fn write_debug(&self, message: impl Into<String>) -> StreamResult<()> {
        self.write_diagnostic(DiagnosticLevel::Debug, message)
    }

    pub fn write_information(&self, message: impl Into<String>) -> StreamResult<()> {
        self.write_diagnostic(DiagnosticLevel::Information, message)
    }

    fn write_diagnostic(&self, level: DiagnosticLevel, message: impl Into<String>) -> StreamResult<()> {
        self.job
            .streams()
            .diagnostic
            .push(DiagnosticRecord::new(level, message))
    }

    /// Expose the execution context's debugger so it can be attached to
    pub fn attach_debugger(&self, debugger: Arc<dyn Debugger>) {
        self.job.attach_debugger(debugger);
    }
}

/// Workload backed by an async closure
pub struct FnWorkload<F> {
    description: String,
    func: F,
}

impl<F, Fut> FnWorkload<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    pub fn new(description: impl Into<String>, func: F) -> Self {
        Self {
            description: description.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Workload for FnWorkload<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: &JobContext) -> Result<()> {
        (self.func)(ctx.clone()).await
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Workload that runs an external process
///
/// Job input is written to the child's stdin one line per value (the
/// initialization workload gets an empty stdin instead), stdout
/// lines become output objects and stderr lines become error records. The
/// child is killed when the job is stopped.
#[derive(Debug, Clone)]
pub struct CommandWorkload {
    program: String,
    args: Vec<String>,
    description: Option<String>,
}

impl CommandWorkload {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: None,
        }
    }

    /// Run `script` through a shell, e.g. `sh -c <script>`
    pub fn shell(shell: impl Into<String>, shell_arg: impl Into<String>, script: impl Into<String>) -> Self {
        let script = script.into();
        Self {
            program: shell.into(),
            args: vec![shell_arg.into(), script.clone()],
            description: Some(script),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

fn value_to_line(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

async fn feed_stdin(mut stdin: tokio::process::ChildStdin, input: DataStream<Value>) -> std::io::Result<()> {
    while let Some(value) = input.next().await {
        let mut line = value_to_line(&value);
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
    }
    stdin.shutdown().await
}

#[async_trait]
impl Workload for CommandWorkload {
    async fn run(&self, ctx: &JobContext) -> Result<()> {
        let reads_input = !ctx.is_initializing();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(ctx.arguments().iter().map(value_to_line))
            .stdin(if reads_input { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = ctx.working_directory() {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.program))?;
        debug!(job_id = %ctx.job_id(), program = %self.program, pid = ?child.id(), "Spawned child process");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().context("child stdout was not piped")?;
        let stderr = child.stderr.take().context("child stderr was not piped")?;

        let input = ctx.input().clone();
        let feed = async move {
            match stdin {
                Some(stdin) => feed_stdin(stdin, input).await,
                None => Ok(()),
            }
        };
        let pump_stdout = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                ctx.write_output(line)?;
            }
            anyhow::Ok(())
        };
        let pump_stderr = async {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                ctx.write_error(ErrorRecord::new(
                    "NativeCommandError",
                    ErrorCategory::ExecutionFailed,
                    line,
                ))?;
            }
            anyhow::Ok(())
        };
        let finished = async {
            let (stdout_result, stderr_result) = tokio::join!(pump_stdout, pump_stderr);
            (stdout_result, stderr_result, child.wait().await)
        };

        tokio::pin!(feed);
        tokio::pin!(finished);
        let mut feeding = true;
        // Input that is never closed must not keep a finished child alive.
        let (stdout_result, stderr_result, status) = loop {
            tokio::select! {
                result = &mut feed, if feeding => {
                    feeding = false;
                    if let Err(e) = result {
                        debug!(job_id = %ctx.job_id(), "Stopped feeding child stdin: {}", e);
                    }
                }
                done = &mut finished => break done,
            }
        };

        stdout_result?;
        stderr_result?;
        let status = status.with_context(|| format!("Failed to wait for '{}'", self.program))?;
        if !status.success() {
            anyhow::bail!("'{}' exited with {}", self.describe(), status);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None if self.args.is_empty() => self.program.clone(),
            None => format!("{} {}", self.program, self.args.join(" ")),
        }
    }
}

/// Convenience for a shared, type-erased workload
pub type SharedWorkload = Arc<dyn Workload>;
