//! Error type definitions for threadjob
//!
//! The scheduler distinguishes between errors that belong to the caller
//! (invalid state, unsupported operation, bad argument) and errors raised
//! by a job's payload. Payload errors never leave the job: they end up on
//! its error stream and drive it to `Failed`.

use thiserror::Error;

use crate::job_scheduling::types::JobState;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Scheduler and job lifecycle errors
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Stream errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by the job scheduling core
#[derive(Error, Debug)]
pub enum JobError {
    /// Operation is not valid for the current job or queue state
    #[error("Invalid state: {operation} is not allowed while job {job} is {state}")]
    InvalidState {
        operation: &'static str,
        job: String,
        state: JobState,
    },

    /// Capability intentionally not implemented
    #[error("Operation not supported: {operation}")]
    NotSupported { operation: &'static str },

    /// Malformed input to a scheduler operation
    #[error("Invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: &'static str, reason: String },

    /// The job's payload failed while executing
    #[error("Execution failed: {0:#}")]
    Execution(#[source] anyhow::Error),

    /// No async runtime is available to launch an execution context on
    #[error("No tokio runtime available to run {operation}")]
    NoRuntime { operation: &'static str },
}

impl JobError {
    /// Short machine-friendly identifier, used as the error record id
    pub fn error_id(&self) -> &'static str {
        match self {
            JobError::InvalidState { .. } => "InvalidState",
            JobError::NotSupported { .. } => "NotSupported",
            JobError::InvalidArgument { .. } => "InvalidArgument",
            JobError::Execution(_) => "ExecutionFailure",
            JobError::NoRuntime { .. } => "NoRuntime",
        }
    }
}

/// Errors raised by job data streams
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The stream was closed and accepts no further data
    #[error("Stream '{stream}' is closed")]
    Closed { stream: &'static str },
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Underlying figment extraction failure
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value failed validation
    #[error("Invalid configuration value for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Load(Box::new(error))
    }
}
