//! Job scheduling type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl JobId {
    /// Allocate the next session id
    pub(crate) fn next() -> Self {
        JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned by `Job::subscribe`, used to unsubscribe again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Externally visible job state
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum JobState {
    NotStarted,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobState {
    /// Completed, Failed and Stopped are final
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Stopped)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: JobState) -> bool {
        match self {
            // A job can be stopped or fail before it was ever started
            JobState::NotStarted => matches!(
                next,
                JobState::Running | JobState::Stopped | JobState::Failed
            ),
            JobState::Running => next.is_terminal(),
            JobState::Completed | JobState::Failed | JobState::Stopped => false,
        }
    }
}

/// Internal sub-phase of a job's execution context
///
/// Only `JobState` takes part in the state machine; the phase is
/// informational and tells an observer whether the initialization
/// workload or the main workload is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum JobPhase {
    Idle,
    Initializing,
    Executing,
    Finished,
}

impl JobPhase {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            JobPhase::Idle => 0,
            JobPhase::Initializing => 1,
            JobPhase::Executing => 2,
            JobPhase::Finished => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => JobPhase::Initializing,
            2 => JobPhase::Executing,
            3 => JobPhase::Finished,
            _ => JobPhase::Idle,
        }
    }
}

/// Current state plus the reason for the last transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStateInfo {
    pub state: JobState,
    pub reason: Option<String>,
}

impl JobStateInfo {
    pub fn new(state: JobState, reason: Option<String>) -> Self {
        Self { state, reason }
    }
}

impl Default for JobStateInfo {
    fn default() -> Self {
        Self::new(JobState::NotStarted, None)
    }
}

/// Payload of a state-change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStateEvent {
    pub previous: JobState,
    pub state: JobState,
    pub reason: Option<String>,
}

impl JobStateEvent {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Broad classification of an error record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum ErrorCategory {
    InvalidOperation,
    InvalidData,
    InitializationFailed,
    ExecutionFailed,
}

/// Entry on a job's error stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_id: String,
    pub category: ErrorCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(error_id: impl Into<String>, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            error_id: error_id.into(),
            category,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.error_id, self.category, self.message)
    }
}

/// Entry on a job's progress stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub activity: String,
    pub status: String,
    /// 0..=100 when known
    pub percent_complete: Option<u8>,
}

impl ProgressRecord {
    pub fn new(activity: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
            status: status.into(),
            percent_complete: None,
        }
    }

    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent_complete = Some(percent.min(100));
        self
    }
}

/// Entry on a job's warning stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl WarningRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Severity of a diagnostic record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum DiagnosticLevel {
    Verbose,
    Debug,
    Information,
}

/// Entry on a job's diagnostic stream (verbose, debug and informational text)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub level: DiagnosticLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl DiagnosticRecord {
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
