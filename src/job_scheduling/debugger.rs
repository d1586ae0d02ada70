//! Attach/inspect support for a job's execution context
//!
//! A workload may expose a debugger for its execution context through
//! `JobContext::attach_debugger`. The job hands it out wrapped in a
//! `JobDebugger`, which forwards `BreakpointUpdated` and `ExecutionStopped`
//! notifications verbatim to its own listeners and answers the `prompt`
//! command itself.

use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Change applied to a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BreakpointChange {
    Set,
    Removed,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointUpdate {
    pub breakpoint_id: u32,
    pub change: BreakpointChange,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStop {
    pub location: String,
    /// Breakpoints that caused the stop; empty when stepping
    pub breakpoints: Vec<u32>,
}

/// The two notifications a debugger raises
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    BreakpointUpdated(BreakpointUpdate),
    ExecutionStopped(ExecutionStop),
}

/// Result of a command evaluated by a debugger
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebuggerCommandResult {
    pub output: Vec<String>,
    /// True when the debugger handled the command itself
    pub evaluated_by_debugger: bool,
}

pub trait DebugEventListener: Send + Sync {
    fn on_debug_event(&self, event: &DebugEvent);
}

impl<F> DebugEventListener for F
where
    F: Fn(&DebugEvent) + Send + Sync,
{
    fn on_debug_event(&self, event: &DebugEvent) {
        self(event)
    }
}

/// Debugger capability supplied by an execution context
pub trait Debugger: Send + Sync {
    fn add_listener(&self, listener: Arc<dyn DebugEventListener>);

    fn process_command(&self, command: &str) -> Result<DebuggerCommandResult>;

    fn set_step_mode(&self, enabled: bool);

    fn in_breakpoint(&self) -> bool;

    fn stop_processing_command(&self) {}
}

type ListenerList = Mutex<Vec<Arc<dyn DebugEventListener>>>;

fn notify_all(listeners: &ListenerList, event: &DebugEvent) {
    let snapshot: Vec<_> = listeners
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    for listener in snapshot {
        listener.on_debug_event(event);
    }
}

/// Re-raises events from the wrapped debugger to the job debugger's listeners
struct Forwarder {
    listeners: Weak<ListenerList>,
}

impl DebugEventListener for Forwarder {
    fn on_debug_event(&self, event: &DebugEvent) {
        if let Some(listeners) = self.listeners.upgrade() {
            notify_all(&listeners, event);
        }
    }
}

/// Job-scoped view of an execution context's debugger
#[derive(Clone)]
pub struct JobDebugger {
    inner: Arc<dyn Debugger>,
    job_name: String,
    listeners: Arc<ListenerList>,
}

impl std::fmt::Debug for JobDebugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDebugger")
            .field("job_name", &self.job_name)
            .finish_non_exhaustive()
    }
}

impl JobDebugger {
    pub fn new(inner: Arc<dyn Debugger>, job_name: impl Into<String>) -> Self {
        let listeners: Arc<ListenerList> = Arc::new(Mutex::new(Vec::new()));
        inner.add_listener(Arc::new(Forwarder {
            listeners: Arc::downgrade(&listeners),
        }));

        Self {
            inner,
            job_name: job_name.into(),
            listeners,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn add_listener(&self, listener: Arc<dyn DebugEventListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Prompt shown while debugging inside this job
    pub fn prompt(&self) -> String {
        format!("[DBG]: [{}]: ", self.job_name)
    }

    /// Evaluate a command; `prompt` is answered here, everything else goes to the wrapped debugger
    pub fn process_command(&self, command: &str) -> Result<DebuggerCommandResult> {
        if command.trim().eq_ignore_ascii_case("prompt") {
            return Ok(DebuggerCommandResult {
                output: vec![self.prompt()],
                evaluated_by_debugger: true,
            });
        }
        self.inner.process_command(command)
    }

    /// Attach from a parent session; attaching always starts in step mode
    pub fn attach(&self) {
        self.inner.set_step_mode(true);
    }

    pub fn set_step_mode(&self, enabled: bool) {
        self.inner.set_step_mode(enabled);
    }

    pub fn in_breakpoint(&self) -> bool {
        self.inner.in_breakpoint()
    }

    pub fn stop_processing_command(&self) {
        self.inner.stop_processing_command();
    }
}
