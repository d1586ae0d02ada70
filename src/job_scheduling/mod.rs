//! Job scheduling subsystem for threadjob
//!
//! Every job runs its workload on its own task with its own input channel
//! and output streams. A throttled queue bounds how many jobs run at once:
//! - `Job`: lifecycle state machine, streams, subscriptions and stop/input control
//! - `JobRunner`: runs the initialization and main workloads and reports the outcome
//! - `Gate`: open/closed signal the dispatcher parks on at the limit
//! - `ThrottledQueue`: FIFO queue plus dispatcher enforcing the throttle limit
//! - `ThreadJobApi`: explicitly constructed context owning one queue and one registry

pub mod api;
pub mod debugger;
pub mod gate;
pub mod job;
pub mod job_runner;
pub mod registry;
pub mod stream;
pub mod throttled_queue;
pub mod types;
pub mod workload;

pub use api::{JobSubmission, ThreadJobApi};
pub use debugger::{DebugEvent, DebugEventListener, Debugger, JobDebugger};
pub use gate::Gate;
pub use job::{Job, JobBuilder, StateChangeHandler};
pub use registry::{InMemoryJobRegistry, JobRegistry};
pub use stream::{DataStream, JobStreams};
pub use throttled_queue::{MAX_THROTTLE_LIMIT, ThrottledQueue, ThrottledQueueStats};
pub use types::*;
pub use workload::{CommandWorkload, FnWorkload, JobContext, SharedWorkload, Workload};
