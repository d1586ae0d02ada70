//! Centralized error handling for threadjob
//!
//! # Error Categories
//!
//! - **Job Errors**: lifecycle violations, unsupported operations, bad arguments
//! - **Stream Errors**: writes into a closed job stream
//! - **Config Errors**: configuration loading and validation
//!
//! # Usage
//!
//! ```rust
//! use threadjob::errors::{JobError, JobResult};
//!
//! fn suspend() -> JobResult<()> {
//!     Err(JobError::NotSupported { operation: "suspend" })
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for scheduler Results
pub type JobResult<T> = Result<T, JobError>;

/// Convenience type alias for stream Results
pub type StreamResult<T> = Result<T, StreamError>;
