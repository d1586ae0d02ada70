/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Scheduler defaults
pub const DEFAULT_THROTTLE_LIMIT: usize = 5;
pub const DEFAULT_SHUTDOWN_TIMEOUT: &str = "30s";

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Command defaults
#[cfg(not(windows))]
pub const DEFAULT_SHELL: &str = "sh";
#[cfg(not(windows))]
pub const DEFAULT_SHELL_ARG: &str = "-c";
#[cfg(windows)]
pub const DEFAULT_SHELL: &str = "cmd";
#[cfg(windows)]
pub const DEFAULT_SHELL_ARG: &str = "/C";

// Loading
pub const DEFAULT_CONFIG_FILE: &str = "threadjob.toml";
pub const ENV_PREFIX: &str = "THREADJOB_";
