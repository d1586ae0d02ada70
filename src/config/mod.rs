use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub mod defaults;

use crate::errors::ConfigError;
use crate::job_scheduling::MAX_THROTTLE_LIMIT;
use defaults::*;

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at once
    #[serde(default = "default_throttle_limit")]
    pub throttle_limit: usize,
    /// How long the command front end waits for jobs after Ctrl-C (humantime, e.g. "30s")
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for the crate; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

/// How shell commands submitted through the CLI are executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_shell_arg")]
    pub shell_arg: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub command: CommandConfig,
}

fn default_throttle_limit() -> usize {
    DEFAULT_THROTTLE_LIMIT
}

fn default_shutdown_timeout() -> String {
    DEFAULT_SHUTDOWN_TIMEOUT.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

fn default_shell_arg() -> String {
    DEFAULT_SHELL_ARG.to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            throttle_limit: default_throttle_limit(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    pub fn shutdown_timeout(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.shutdown_timeout).map_err(|e| ConfigError::Invalid {
            field: "scheduler.shutdown_timeout".to_string(),
            message: e.to_string(),
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            shell_arg: default_shell_arg(),
        }
    }
}

impl Config {
    /// Layered sources: defaults, then the TOML file, then `THREADJOB_*` variables
    ///
    /// Nested keys use `__` in environment variables, e.g.
    /// `THREADJOB_SCHEDULER__THROTTLE_LIMIT=8`.
    pub fn figment(config_file: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load from `CONFIG_FILE` (or `threadjob.toml`) plus the environment
    pub fn load() -> Result<Self, ConfigError> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(config_file)
    }

    /// A missing file is not an error; defaults and environment still apply
    pub fn load_from_file(config_file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_file = config_file.as_ref();
        if !config_file.exists() {
            debug!("Config file {} not found, using defaults", config_file.display());
        }
        Self::from_figment(Self::figment(config_file))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limit = self.scheduler.throttle_limit;
        if limit == 0 || limit > MAX_THROTTLE_LIMIT {
            return Err(ConfigError::Invalid {
                field: "scheduler.throttle_limit".to_string(),
                message: format!("must be between 1 and {MAX_THROTTLE_LIMIT}, got {limit}"),
            });
        }

        self.scheduler.shutdown_timeout()?;

        if self.command.shell.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "command.shell".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(ConfigError::Invalid {
                field: "logging.level".to_string(),
                message: format!("'{}' is not a valid log filter", self.logging.level),
            });
        }

        Ok(())
    }
}
