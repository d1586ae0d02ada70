use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use threadjob::{
    config::{Config, LogFormat},
    errors::AppResult,
    job_scheduling::{CommandWorkload, Job, JobBuilder, JobId, JobState, JobSubmission, ThreadJobApi},
    observability::{AppObservability, init_logging},
};

#[derive(Parser)]
#[command(name = "threadjob")]
#[command(version)]
#[command(about = "Run shell commands as background jobs with a bounded number running at once")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "threadjob.toml")]
    config: PathBuf,

    /// Log level (overrides config file)
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    /// Log format (overrides config file)
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run every script as its own job
    Run(RunArgs),
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Args)]
struct RunArgs {
    /// Maximum number of jobs running at once
    #[arg(short = 't', long, value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    throttle_limit: Option<u32>,

    /// Script run before each job's main script; a failure fails the job
    #[arg(long, value_name = "SCRIPT")]
    init: Option<String>,

    /// Job name; numbered when several scripts are given
    #[arg(short, long)]
    name: Option<String>,

    /// Feed stdin lines to every job as input
    #[arg(long)]
    input: bool,

    /// Working directory for the jobs
    #[arg(short = 'C', long, value_name = "DIR")]
    working_directory: Option<PathBuf>,

    /// Scripts to run
    #[arg(required = true, value_name = "SCRIPT")]
    scripts: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;

    init_logging(&config.logging)?;
    info!("Starting threadjob v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run(args) => run(&config, args).await,
    }
}

/// Load the configuration file and apply command-line overrides
fn load_config(cli: &Cli) -> AppResult<Config> {
    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }
    if let Command::Run(args) = &cli.command {
        if let Some(limit) = args.throttle_limit {
            config.scheduler.throttle_limit = limit as usize;
        }
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: &Config, args: RunArgs) -> Result<()> {
    let observability = AppObservability::new("threadjob");
    let api = ThreadJobApi::from_config(&config.scheduler, observability.scheduler_metrics())?;
    let shutdown_timeout = config.scheduler.shutdown_timeout()?;

    let total = args.scripts.len();
    let mut submissions: Vec<JobSubmission> = args
        .scripts
        .iter()
        .enumerate()
        .map(|(index, script)| api.submission(job_builder(config, &args, index, total, script), 0))
        .collect();

    let mut printers = StreamPrinters::default();
    if args.input {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            for submission in &mut submissions {
                let job = submission.process(Some(Value::String(line.clone())))?;
                printers.watch(&job);
            }
        }
    }

    let mut jobs = Vec::with_capacity(total);
    for submission in submissions {
        let job = submission.finish()?;
        printers.watch(&job);
        jobs.push(job);
    }
    info!("Submitted {} jobs (throttle limit {})", total, api.queue().throttle_limit());

    tokio::select! {
        _ = api.wait_for_idle() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            warn!("Interrupted, stopping all jobs");
            api.stop_all();
            if tokio::time::timeout(shutdown_timeout, api.wait_for_idle()).await.is_err() {
                warn!("Jobs still running after {:?}, exiting anyway", shutdown_timeout);
            }
        }
    }
    printers.join().await;

    let mut unsuccessful = 0;
    for job in &jobs {
        let info = job.state_info();
        if info.state != JobState::Completed {
            unsuccessful += 1;
        }
        info!(
            job_id = %job.id(),
            job_name = %job.name(),
            state = %info.state,
            reason = info.reason.as_deref().unwrap_or(""),
            "Job finished"
        );
    }

    if let Err(e) = observability.shutdown() {
        warn!("Failed to shut down metrics provider: {}", e);
    }

    if unsuccessful > 0 {
        anyhow::bail!("{unsuccessful} of {total} jobs did not complete");
    }
    Ok(())
}

fn job_builder(config: &Config, args: &RunArgs, index: usize, total: usize, script: &str) -> JobBuilder {
    let shell = |script: &str| {
        CommandWorkload::shell(&config.command.shell, &config.command.shell_arg, script)
    };

    let mut builder = Job::builder(shell(script));
    if let Some(init) = &args.init {
        builder = builder.initialization(shell(init));
    }
    if let Some(name) = &args.name {
        builder = builder.name(if total == 1 {
            name.clone()
        } else {
            format!("{}-{}", name, index + 1)
        });
    }
    if let Some(dir) = &args.working_directory {
        builder = builder.working_directory(dir);
    }
    builder
}

/// One printing task per job, following its output, error and warning streams
#[derive(Default)]
struct StreamPrinters {
    watched: HashSet<JobId>,
    tasks: Vec<JoinHandle<()>>,
}

impl StreamPrinters {
    fn watch(&mut self, job: &Arc<Job>) {
        if !self.watched.insert(job.id()) {
            return;
        }

        let name = job.name();
        let streams = job.streams().clone();
        self.tasks.push(tokio::spawn(async move {
            let output = async {
                while let Some(value) = streams.output.next().await {
                    match value {
                        Value::String(line) => println!("[{name}] {line}"),
                        other => println!("[{name}] {other}"),
                    }
                }
            };
            let errors = async {
                while let Some(record) = streams.error.next().await {
                    eprintln!("[{name}] error: {}", record.message);
                }
            };
            let warnings = async {
                while let Some(record) = streams.warning.next().await {
                    eprintln!("[{name}] warning: {}", record.message);
                }
            };
            tokio::join!(output, errors, warnings);
        }));
    }

    async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Stream printer task failed: {}", e);
            }
        }
    }
}
