use anyhow::Result;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, Meter, MeterProvider, UpDownCounter},
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};
use crate::job_scheduling::JobState;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("threadjob={}", config.level)))?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }
    Ok(())
}

/// Observability context owning the meter provider
#[derive(Clone)]
pub struct AppObservability {
    pub meter: Meter,
    provider: SdkMeterProvider,
}

impl AppObservability {
    pub fn new(service_name: &'static str) -> Self {
        let provider = SdkMeterProvider::builder().build();
        global::set_meter_provider(provider.clone());
        let meter = provider.meter(service_name);

        info!("OpenTelemetry configured: local metrics for {}", service_name);
        Self { meter, provider }
    }

    pub fn scheduler_metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics::new(&self.meter)
    }

    /// Flush and stop the meter provider
    pub fn shutdown(&self) -> Result<()> {
        self.provider.shutdown()?;
        Ok(())
    }
}

/// Instruments recorded by a throttled queue
#[derive(Clone)]
pub struct SchedulerMetrics {
    jobs_enqueued: Counter<u64>,
    jobs_started: Counter<u64>,
    jobs_finished: Counter<u64>,
    start_failures: Counter<u64>,
    jobs_running: UpDownCounter<i64>,
    job_duration: Histogram<f64>,
}

impl SchedulerMetrics {
    pub fn new(meter: &Meter) -> Self {
        let jobs_enqueued = meter
            .u64_counter("jobs_enqueued_total")
            .with_description("Jobs submitted to a throttled queue")
            .build();
        let jobs_started = meter
            .u64_counter("jobs_started_total")
            .with_description("Jobs started by the dispatcher")
            .build();
        let jobs_finished = meter
            .u64_counter("jobs_finished_total")
            .with_description("Jobs that reached a terminal state")
            .build();
        let start_failures = meter
            .u64_counter("job_start_failures_total")
            .with_description("Jobs whose start was rejected")
            .build();
        let jobs_running = meter
            .i64_up_down_counter("jobs_running")
            .with_description("Jobs currently counted as running")
            .build();
        let job_duration = meter
            .f64_histogram("job_duration_seconds")
            .with_description("Time from start to terminal state")
            .build();

        Self {
            jobs_enqueued,
            jobs_started,
            jobs_finished,
            start_failures,
            jobs_running,
            job_duration,
        }
    }

    pub fn record_enqueued(&self) {
        self.jobs_enqueued.add(1, &[]);
    }

    pub fn record_dispatched(&self) {
        self.jobs_running.add(1, &[]);
    }

    pub fn record_started(&self) {
        self.jobs_started.add(1, &[]);
    }

    pub fn record_start_failure(&self) {
        self.start_failures.add(1, &[]);
    }

    pub fn record_released(&self) {
        self.jobs_running.add(-1, &[]);
    }

    pub fn record_finished(&self, state: JobState, duration: Option<Duration>) {
        let attributes = [KeyValue::new("state", state.to_string())];
        self.jobs_finished.add(1, &attributes);
        if let Some(duration) = duration {
            self.job_duration.record(duration.as_secs_f64(), &attributes);
        }
    }
}

impl Default for SchedulerMetrics {
    /// Instruments on the global meter; no-ops until a provider is installed
    fn default() -> Self {
        Self::new(&global::meter("threadjob"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record_without_provider() {
        let metrics = SchedulerMetrics::default();
        metrics.record_enqueued();
        metrics.record_dispatched();
        metrics.record_started();
        metrics.record_finished(JobState::Completed, Some(Duration::from_millis(5)));
        metrics.record_released();
        metrics.record_start_failure();
    }

    #[tokio::test]
    async fn test_app_observability_builds_scheduler_metrics() {
        let observability = AppObservability::new("threadjob-test");
        let metrics = observability.scheduler_metrics();
        metrics.record_enqueued();
        metrics.record_finished(JobState::Failed, None);
        observability.shutdown().unwrap();
    }
}
