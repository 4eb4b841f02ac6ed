//! Logging setup and the webhook server's health report.

use std::io;

use clap::ValueEnum;
use serde::Serialize;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log format configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format for terminals.
    #[default]
    Pretty,
    /// One JSON object per line for log aggregation.
    Json,
}

/// Initializes structured logging on stderr.
///
/// Stdout is left to command output. The level filter comes from `RUST_LOG`
/// and defaults to `info`. Span close events carry request timing.
pub fn init_observability(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_thread_names(false)
                        .with_span_events(FmtSpan::CLOSE)
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Json => {
            subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_thread_names(false)
                        .with_span_events(FmtSpan::CLOSE)
                        .with_writer(io::stderr),
                )
                .init();
        }
    }
}

/// Overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All checks pass.
    Healthy,
    /// Operational with warnings.
    Degraded,
    /// At least one check failed.
    Unhealthy,
}

/// Status of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckStatus {
    /// Check passed.
    Pass,
    /// Check failed.
    Fail,
    /// Degraded but operational.
    Warn,
}

/// Individual health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Check name.
    pub name: String,
    /// Check status.
    pub status: HealthCheckStatus,
    /// Optional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    /// Passing check with details.
    #[must_use]
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), status: HealthCheckStatus::Pass, message: Some(message.into()) }
    }

    /// Warning check with details.
    #[must_use]
    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), status: HealthCheckStatus::Warn, message: Some(message.into()) }
    }

    #[cfg(test)]
    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), status: HealthCheckStatus::Fail, message: Some(message.into()) }
    }
}

/// Health report served at `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall status, derived from the checks.
    pub status: HealthStatus,
    /// Harness version.
    pub version: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Webhooks currently stored.
    pub total_webhooks: usize,
    /// Individual checks.
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    /// Builds a report, deriving the overall status from `checks`.
    #[must_use]
    pub fn new(uptime_secs: u64, total_webhooks: usize, checks: Vec<HealthCheck>) -> Self {
        Self {
            status: Self::compute_status(&checks),
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs,
            total_webhooks,
            checks,
        }
    }

    /// Fails over warns over passes.
    #[must_use]
    pub fn compute_status(checks: &[HealthCheck]) -> HealthStatus {
        if checks.iter().any(|c| c.status == HealthCheckStatus::Fail) {
            HealthStatus::Unhealthy
        } else if checks.iter().any(|c| c.status == HealthCheckStatus::Warn) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
