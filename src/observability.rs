// Observability Infrastructure for index-perf
// Structured logging and trace contexts shared by the harness and orchestrator

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Filter used when neither `--verbose` nor `--quiet` is given
pub const DEFAULT_FILTER: &str = "index_perf=info,warn";
/// Filter used with `--verbose`
pub const VERBOSE_FILTER: &str = "index_perf=debug,info";
/// Filter used with `--quiet`
pub const QUIET_FILTER: &str = "error";

/// Initialize logging with configurable verbosity
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = EnvFilter::new(filter_directive(verbose, quiet));

    // Quiet wins over RUST_LOG
    let env_filter = if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    // stdout carries the formatted results
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            debug!("index-perf observability initialized");
            Ok(())
        }
        // Already initialized, which is fine in test environments
        Err(_) => Ok(()),
    }
}

/// Pick the filter directive for the given flags
pub fn filter_directive(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        QUIET_FILTER
    } else if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Metric types recorded at debug level while measuring
#[derive(Debug, Clone)]
pub enum MetricType {
    Counter { name: &'static str, value: u64 },
    Timer { name: &'static str, duration: Duration },
}

/// Record a metric
pub fn record_metric(metric: MetricType) {
    match metric {
        MetricType::Counter { name, value } => debug!("metric.counter {} = {}", name, value),
        MetricType::Timer { name, duration } => debug!("metric.timer {} = {:?}", name, duration),
    }
}

/// Operation context carried explicitly through a run.
///
/// The harness receives one of these per trial instead of reaching for
/// module-level logging state, so every log line of a trial carries the
/// same trace id and the query/hint attributes that identify it.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub operation: String,
    pub start_time: Instant,
    pub attributes: Vec<(String, String)>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_attribute(key, value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attributes rendered as `k=v, k=v` for log fields
    pub fn attributes_string(&self) -> String {
        self.attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Execute a future under a caller-owned context, logging start, finish and failure
pub async fn within_context<F, T>(ctx: &OperationContext, f: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let operation = ctx.operation.as_str();

    info!(
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        "Starting operation: {}", operation
    );

    let result = f.await;
    let elapsed = ctx.elapsed();

    match &result {
        Ok(_) => {
            info!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                elapsed_ms = elapsed.as_millis(),
                "Operation completed successfully: {}", operation
            );
            record_metric(MetricType::Timer {
                name: "operation.duration",
                duration: elapsed,
            });
        }
        Err(e) => {
            error!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                elapsed_ms = elapsed.as_millis(),
                error = %e,
                "Operation failed: {}", operation
            );
            record_metric(MetricType::Counter {
                name: "operation.errors",
                value: 1,
            });
        }
    }

    result
}

/// Structured error logging with the full error chain
pub fn log_error_with_context(error: &anyhow::Error, ctx: &OperationContext) {
    let error_chain = error
        .chain()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" -> ");

    error!(
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        operation = %ctx.operation,
        attributes = %ctx.attributes_string(),
        error_chain = %error_chain,
        "Error occurred during operation"
    );
}

/// Scoped timer that logs its duration on drop
pub struct PerfTimer {
    name: String,
    ctx: OperationContext,
}

impl PerfTimer {
    pub fn new(parent: &OperationContext, name: impl Into<String>) -> Self {
        let name = name.into();
        let ctx = parent.child(&name);
        debug!(
            trace_id = %ctx.trace_id,
            span_id = %ctx.span_id,
            "Timer started: {}", name
        );
        Self { name, ctx }
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        let elapsed = self.ctx.elapsed();
        debug!(
            trace_id = %self.ctx.trace_id,
            span_id = %self.ctx.span_id,
            elapsed_ms = elapsed.as_millis(),
            "Timer completed: {}", self.name
        );
        record_metric(MetricType::Timer {
            name: "perf.timer",
            duration: elapsed,
        });
    }
}
