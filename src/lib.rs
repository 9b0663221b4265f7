// index-perf - Index hint performance testing for MongoDB
// Root library module

pub mod observability;
pub mod validation;
pub mod pure;
pub mod types;
pub mod contracts;
pub mod plan_cache;
pub mod harness;
pub mod orchestrator;
pub mod mongo;
pub mod formatters;
pub mod config;

// Re-export key types
pub use observability::{
    init_logging_with_level,
    log_error_with_context,
    record_metric,
    within_context,
    MetricType,
    OperationContext,
    PerfTimer,
};

pub use contracts::{
    execution_stats,
    Connector,
    QueryBackend,
    ResultSink,
    Sleeper,
    TokioSleeper,
};

pub use types::{
    FindQuery,
    IndexHint,
    Namespace,
    QuerySpec,
    ServerVersion,
    TestQueryConfig,
    TestResult,
    TrialSettings,
};

pub use validation::ConfigError;

pub use pure::{reduce, TimingSummary};

pub use plan_cache::{clear_plan_cache, PlanCacheClear};

pub use harness::{Harness, SampleSet};

pub use orchestrator::{Orchestrator, OrchestratorError, RetryPolicy, RunSummary};

pub use mongo::{MongoBackend, MongoConnector};

pub use formatters::{
    CsvFormatter,
    FileSink,
    JsonFormatter,
    OutputFormat,
    ResultFormatter,
    TableFormatter,
};

pub use config::{load_test_queries, parse_test_queries, HarnessConfig};
