// index-perf CLI - measure query latency and plan cost under different index hints
use anyhow::Result;
use clap::Parser;
use index_perf::{
    init_logging_with_level, load_test_queries, within_context, FileSink, HarnessConfig,
    MongoConnector, OperationContext, Orchestrator, OutputFormat,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "MongoDB index hint performance tester",
    long_about = None,
    after_help = "EXAMPLES:
  # Compare hints for every query in queries.json
  index-perf --test-config queries.json

  # Fewer iterations, CSV output into ./results
  index-perf --test-config queries.json --iterations 200 --output-format csv --output-dir results

  # Settings file plus a remote server
  index-perf --settings perf.toml --connection mongodb://db.internal:27017 --test-config queries.json"
)]
struct Cli {
    /// MongoDB connection string
    #[arg(short, long, env = "INDEX_PERF_CONNECTION")]
    connection: Option<String>,

    /// Timed iterations per hint [default: 1000]
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    iterations: Option<u32>,

    /// Warm-up iterations per hint [default: 10]
    #[arg(short, long)]
    warmup: Option<u32>,

    /// Explain every N-th timed iteration, 0 to disable [default: 1]
    #[arg(short, long)]
    sample_interval: Option<u32>,

    /// Output format [default: table]
    #[arg(short = 'f', long, value_enum)]
    output_format: Option<OutputFormat>,

    /// Directory for result files [default: .]
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// JSON file with the queries and hints to test
    #[arg(short, long)]
    test_config: PathBuf,

    /// Connection attempts before giving up [default: 3]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_retries: Option<u32>,

    /// Backoff base in seconds; attempt k waits base^k [default: 2]
    #[arg(long)]
    retry_delay_base: Option<f64>,

    /// TOML settings file, overridden by INDEX_PERF_* variables and flags
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Enable verbose logging (DEBUG level)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Flags win over the settings file and environment
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(connection) = &self.connection {
            config.connection.uri = connection.clone();
        }
        if let Some(iterations) = self.iterations {
            config.trial.iterations = iterations;
        }
        if let Some(warmup) = self.warmup {
            config.trial.warmup_iterations = warmup;
        }
        if let Some(sample_interval) = self.sample_interval {
            config.trial.sample_interval = sample_interval;
        }
        if let Some(format) = self.output_format {
            config.output.format = format;
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(max_retries) = self.max_retries {
            config.connection.max_retries = max_retries;
        }
        if let Some(base) = self.retry_delay_base {
            config.connection.retry_delay_base = base;
        }
    }
}

async fn run(cli: Cli, ctx: &OperationContext) -> Result<()> {
    let mut config = HarnessConfig::load(cli.settings.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    let queries = load_test_queries(&cli.test_config)?;

    let connector = MongoConnector::new(config.connection.uri.clone())
        .with_server_selection_timeout(config.connection.server_selection_timeout);
    let sink = FileSink::new(config.output.format, config.output.directory.clone());

    let mut orchestrator = Orchestrator::new(
        connector,
        sink,
        config.trial_settings(),
        config.retry_policy(),
    );
    let summary = orchestrator.run(ctx, &queries).await?;
    let sink = orchestrator.into_sink();

    info!(
        trace_id = %ctx.trace_id,
        queries = summary.queries_tested,
        succeeded = summary.trials_succeeded,
        failed = summary.trials_failed,
        files = sink.written_files().len(),
        "Performance test finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging_with_level(cli.verbose, cli.quiet)?;

    let ctx = OperationContext::new("index-perf");
    within_context(&ctx, run(cli, &ctx)).await
}
