// Result formatting and persistence
// Table, CSV and JSON renderings of one query's results, and the file sink that
// writes them next to a timestamped log name.

use crate::contracts::ResultSink;
use crate::types::{QuerySpec, TestQueryConfig, TestResult};
use crate::validation::path::sanitize_file_stem;
use anyhow::{anyhow, Context, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// File stem used when a query has no usable name
pub const DEFAULT_RESULT_NAME: &str = "index_performance_test";

const COLUMNS: [&str; 13] = [
    "Index Hint",
    "Iteration",
    "Warmup Iteration",
    "Sample Interval",
    "Avg Time (s)",
    "Min Time (s)",
    "Max Time (s)",
    "StdDev",
    "95th %",
    "99th %",
    "Avg Docs",
    "Avg Keys",
    "Avg Returned",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn formatter(self) -> Box<dyn ResultFormatter> {
        match self {
            OutputFormat::Table => Box::new(TableFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Table => "table",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(anyhow!("Invalid output format: {other}")),
        }
    }
}

/// Renders the results of one configured query
pub trait ResultFormatter: Send + Sync {
    fn format(&self, query: &QuerySpec, results: &[TestResult]) -> Result<String>;
}

fn time(value: f64) -> String {
    format!("{value:.6}")
}

fn average(value: f64) -> String {
    format!("{value:.1}")
}

fn numeric_cells(result: &TestResult) -> [String; 12] {
    [
        result.iteration_count.to_string(),
        result.warmup_iteration_count.to_string(),
        result.sample_interval.to_string(),
        time(result.avg_time),
        time(result.min_time),
        time(result.max_time),
        time(result.stdev_time),
        time(result.percentile_95),
        time(result.percentile_99),
        average(result.avg_docs_examined),
        average(result.avg_keys_examined),
        average(result.avg_docs_returned),
    ]
}

pub struct TableFormatter;

impl ResultFormatter for TableFormatter {
    fn format(&self, query: &QuerySpec, results: &[TestResult]) -> Result<String> {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(COLUMNS);

        for result in results {
            let mut row = vec![result.hint.to_string()];
            row.extend(numeric_cells(result));
            table.add_row(row);
        }

        Ok(format!("query: {query}\n{table}"))
    }
}

pub struct CsvFormatter;

impl ResultFormatter for CsvFormatter {
    fn format(&self, _query: &QuerySpec, results: &[TestResult]) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["Query ID"];
        header.extend(COLUMNS);
        header.push("Error");
        wtr.write_record(&header)?;

        for result in results {
            let mut record = vec![result.query.to_string(), result.hint.to_string()];
            record.extend(numeric_cells(result));
            record.push(result.error.clone().unwrap_or_default());
            wtr.write_record(&record)?;
        }

        let bytes = wtr
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush CSV output: {}", e.error()))?;
        String::from_utf8(bytes).context("CSV output is not UTF-8")
    }
}

pub struct JsonFormatter;

impl ResultFormatter for JsonFormatter {
    fn format(&self, _query: &QuerySpec, results: &[TestResult]) -> Result<String> {
        serde_json::to_string_pretty(results).context("Failed to serialize results")
    }
}

/// Writes each query's formatted results to `<dir>/<name>_<timestamp>.log`
/// and echoes them to stdout
pub struct FileSink {
    format: OutputFormat,
    formatter: Box<dyn ResultFormatter>,
    output_dir: PathBuf,
    echo: bool,
    written: Vec<PathBuf>,
}

impl FileSink {
    pub fn new(format: OutputFormat, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            formatter: format.formatter(),
            output_dir: output_dir.into(),
            echo: true,
            written: Vec::new(),
        }
    }

    /// Turn stdout echo on or off
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Files successfully written so far, in order
    pub fn written_files(&self) -> &[PathBuf] {
        &self.written
    }

    /// Output path for a query called `name`, stamped with the current local time
    pub fn output_path(&self, name: &str) -> PathBuf {
        let stem = sanitize_file_stem(name);
        let stem = if stem.is_empty() {
            DEFAULT_RESULT_NAME.to_string()
        } else {
            stem
        };
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.output_dir.join(format!("{stem}_{timestamp}.log"))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.output_dir.display())
        })?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write results to {}", path.display()))
    }
}

impl ResultSink for FileSink {
    fn publish(&mut self, query: &TestQueryConfig, results: &[TestResult]) -> Result<()> {
        let formatted = self.formatter.format(&query.query, results)?;
        let path = self.output_path(&query.name);

        match self.write_file(&path, &formatted) {
            Ok(()) => {
                info!(path = %path.display(), format = %self.format, "Results written");
                self.written.push(path);
            }
            Err(e) => error!("{:#}", e),
        }

        if self.echo {
            println!("{formatted}");
        }
        Ok(())
    }
}
