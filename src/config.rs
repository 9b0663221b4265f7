// Configuration
// Harness settings (TOML + INDEX_PERF_* environment) and the JSON test query file.

use crate::formatters::OutputFormat;
use crate::orchestrator::RetryPolicy;
use crate::types::{IndexHint, QuerySpec, TestQueryConfig, TrialSettings};
use crate::validation::{require_non_empty, rewrite_object_ids, ConfigError};
use mongodb::bson::{self, Bson};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "INDEX_PERF_";
pub const DEFAULT_CONNECTION: &str = "mongodb://localhost:27017";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub connection: ConnectionConfig,
    pub trial: TrialConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub uri: String,
    pub max_retries: u32,
    pub retry_delay_base: f64,
    #[serde(with = "duration_string")]
    pub server_selection_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrialConfig {
    pub iterations: u32,
    pub warmup_iterations: u32,
    pub sample_interval: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub directory: PathBuf,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            uri: DEFAULT_CONNECTION.to_string(),
            max_retries: retry.max_retries,
            retry_delay_base: retry.retry_delay_base,
            server_selection_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for TrialConfig {
    fn default() -> Self {
        let trial = TrialSettings::default();
        Self {
            iterations: trial.iterations,
            warmup_iterations: trial.warmup_iterations,
            sample_interval: trial.sample_interval,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Table,
            directory: PathBuf::from("."),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File (or defaults), then `INDEX_PERF_*` environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                info!("Loading settings from {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `INDEX_PERF_<FIELD>` values supplied by `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| (key, v))
        };

        if let Some((_, uri)) = var("CONNECTION") {
            self.connection.uri = uri;
        }
        if let Some((key, v)) = var("MAX_RETRIES") {
            self.connection.max_retries = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = var("RETRY_DELAY_BASE") {
            self.connection.retry_delay_base = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = var("ITERATIONS") {
            self.trial.iterations = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = var("WARMUP") {
            self.trial.warmup_iterations = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = var("SAMPLE_INTERVAL") {
            self.trial.sample_interval = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = var("OUTPUT_FORMAT") {
            self.output.format = v
                .parse()
                .map_err(|e: anyhow::Error| ConfigError::invalid(key, e.to_string()))?;
        }
        if let Some((_, dir)) = var("OUTPUT_DIR") {
            self.output.directory = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.uri.trim().is_empty() {
            return Err(ConfigError::invalid("connection", "must not be empty"));
        }
        if self.trial.iterations == 0 {
            return Err(ConfigError::invalid("iterations", "must be at least 1"));
        }
        if self.connection.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "must be at least 1"));
        }
        let base = self.connection.retry_delay_base;
        if !base.is_finite() || base < 0.0 {
            return Err(ConfigError::invalid(
                "retry_delay_base",
                format!("must be a non-negative number, got {base}"),
            ));
        }
        Ok(())
    }

    pub fn trial_settings(&self) -> TrialSettings {
        TrialSettings {
            iterations: self.trial.iterations,
            warmup_iterations: self.trial.warmup_iterations,
            sample_interval: self.trial.sample_interval,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.connection.max_retries,
            retry_delay_base: self.connection.retry_delay_base,
        }
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("{value:?}: {e}")))
}

// Entry as written in the file; every field is checked before it becomes a TestQueryConfig
#[derive(Debug, Deserialize)]
struct RawTestQuery {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    query: Option<serde_json::Value>,
    #[serde(default)]
    hints: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    collection: Option<String>,
}

/// Read and validate the JSON test query file
pub fn load_test_queries(path: impl AsRef<Path>) -> Result<Vec<TestQueryConfig>, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let queries = parse_test_queries(&content, path)?;
    info!("Loaded {} test queries from {}", queries.len(), path.display());
    Ok(queries)
}

/// Parse test query JSON; `path` is only used in error messages
pub fn parse_test_queries(
    content: &str,
    path: &Path,
) -> Result<Vec<TestQueryConfig>, ConfigError> {
    let entries: Vec<RawTestQuery> =
        serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    entries
        .into_iter()
        .enumerate()
        .map(|(index, raw)| build_test_query(index, raw))
        .collect()
}

fn build_test_query(index: usize, raw: RawTestQuery) -> Result<TestQueryConfig, ConfigError> {
    let name = raw.name.unwrap_or_default();
    let database = require_non_empty(raw.database, index, &name, "database")?;
    let collection = require_non_empty(raw.collection, index, &name, "collection")?;

    let query_value = raw.query.ok_or_else(|| ConfigError::MissingField {
        index,
        name: name.clone(),
        field: "query",
    })?;
    let query = parse_query(index, query_value)?;

    let hints = raw
        .hints
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, value)| parse_hint(index, position, value))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        index,
        name = %name,
        hints = hints.len(),
        "Parsed test query for {}.{}",
        database,
        collection
    );

    Ok(TestQueryConfig {
        name,
        query,
        hints,
        database,
        collection,
    })
}

/// JSON (relaxed or extended) to BSON, with `ObjectId("..")` strings rewritten
fn to_bson(field: &str, value: serde_json::Value) -> Result<Bson, ConfigError> {
    let bson = Bson::try_from(value).map_err(|e| ConfigError::invalid(field, e.to_string()))?;
    rewrite_object_ids(bson)
}

fn parse_query(index: usize, value: serde_json::Value) -> Result<QuerySpec, ConfigError> {
    let field = format!("queries[{index}].query");
    let bson = to_bson(&field, value)?;
    if !matches!(bson, Bson::Document(_)) {
        return Err(ConfigError::invalid(field, "must be an object"));
    }

    let query: QuerySpec =
        bson::from_bson(bson).map_err(|e| ConfigError::invalid(field.as_str(), e.to_string()))?;

    if let Some(skip) = query.skip {
        if skip < 0 {
            return Err(ConfigError::invalid(
                format!("{field}.skip"),
                format!("must not be negative, got {skip}"),
            ));
        }
    }
    Ok(query)
}

fn parse_hint(
    index: usize,
    position: usize,
    value: serde_json::Value,
) -> Result<IndexHint, ConfigError> {
    let field = format!("queries[{index}].hints[{position}]");
    match to_bson(&field, value)? {
        Bson::Document(doc) => IndexHint::try_from(doc),
        other => Err(ConfigError::invalid(
            field,
            format!("must be an object, got {other}"),
        )),
    }
}

// "30s" style durations
mod duration_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.trim().strip_suffix('s') {
            Some(secs) => secs
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom),
            None => Err(serde::de::Error::custom(
                "Expected duration string ending with 's'",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.connection.uri, "mongodb://localhost:27017");
        assert_eq!(config.trial_settings(), TrialSettings::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.output.format, OutputFormat::Table);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HarnessConfig::default();
        config
            .apply_env_overrides(lookup(&[
                ("INDEX_PERF_CONNECTION", "mongodb://db:27017"),
                ("INDEX_PERF_ITERATIONS", "50"),
                ("INDEX_PERF_OUTPUT_FORMAT", "csv"),
                ("INDEX_PERF_RETRY_DELAY_BASE", "1.5"),
                ("INDEX_PERF_WARMUP", "  "),
            ]))
            .unwrap();

        assert_eq!(config.connection.uri, "mongodb://db:27017");
        assert_eq!(config.trial.iterations, 50);
        assert_eq!(config.trial.warmup_iterations, 10);
        assert_eq!(config.output.format, OutputFormat::Csv);
        assert_eq!(config.connection.retry_delay_base, 1.5);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = HarnessConfig::default();
        let err = config
            .apply_env_overrides(lookup(&[("INDEX_PERF_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("INDEX_PERF_MAX_RETRIES"));
    }

    #[test]
    fn test_validate_rejects_zero_iterations_and_retries() {
        let mut config = HarnessConfig::default();
        config.trial.iterations = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.connection.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.connection.retry_delay_base = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: HarnessConfig = toml::from_str(
            r#"
            [trial]
            iterations = 200

            [connection]
            server_selection_timeout = "5s"
            "#,
        )
        .unwrap();

        assert_eq!(config.trial.iterations, 200);
        assert_eq!(config.trial.warmup_iterations, 10);
        assert_eq!(config.connection.server_selection_timeout, Duration::from_secs(5));
        assert_eq!(config.connection.uri, DEFAULT_CONNECTION);
    }

    #[test]
    fn test_parse_minimal_entry() {
        let queries = parse_test_queries(
            r#"[{"query": {"filter": {"status": "A"}}, "database": "shop", "collection": "orders"}]"#,
            Path::new("inline.json"),
        )
        .unwrap();

        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].name, "");
        assert!(queries[0].hints.is_empty());
        assert_eq!(queries[0].query.filter, doc! { "status": "A" });
    }

    #[test]
    fn test_parse_rewrites_object_ids_and_extended_json() {
        let queries = parse_test_queries(
            r#"[{
                "name": "by owner",
                "query": {"filter": {
                    "owner": "ObjectId(\"5f1d7f3e9d3b2c1a2b3c4d5e\")",
                    "team": {"$oid": "5f1d7f3e9d3b2c1a2b3c4d5f"}
                }},
                "hints": [{"owner": 1}],
                "database": "shop",
                "collection": "orders"
            }]"#,
            Path::new("inline.json"),
        )
        .unwrap();

        let filter = &queries[0].query.filter;
        assert!(matches!(filter.get("owner"), Some(Bson::ObjectId(_))));
        assert!(matches!(filter.get("team"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn test_parse_rejects_negative_skip() {
        let err = parse_test_queries(
            r#"[{"query": {"filter": {}, "skip": -1}, "database": "shop", "collection": "orders"}]"#,
            Path::new("inline.json"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInput { .. }));
    }
}
