// Result Model
// Record types shared by the harness, orchestrator and sinks. Constructors enforce
// the invariants so an invalid hint or a half-populated result cannot exist.

use crate::pure::canonical::{canonical_document, canonical_filter, canonical_pairs};
use crate::pure::stats::TimingSummary;
use crate::validation::{index_direction, ConfigError};
use anyhow::{bail, Result};
use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A find-style query as loaded from the test configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub filter: Document,
    #[serde(default)]
    pub project: Option<Document>,
    #[serde(default)]
    pub sort: Option<Document>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl QuerySpec {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            project: None,
            sort: None,
            skip: None,
            limit: None,
        }
    }

    pub fn with_project(mut self, project: Document) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The query as a single document, omitting absent parts
    pub fn to_document(&self) -> Document {
        let mut doc = doc! { "filter": self.filter.clone() };
        if let Some(project) = &self.project {
            doc.insert("project", project.clone());
        }
        if let Some(sort) = &self.sort {
            doc.insert("sort", sort.clone());
        }
        if let Some(skip) = self.skip {
            doc.insert("skip", skip);
        }
        if let Some(limit) = self.limit {
            doc.insert("limit", limit);
        }
        doc
    }

    /// Structural key used to recognise the same query written twice.
    ///
    /// Only the top-level filter predicates are order-insensitive; sort,
    /// projection and embedded documents keep their configured order.
    pub fn canonical_key(&self) -> String {
        let mut key = format!("filter:{}", canonical_filter(&self.filter));
        if let Some(project) = &self.project {
            key.push_str(&format!("|project:{}", canonical_document(project)));
        }
        if let Some(sort) = &self.sort {
            key.push_str(&format!("|sort:{}", canonical_document(sort)));
        }
        if let Some(skip) = self.skip {
            key.push_str(&format!("|skip:{skip}"));
        }
        if let Some(limit) = self.limit {
            key.push_str(&format!("|limit:{limit}"));
        }
        key
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

/// An index hint: ordered `(field, direction)` pairs, or empty for "no hint".
///
/// Key order is preserved for the hint directive sent to the server, but
/// equality and hashing only look at the set of pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Document", into = "Document")]
pub struct IndexHint {
    keys: Vec<(String, i32)>,
}

impl IndexHint {
    /// No hint: the planner picks the index
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from pairs, validating each direction
    pub fn from_pairs<K: Into<String>>(
        pairs: impl IntoIterator<Item = (K, i32)>,
    ) -> Result<Self, ConfigError> {
        let mut keys = Vec::new();
        for (field, direction) in pairs {
            let field = field.into();
            let direction = index_direction(&field, &Bson::Int32(direction))?;
            keys.push((field, direction));
        }
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[(String, i32)] {
        &self.keys
    }

    /// The hint directive, in configured key order
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for (field, direction) in &self.keys {
            doc.insert(field.clone(), *direction);
        }
        doc
    }

    /// Order-insensitive key over the (field, direction) pairs
    pub fn canonical_key(&self) -> String {
        canonical_pairs(self.keys.iter().map(|(k, d)| (k.as_str(), *d)))
    }
}

impl TryFrom<Document> for IndexHint {
    type Error = ConfigError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        let mut keys = Vec::with_capacity(doc.len());
        for (field, value) in doc {
            let direction = index_direction(&field, &value)?;
            keys.push((field, direction));
        }
        Ok(Self { keys })
    }
}

impl From<IndexHint> for Document {
    fn from(hint: IndexHint) -> Self {
        hint.to_document()
    }
}

impl PartialEq for IndexHint {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl Eq for IndexHint {}

impl Hash for IndexHint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

impl fmt::Display for IndexHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

/// Database and collection a query runs against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// One entry of the test configuration file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestQueryConfig {
    pub name: String,
    pub query: QuerySpec,
    pub hints: Vec<IndexHint>,
    pub database: String,
    pub collection: String,
}

impl TestQueryConfig {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.database, &self.collection)
    }

    /// Key under which a query counts as already tested: the query plus its hint list
    pub fn canonical_key(&self) -> String {
        let hints = self
            .hints
            .iter()
            .map(IndexHint::canonical_key)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}|[{}]", self.query.canonical_key(), hints)
    }
}

/// The composed query of a single trial.
///
/// Built once per (query, hint) pair so the counted executions and the
/// explain calls measure exactly the same thing.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub namespace: Namespace,
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub hint: Option<Document>,
}

impl FindQuery {
    /// Apply the query-builder rule: projection when present, sort/skip/limit only
    /// when present and non-empty/non-zero, hint only when non-empty
    pub fn compose(namespace: Namespace, query: &QuerySpec, hint: &IndexHint) -> Self {
        Self {
            namespace,
            filter: query.filter.clone(),
            projection: query.project.clone(),
            sort: query.sort.clone().filter(|s| !s.is_empty()),
            skip: query
                .skip
                .filter(|&s| s != 0)
                .and_then(|s| u64::try_from(s).ok()),
            limit: query.limit.filter(|&l| l != 0),
            hint: (!hint.is_empty()).then(|| hint.to_document()),
        }
    }

    /// The equivalent `find` command body, used for explain
    pub fn to_find_command(&self) -> Document {
        let mut command = doc! {
            "find": self.namespace.collection.clone(),
            "filter": self.filter.clone(),
        };
        if let Some(projection) = &self.projection {
            command.insert("projection", projection.clone());
        }
        if let Some(sort) = &self.sort {
            command.insert("sort", sort.clone());
        }
        if let Some(skip) = self.skip {
            command.insert("skip", skip as i64);
        }
        if let Some(limit) = self.limit {
            command.insert("limit", limit);
        }
        if let Some(hint) = &self.hint {
            command.insert("hint", hint.clone());
        }
        command
    }
}

/// Server version as a dotted integer tuple, compared lexicographically
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion(Vec<u32>);

impl ServerVersion {
    pub fn new(parts: impl Into<Vec<u32>>) -> Self {
        Self(parts.into())
    }

    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    /// `self >= (major, minor)` with tuple semantics
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        self.0.as_slice() >= [major, minor].as_slice()
    }
}

impl FromStr for ServerVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = Vec::new();
        for component in s.trim().split('.') {
            let digits: String = component.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                // "4.4.0-rc1" keeps 4.4.0; a leading non-number is unusable
                if parts.is_empty() {
                    bail!("Unparseable server version: {s:?}");
                }
                break;
            }
            parts.push(digits.parse::<u32>()?);
            if digits.len() != component.len() {
                break;
            }
        }
        Ok(Self(parts))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&joined)
    }
}

/// Iteration counts for one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSettings {
    pub iterations: u32,
    pub warmup_iterations: u32,
    /// Explain every N-th timed iteration (and the last); 0 disables sampling
    pub sample_interval: u32,
}

impl TrialSettings {
    /// Whether iteration `i` (0-indexed) is followed by an explain sample
    pub fn samples_iteration(&self, i: u32) -> bool {
        self.sample_interval > 0
            && (i % self.sample_interval == 0 || i + 1 == self.iterations)
    }
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            iterations: 1000,
            warmup_iterations: 10,
            sample_interval: 1,
        }
    }
}

/// Reduced summary of one (query, hint) trial.
///
/// Either every numeric field is populated and `error` is `None`, or `error`
/// holds a message and every timing and plan field is zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub query: QuerySpec,
    pub hint: IndexHint,
    pub iteration_count: u32,
    pub warmup_iteration_count: u32,
    pub sample_interval: u32,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
    pub stdev_time: f64,
    pub percentile_95: f64,
    pub percentile_99: f64,
    pub avg_docs_examined: f64,
    pub avg_keys_examined: f64,
    pub avg_docs_returned: f64,
    pub error: Option<String>,
}

impl TestResult {
    pub fn from_summary(
        query: &QuerySpec,
        hint: &IndexHint,
        settings: TrialSettings,
        summary: TimingSummary,
    ) -> Self {
        Self {
            query: query.clone(),
            hint: hint.clone(),
            iteration_count: settings.iterations,
            warmup_iteration_count: settings.warmup_iterations,
            sample_interval: settings.sample_interval,
            avg_time: summary.avg,
            min_time: summary.min,
            max_time: summary.max,
            stdev_time: summary.stdev,
            percentile_95: summary.percentile_95,
            percentile_99: summary.percentile_99,
            avg_docs_examined: summary.avg_docs_examined,
            avg_keys_examined: summary.avg_keys_examined,
            avg_docs_returned: summary.avg_docs_returned,
            error: None,
        }
    }

    pub fn failed(
        query: &QuerySpec,
        hint: &IndexHint,
        settings: TrialSettings,
        error: impl Into<String>,
    ) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        let mut result = Self::from_summary(query, hint, settings, TimingSummary::default());
        result.error = Some(error);
        result
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
