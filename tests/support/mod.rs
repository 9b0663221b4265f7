// Test Support
// Scripted in-memory implementations of the backend, connector, sleeper and sink traits

#![allow(dead_code)]

use anyhow::{bail, Result};
use index_perf::{
    Connector, FindQuery, QueryBackend, QuerySpec, ResultSink, Sleeper, TestQueryConfig,
    TestResult, IndexHint,
};
use mongodb::bson::{doc, Document};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Behaviour and call log shared between a backend and the test that drives it
#[derive(Debug)]
pub struct BackendState {
    pub version: String,
    pub documents: Vec<Document>,
    pub explain_stats: Option<(i64, i64)>,
    /// 1-based `execute_find` call that fails, counted across the whole run
    pub fail_on_find: Option<usize>,
    /// Every find carrying this hint fails
    pub fail_hint: Option<Document>,
    pub fail_commands: bool,
    pub finds: AtomicUsize,
    pub explains: AtomicUsize,
    pub commands: Mutex<Vec<(String, Document)>>,
    pub queries: Mutex<Vec<FindQuery>>,
    pub explained: Mutex<Vec<FindQuery>>,
    pub closed: AtomicUsize,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            version: "7.0.4".to_string(),
            documents: vec![doc! { "_id": 1 }, doc! { "_id": 2 }],
            explain_stats: Some((40, 4)),
            fail_on_find: None,
            fail_hint: None,
            fail_commands: false,
            finds: AtomicUsize::new(0),
            explains: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            explained: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
        }
    }
}

impl BackendState {
    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn explain_count(&self) -> usize {
        self.explains.load(Ordering::SeqCst)
    }

    pub fn explained(&self) -> Vec<FindQuery> {
        self.explained.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<(String, Document)> {
        self.commands.lock().unwrap().clone()
    }

    /// Hints of every find issued, in order, deduplicated consecutively
    pub fn hints_run(&self) -> Vec<Option<Document>> {
        let mut hints: Vec<Option<Document>> = Vec::new();
        for query in self.queries.lock().unwrap().iter() {
            if hints.last() != Some(&query.hint) {
                hints.push(query.hint.clone());
            }
        }
        hints
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    pub state: Arc<BackendState>,
}

impl ScriptedBackend {
    pub fn new(state: BackendState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }
}

#[async_trait::async_trait]
impl QueryBackend for ScriptedBackend {
    async fn execute_find(&self, query: &FindQuery) -> Result<Vec<Document>> {
        let call = self.state.finds.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.queries.lock().unwrap().push(query.clone());

        if self.state.fail_on_find == Some(call) {
            bail!("connection reset by peer");
        }
        if self.state.fail_hint.is_some() && self.state.fail_hint == query.hint {
            bail!("hint provided does not correspond to an existing index");
        }
        Ok(self.state.documents.clone())
    }

    async fn explain(&self, query: &FindQuery) -> Result<Document> {
        self.state.explains.fetch_add(1, Ordering::SeqCst);
        self.state.explained.lock().unwrap().push(query.clone());
        Ok(match self.state.explain_stats {
            Some((docs, keys)) => doc! {
                "queryPlanner": {},
                "executionStats": { "totalDocsExamined": docs, "totalKeysExamined": keys },
            },
            None => doc! { "queryPlanner": {} },
        })
    }

    async fn run_command(&self, database: &str, command: Document) -> Result<Document> {
        if command.contains_key("buildInfo") {
            return Ok(doc! { "version": self.state.version.clone(), "ok": 1 });
        }
        self.state
            .commands
            .lock()
            .unwrap()
            .push((database.to_string(), command));
        if self.state.fail_commands {
            bail!("not authorized on admin to execute command");
        }
        Ok(doc! { "ok": 1 })
    }

    async fn close(self) -> Result<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails the first `failures` connects, then hands out the scripted backend
pub struct ScriptedConnector {
    pub state: Arc<BackendState>,
    pub failures: usize,
    pub attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(state: BackendState, failures: usize) -> Self {
        Self {
            state: Arc::new(state),
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    type Backend = ScriptedBackend;

    async fn connect(&self) -> Result<ScriptedBackend> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            bail!("No servers available (attempt {})", attempt + 1);
        }
        Ok(ScriptedBackend {
            state: Arc::clone(&self.state),
        })
    }
}

/// Records requested sleeps instead of waiting
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pub sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Keeps every published block in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub published: Arc<Mutex<Vec<(String, Vec<TestResult>)>>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(String, Vec<TestResult>)> {
        self.published.lock().unwrap().clone()
    }
}

impl ResultSink for RecordingSink {
    fn publish(&mut self, query: &TestQueryConfig, results: &[TestResult]) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((query.name.clone(), results.to_vec()));
        if self.fail {
            bail!("disk full");
        }
        Ok(())
    }
}

pub fn hint(pairs: &[(&str, i32)]) -> IndexHint {
    IndexHint::from_pairs(pairs.iter().map(|(k, d)| (k.to_string(), *d))).unwrap()
}

pub fn test_query(name: &str, filter: Document, hints: Vec<IndexHint>) -> TestQueryConfig {
    TestQueryConfig {
        name: name.to_string(),
        query: QuerySpec::new(filter),
        hints,
        database: "shop".to_string(),
        collection: "orders".to_string(),
    }
}
