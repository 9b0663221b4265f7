// Contract-First Design
// The capabilities the measurement core is written against. The harness and
// orchestrator never see a concrete driver type, only these traits.

use crate::types::{FindQuery, ServerVersion, TestQueryConfig, TestResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use std::time::Duration;

/// Query execution capability of a connected database
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Execute a find and materialize every returned document
    ///
    /// # Postconditions
    /// - The cursor is fully drained before returning
    /// - Projection, sort, skip, limit and hint of `query` are all applied
    async fn execute_find(&self, query: &FindQuery) -> Result<Vec<Document>>;

    /// Explain `query` with `executionStats` verbosity
    ///
    /// # Postconditions
    /// - The returned document carries an `executionStats` sub-document when
    ///   the server produced one
    async fn explain(&self, query: &FindQuery) -> Result<Document>;

    /// Run a command against `database`
    async fn run_command(&self, database: &str, command: Document) -> Result<Document>;

    /// Run a command against the `admin` database
    async fn admin_command(&self, command: Document) -> Result<Document> {
        self.run_command("admin", command).await
    }

    /// The server's reported version, from `buildInfo`
    async fn server_version(&self) -> Result<ServerVersion> {
        let info = self.admin_command(doc! { "buildInfo": 1 }).await?;
        let version = info
            .get_str("version")
            .context("buildInfo response has no version string")?;
        version.parse()
    }

    /// Release the connection; the backend must not be used afterwards
    async fn close(self) -> Result<()>;
}

/// Acquires a connected [`QueryBackend`]
#[async_trait]
pub trait Connector: Send + Sync {
    type Backend: QueryBackend;

    /// Establish a connection
    ///
    /// # Postconditions
    /// - On `Ok`, the server has been reached at least once
    /// - Any `Err` is treated as a connection failure and may be retried
    async fn connect(&self) -> Result<Self::Backend>;
}

/// Consumer of the successful results of one configured query
pub trait ResultSink: Send {
    /// Render and persist the results of `query`; `results` may be empty
    fn publish(&mut self, query: &TestQueryConfig, results: &[TestResult]) -> Result<()>;
}

/// Blocking point of the retry loop, injectable so backoff can be observed
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Pull `executionStats.totalDocsExamined` / `totalKeysExamined` out of an explain.
///
/// Missing fields count as zero.
pub fn execution_stats(explain: &Document) -> (i64, i64) {
    let Ok(stats) = explain.get_document("executionStats") else {
        return (0, 0);
    };

    let count = |field: &str| -> i64 {
        match stats.get(field) {
            Some(mongodb::bson::Bson::Int32(n)) => i64::from(*n),
            Some(mongodb::bson::Bson::Int64(n)) => *n,
            Some(mongodb::bson::Bson::Double(d)) => *d as i64,
            _ => 0,
        }
    };

    (count("totalDocsExamined"), count("totalKeysExamined"))
}
