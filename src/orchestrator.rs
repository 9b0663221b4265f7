// Orchestrator
// Connect-with-retry around the whole test matrix, then for every distinct query
// and every distinct hint run one harness trial and publish the survivors.

use crate::contracts::{Connector, QueryBackend, ResultSink, Sleeper, TokioSleeper};
use crate::harness::Harness;
use crate::observability::{log_error_with_context, OperationContext};
use crate::pure::backoff::{backoff_delay, has_retry_left};
use crate::types::{TestQueryConfig, TrialSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Fatal orchestration failures
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Exceeded maximum retries ({attempts} connection attempts): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("max_retries must be at least 1")]
    NoAttempts,
}

/// Connection retry settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Backoff after failed attempt `k` is `retry_delay_base ^ k` seconds
    pub retry_delay_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_base: 2.0,
        }
    }
}

/// What a run did, for the final log line and for callers that care
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub connection_attempts: u32,
    pub queries_tested: usize,
    pub duplicate_queries: usize,
    pub trials_succeeded: usize,
    pub trials_failed: usize,
    pub duplicate_hints: usize,
}

pub struct Orchestrator<C, K, Z = TokioSleeper> {
    connector: C,
    sink: K,
    sleeper: Z,
    retry: RetryPolicy,
    settings: TrialSettings,
}

impl<C: Connector, K: ResultSink> Orchestrator<C, K, TokioSleeper> {
    pub fn new(connector: C, sink: K, settings: TrialSettings, retry: RetryPolicy) -> Self {
        Self {
            connector,
            sink,
            sleeper: TokioSleeper,
            retry,
            settings,
        }
    }
}

impl<C: Connector, K: ResultSink, Z: Sleeper> Orchestrator<C, K, Z> {
    /// Replace the backoff sleeper
    pub fn with_sleeper<S: Sleeper>(self, sleeper: S) -> Orchestrator<C, K, S> {
        Orchestrator {
            connector: self.connector,
            sink: self.sink,
            sleeper,
            retry: self.retry,
            settings: self.settings,
        }
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Connect (retrying with exponential backoff) and test every query.
    ///
    /// Per-hint failures are logged and dropped; only running out of
    /// connection attempts is an error.
    pub async fn run(
        &mut self,
        ctx: &OperationContext,
        queries: &[TestQueryConfig],
    ) -> Result<RunSummary, OrchestratorError> {
        let max_retries = self.retry.max_retries;
        if max_retries == 0 {
            return Err(OrchestratorError::NoAttempts);
        }

        let mut summary = RunSummary::default();
        let mut last_error = String::new();

        for attempt in 0..max_retries {
            summary.connection_attempts += 1;

            match self.connector.connect().await {
                Ok(backend) => {
                    info!(trace_id = %ctx.trace_id, "Connected on attempt {}", attempt + 1);
                    self.run_matrix(ctx, &backend, queries, &mut summary).await;

                    if let Err(e) = backend.close().await {
                        warn!(trace_id = %ctx.trace_id, "Failed to close connection cleanly: {:#}", e);
                    }
                    info!(trace_id = %ctx.trace_id, summary = ?summary, "Test matrix complete");
                    return Ok(summary);
                }
                Err(e) => {
                    last_error = format!("{e:#}");

                    if has_retry_left(attempt, max_retries) {
                        let delay = backoff_delay(self.retry.retry_delay_base, attempt);
                        warn!(
                            trace_id = %ctx.trace_id,
                            error = %last_error,
                            "Connection failed, retrying in {:?} ({}/{})...",
                            delay,
                            attempt + 1,
                            max_retries
                        );
                        self.sleeper.sleep(delay).await;
                    } else {
                        error!(trace_id = %ctx.trace_id, error = %last_error, "Exceeded maximum retries");
                    }
                }
            }
        }

        Err(OrchestratorError::RetriesExhausted {
            attempts: max_retries,
            last_error,
        })
    }

    async fn run_matrix(
        &mut self,
        ctx: &OperationContext,
        backend: &C::Backend,
        queries: &[TestQueryConfig],
        summary: &mut RunSummary,
    ) {
        let harness = Harness::new(backend);
        let mut tested_queries: HashSet<String> = HashSet::new();

        for query in queries {
            let query_key = query.canonical_key();
            if tested_queries.contains(&query_key) {
                debug!(trace_id = %ctx.trace_id, name = %query.name, "Skipping duplicate query");
                summary.duplicate_queries += 1;
                continue;
            }

            info!(trace_id = %ctx.trace_id, name = %query.name, "Testing query {}", query.query);

            let mut results = Vec::new();
            let mut tested_hints: HashSet<String> = HashSet::new();

            for hint in &query.hints {
                let hint_key = hint.canonical_key();
                if tested_hints.contains(&hint_key) {
                    debug!(trace_id = %ctx.trace_id, hint = %hint, "Skipping duplicate hint");
                    summary.duplicate_hints += 1;
                    continue;
                }

                info!(trace_id = %ctx.trace_id, "Testing query with hint {}", hint);
                let trial_ctx = ctx
                    .child("trial")
                    .with_attribute("name", query.name.clone())
                    .with_attribute("namespace", query.namespace().to_string())
                    .with_attribute("query", query.query.to_string())
                    .with_attribute("hint", hint.to_string());

                let result = harness
                    .run(
                        &trial_ctx,
                        &query.database,
                        &query.collection,
                        &query.query,
                        hint,
                        self.settings,
                    )
                    .await;

                match &result.error {
                    None => {
                        results.push(result);
                        tested_hints.insert(hint_key);
                        summary.trials_succeeded += 1;
                    }
                    Some(message) => {
                        error!(
                            trace_id = %trial_ctx.trace_id,
                            query = %query.query,
                            hint = %hint,
                            "Error during performance test: {}", message
                        );
                        summary.trials_failed += 1;
                    }
                }
            }

            if let Err(e) = self.sink.publish(query, &results) {
                let sink_ctx = ctx.child("publish").with_attribute("name", query.name.clone());
                log_error_with_context(&e, &sink_ctx);
            }

            tested_queries.insert(query_key);
            summary.queries_tested += 1;
        }
    }
}
