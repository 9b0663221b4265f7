// Measurement Protocol
// cache clear -> warm-up -> timed iterations with periodic explain -> reduction,
// for a single (query, hint) pair against any QueryBackend.

use crate::contracts::{execution_stats, QueryBackend};
use crate::observability::{log_error_with_context, OperationContext, PerfTimer};
use crate::plan_cache::{clear_plan_cache, PlanCacheClear};
use crate::pure::stats::{reduce, TimingSummary};
use crate::types::{FindQuery, IndexHint, Namespace, QuerySpec, TestResult, TrialSettings};
use anyhow::{ensure, Context, Result};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Raw per-trial measurements, reduced once the timed phase completes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    /// Elapsed seconds, one per timed iteration
    pub times: Vec<f64>,
    /// Documents returned, one per timed iteration
    pub docs_returned: Vec<u64>,
    /// `totalDocsExamined`, sampled iterations only
    pub docs_examined: Vec<i64>,
    /// `totalKeysExamined`, sampled iterations only
    pub keys_examined: Vec<i64>,
}

impl SampleSet {
    pub fn with_capacity(iterations: usize) -> Self {
        Self {
            times: Vec::with_capacity(iterations),
            docs_returned: Vec::with_capacity(iterations),
            docs_examined: Vec::new(),
            keys_examined: Vec::new(),
        }
    }

    pub fn record_execution(&mut self, elapsed_secs: f64, returned: u64) {
        self.times.push(elapsed_secs);
        self.docs_returned.push(returned);
    }

    pub fn record_plan(&mut self, docs_examined: i64, keys_examined: i64) {
        self.docs_examined.push(docs_examined);
        self.keys_examined.push(keys_examined);
    }

    pub fn reduce(&self) -> Result<TimingSummary> {
        reduce(
            &self.times,
            &self.docs_examined,
            &self.keys_examined,
            &self.docs_returned,
        )
    }
}

/// Runs trials against a borrowed backend
pub struct Harness<'a, B: QueryBackend> {
    backend: &'a B,
}

impl<'a, B: QueryBackend> Harness<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Measure `query` under `hint`.
    ///
    /// Never fails: any execution error ends the trial early and is reported
    /// through [`TestResult::error`] with every numeric field zeroed.
    pub async fn run(
        &self,
        ctx: &OperationContext,
        database: &str,
        collection: &str,
        query: &QuerySpec,
        hint: &IndexHint,
        settings: TrialSettings,
    ) -> TestResult {
        let namespace = Namespace::new(database, collection);

        match self.measure(ctx, namespace, query, hint, settings).await {
            Ok(summary) => TestResult::from_summary(query, hint, settings, summary),
            Err(e) => {
                log_error_with_context(&e, ctx);
                TestResult::failed(query, hint, settings, format!("{e:#}"))
            }
        }
    }

    async fn measure(
        &self,
        ctx: &OperationContext,
        namespace: Namespace,
        query: &QuerySpec,
        hint: &IndexHint,
        settings: TrialSettings,
    ) -> Result<TimingSummary> {
        ensure!(
            settings.iterations > 0,
            "at least one timed iteration is required"
        );

        self.reset_plan_cache(ctx, &namespace).await;

        let find = FindQuery::compose(namespace, query, hint);
        self.warm_up(ctx, &find, settings.warmup_iterations)
            .await
            .context("warm-up failed")?;

        let samples = self.timed_phase(ctx, &find, settings).await?;

        info!(trace_id = %ctx.trace_id, "Calculating results");
        samples.reduce()
    }

    /// Clear the plan cache of `namespace`; failures only degrade result quality
    pub async fn reset_plan_cache(
        &self,
        ctx: &OperationContext,
        namespace: &Namespace,
    ) -> Option<PlanCacheClear> {
        info!(trace_id = %ctx.trace_id, "Clearing plan cache for {}", namespace);

        match clear_plan_cache(self.backend, namespace).await {
            Ok(directive) => {
                debug!(trace_id = %ctx.trace_id, directive = ?directive, "Plan cache cleared");
                Some(directive)
            }
            Err(e) => {
                warn!(
                    trace_id = %ctx.trace_id,
                    namespace = %namespace,
                    "Failed to clear plan cache: {:#}", e
                );
                None
            }
        }
    }

    async fn warm_up(&self, ctx: &OperationContext, find: &FindQuery, iterations: u32) -> Result<()> {
        info!(trace_id = %ctx.trace_id, "Warming up ({} iterations)", iterations);
        let _timer = PerfTimer::new(ctx, "warmup");

        let step = (iterations / 5).max(1);
        for i in 0..iterations {
            if (i + 1) % step == 0 {
                debug!(trace_id = %ctx.trace_id, "Warmup progress: {}/{}", i + 1, iterations);
            }
            self.backend.execute_find(find).await?;
        }
        Ok(())
    }

    async fn timed_phase(
        &self,
        ctx: &OperationContext,
        find: &FindQuery,
        settings: TrialSettings,
    ) -> Result<SampleSet> {
        info!(trace_id = %ctx.trace_id, "Testing query ({} iterations)", settings.iterations);
        let _timer = PerfTimer::new(ctx, "timed_phase");

        let mut samples = SampleSet::with_capacity(settings.iterations as usize);

        for i in 0..settings.iterations {
            let start = Instant::now();
            let documents = self
                .backend
                .execute_find(find)
                .await
                .with_context(|| format!("iteration {} of {} failed", i + 1, settings.iterations))?;
            let returned = documents.len() as u64;
            let elapsed = start.elapsed();
            drop(documents);

            samples.record_execution(elapsed.as_secs_f64(), returned);

            if settings.samples_iteration(i) {
                let explain = self
                    .backend
                    .explain(find)
                    .await
                    .with_context(|| format!("explain after iteration {} failed", i + 1))?;
                let (docs_examined, keys_examined) = execution_stats(&explain);
                samples.record_plan(docs_examined, keys_examined);
            }
        }

        Ok(samples)
    }
}
