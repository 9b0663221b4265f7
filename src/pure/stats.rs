// Statistics Reducer - pure functions turning raw trial samples into a summary
// No I/O, no logging: everything here is deterministic over its inputs

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Below this many timings both percentiles are reported as 0.0
pub const MIN_PERCENTILE_SAMPLES: usize = 5;

/// Number of equal-probability groups the timings are cut into
pub const QUANTILE_GROUPS: usize = 100;

/// Statistical summary of one (query, hint) trial
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub stdev: f64,
    pub percentile_95: f64,
    pub percentile_99: f64,
    pub avg_docs_examined: f64,
    pub avg_keys_examined: f64,
    pub avg_docs_returned: f64,
}

/// Reduce timing and plan samples into a [`TimingSummary`].
///
/// `times` holds one elapsed duration in seconds per timed iteration and
/// must be non-empty. `docs_examined` and `keys_examined` only hold the
/// explain-sampled iterations and may be empty, in which case their averages
/// are 0.0.
pub fn reduce(
    times: &[f64],
    docs_examined: &[i64],
    keys_examined: &[i64],
    docs_returned: &[u64],
) -> Result<TimingSummary> {
    ensure!(
        !times.is_empty(),
        "cannot reduce an empty timing sample set"
    );
    ensure!(
        times.iter().all(|t| t.is_finite()),
        "timing samples must be finite"
    );

    let mut sorted = times.to_vec();
    sorted.sort_by(f64::total_cmp);

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];

    Ok(TimingSummary {
        // Rounding in the final division can step one ulp outside the data
        avg: mean(&sorted).clamp(min, max),
        min,
        max,
        stdev: sample_std_dev(&sorted),
        percentile_95: percentile(&sorted, 95),
        percentile_99: percentile(&sorted, 99),
        avg_docs_examined: mean_of_counts(docs_examined.iter().map(|&d| d as f64)),
        avg_keys_examined: mean_of_counts(keys_examined.iter().map(|&k| k as f64)),
        avg_docs_returned: mean_of_counts(docs_returned.iter().map(|&r| r as f64)),
    })
}

/// Neumaier-compensated sum, correctly rounded for the sample sizes we see
pub fn compensated_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;

    for value in values {
        let t = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;
    }

    sum + compensation
}

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    compensated_sum(values.iter().copied()) / values.len() as f64
}

fn mean_of_counts(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let len = values.len();
    if len == 0 {
        return 0.0;
    }
    compensated_sum(values) / len as f64
}

/// Sample standard deviation (n - 1 denominator), 0.0 with fewer than two values
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let avg = mean(values);
    let squared = compensated_sum(values.iter().map(|v| {
        let diff = v - avg;
        diff * diff
    }));

    (squared / (values.len() - 1) as f64).sqrt()
}

/// The `cut`-th of `groups - 1` exclusive-method cut points over sorted data.
///
/// Rescales with exact integer arithmetic (`m = n + 1`) and interpolates
/// linearly between the two neighbouring order statistics. Near the tails of
/// small samples the interpolation extends past the observed data.
///
/// Requires `sorted.len() >= 2` and `1 <= cut < groups`.
pub fn exclusive_cut_point(sorted: &[f64], groups: usize, cut: usize) -> f64 {
    debug_assert!(sorted.len() >= 2);
    debug_assert!(cut >= 1 && cut < groups);

    let len = sorted.len() as i64;
    let groups = groups as i64;
    let scaled = cut as i64 * (len + 1);

    let j = (scaled / groups).clamp(1, len - 1);
    let delta = scaled - j * groups;
    let j = j as usize;

    (sorted[j - 1] * (groups - delta) as f64 + sorted[j] * delta as f64) / groups as f64
}

/// The `p`-th percentile of sorted timings.
///
/// Returns 0.0 below [`MIN_PERCENTILE_SAMPLES`] values. Otherwise the
/// exclusive cut point, bounded to the observed `[min, max]`.
pub fn percentile(sorted: &[f64], p: usize) -> f64 {
    if sorted.len() < MIN_PERCENTILE_SAMPLES || p == 0 || p >= QUANTILE_GROUPS {
        return 0.0;
    }

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    exclusive_cut_point(sorted, QUANTILE_GROUPS, p).clamp(min, max)
}
