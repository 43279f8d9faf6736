use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::insights::{DurationSample, StepStatistics};
use crate::model::StepState;

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[allow(clippy::cast_precision_loss)]
fn calculate_rate(count: usize, total: usize) -> f64 {
    if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Calculate P50, P95, P99 percentiles from a list of values
/// Returns (p50, p95, p99). If insufficient data, returns same value for all.
fn calculate_percentiles(values: &[f64]) -> (f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| cmp_f64(*a, *b));

    let len = sorted.len();

    if len == 1 {
        let val = sorted[0];
        return (val, val, val);
    }

    let p50_idx = (len / 2).min(len - 1);
    let p95_idx = (len * 95 / 100).min(len - 1);
    let p99_idx = (len * 99 / 100).min(len - 1);

    (sorted[p50_idx], sorted[p95_idx], sorted[p99_idx])
}

/// Aggregates duration samples into per-step statistics.
///
/// Steps are reported in the order their first sample arrived, so the most
/// recently executed step key comes first. Flakiness is the share of
/// executions that were retried; failures count `failed` and `timed_out`.
pub fn calculate_step_statistics(samples: &[DurationSample]) -> Vec<StepStatistics> {
    let grouped: IndexMap<&str, Vec<&DurationSample>> =
        samples.iter().fold(IndexMap::new(), |mut grouped, sample| {
            grouped
                .entry(sample.step_key.as_str())
                .or_default()
                .push(sample);
            grouped
        });

    grouped
        .into_iter()
        .map(|(key, samples)| summarize(key, &samples))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn summarize(step_key: &str, samples: &[&DurationSample]) -> StepStatistics {
    let executions = samples.len();
    let passed = samples
        .iter()
        .filter(|s| s.step_state == StepState::Passed)
        .count();
    let failed = samples.iter().filter(|s| s.step_state.is_failure()).count();
    let retried = samples.iter().filter(|s| s.retried).count();

    let durations: Vec<f64> = samples.iter().map(|s| s.duration_secs).collect();
    let (duration_p50, duration_p95, duration_p99) = calculate_percentiles(&durations);
    let duration_min = durations.iter().copied().min_by(|a, b| cmp_f64(*a, *b)).unwrap_or(0.0);
    let duration_max = durations.iter().copied().max_by(|a, b| cmp_f64(*a, *b)).unwrap_or(0.0);
    let duration_mean = durations.iter().sum::<f64>() / executions.max(1) as f64;

    StepStatistics {
        step_key: step_key.to_string(),
        executions,
        passed,
        failed,
        retried,
        failure_rate: calculate_rate(failed, executions),
        flakiness_rate: calculate_rate(retried, executions),
        duration_min,
        duration_mean,
        duration_max,
        duration_p50,
        duration_p95,
        duration_p99,
    }
}
