#![warn(missing_docs)]
//! Tempobench Stats - Run Aggregation
//!
//! Computes the `_mean` and `_stddev` synthetic rows appended after an
//! instance's per-run rows. Every statistic is weighted by iteration
//! count, so short and long runs contribute proportionally.

use tempobench_core::RunData;

/// Weighted first- and second-moment accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedStats {
    weight: f64,
    weighted_sum: f64,
    weighted_sum_sq: f64,
}

impl WeightedStats {
    /// Fold in one observation `x` with weight `w`.
    pub fn add(&mut self, x: f64, w: f64) {
        self.weight += w;
        self.weighted_sum += x * w;
        self.weighted_sum_sq += x * x * w;
    }

    /// Sum of `x * w` over the observations.
    pub fn sum(&self) -> f64 {
        self.weighted_sum
    }

    /// Weighted mean, or 0 when nothing was accumulated.
    pub fn mean(&self) -> f64 {
        if self.weight == 0.0 {
            0.0
        } else {
            self.weighted_sum / self.weight
        }
    }

    /// Weighted population standard deviation.
    pub fn std_dev(&self) -> f64 {
        let mean = self.mean();
        if self.weight == 0.0 {
            return 0.0;
        }
        let variance = self.weighted_sum_sq / self.weight - mean * mean;
        variance.max(0.0).sqrt()
    }
}

/// Compute the `_mean` and `_stddev` rows for an instance's runs.
///
/// Returns `None` for fewer than two runs, where aggregation adds
/// nothing. The stddev row's accumulated times are multiplied by the
/// total iteration count so that time-per-iteration formatting renders
/// them as per-iteration deviations. The label carries through only
/// when identical across every run.
pub fn compute_aggregates(reports: &[RunData]) -> Option<(RunData, RunData)> {
    if reports.len() < 2 {
        return None;
    }

    let mut real_time = WeightedStats::default();
    let mut cpu_time = WeightedStats::default();
    let mut bytes_per_second = WeightedStats::default();
    let mut items_per_second = WeightedStats::default();
    let mut heap_bytes = WeightedStats::default();
    let mut max_heap = f64::MIN;
    let mut total_iters: u64 = 0;

    for report in reports {
        debug_assert_eq!(report.benchmark_name, reports[0].benchmark_name);
        let iters = report.iterations as f64;
        total_iters += report.iterations;
        real_time.add(report.real_accumulated_time / iters, iters);
        cpu_time.add(report.cpu_accumulated_time / iters, iters);
        bytes_per_second.add(report.bytes_per_second, iters);
        items_per_second.add(report.items_per_second, iters);
        heap_bytes.add(report.max_heapbytes_used, iters);
        max_heap = max_heap.max(report.max_heapbytes_used);
    }

    let label = if reports
        .iter()
        .all(|report| report.label == reports[0].label)
    {
        reports[0].label.clone()
    } else {
        String::new()
    };

    let mean = RunData {
        benchmark_name: format!("{}_mean", reports[0].benchmark_name),
        iterations: total_iters,
        real_accumulated_time: real_time.sum(),
        cpu_accumulated_time: cpu_time.sum(),
        bytes_per_second: bytes_per_second.mean(),
        items_per_second: items_per_second.mean(),
        max_heapbytes_used: max_heap,
        label: label.clone(),
        ..RunData::default()
    };

    let stddev = RunData {
        benchmark_name: format!("{}_stddev", reports[0].benchmark_name),
        iterations: total_iters,
        real_accumulated_time: real_time.std_dev() * total_iters as f64,
        cpu_accumulated_time: cpu_time.std_dev() * total_iters as f64,
        bytes_per_second: bytes_per_second.std_dev(),
        items_per_second: items_per_second.std_dev(),
        max_heapbytes_used: heap_bytes.std_dev(),
        label,
        ..RunData::default()
    };

    Some((mean, stddev))
}
