#![warn(missing_docs)]
//! Tempobench Report - Result Sinks
//!
//! A reporter is an abstract sink consuming the run context once, then
//! one vector of runs per instance. The console reporter is the default
//! sink; anything else (a buffer in tests, a custom format) implements
//! the same trait.

mod console;

pub use console::ConsoleReporter;

use tempobench_core::RunData;

/// Environment snapshot handed to a reporter before any runs.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Logical CPU count.
    pub num_cpus: usize,
    /// Nominal per-CPU frequency in MHz; 0 when unknown.
    pub mhz_per_cpu: f64,
    /// Whether a frequency-scaling governor other than `performance`
    /// was detected.
    pub cpu_scaling_enabled: bool,
    /// Column width to reserve for benchmark names.
    pub name_field_width: usize,
}

/// Abstract sink for benchmark results.
pub trait Reporter {
    /// Called once before any runs. Returning false aborts the session.
    fn report_context(&mut self, context: &RunContext) -> bool;

    /// Called once per instance with its per-run rows, plus the `_mean`
    /// and `_stddev` rows when at least two runs were recorded.
    fn report_runs(&mut self, runs: &[RunData]);
}
