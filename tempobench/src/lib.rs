#![warn(missing_docs)]
//! # Tempobench
//!
//! A microbenchmark harness: link against this crate, register named
//! measurement routines, and let the harness decide how many iterations
//! to run, under which clock, across how many worker threads.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tempobench::prelude::*;
//!
//! fn bm_push(state: &mut State) {
//!     let mut v = Vec::new();
//!     while state.keep_running() {
//!         v.push(1u64);
//!     }
//!     state.set_items_processed(v.len() as u64);
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     register("vec_push", bm_push).range(8, 8 << 10);
//!     let _rest = tempobench::initialize(std::env::args());
//!     tempobench::run_specified_benchmarks()
//! }
//! ```
//!
//! ## Parameterized and multithreaded families
//!
//! ```ignore
//! register("memcpy", bm_memcpy).range(8, 1 << 20).thread_per_cpu();
//! ```
//!
//! The routine reads its axis values through [`State::range_x`] /
//! [`State::range_y`], may exclude setup work with
//! [`State::pause_timing`] / [`State::resume_timing`], and can report
//! throughput counters and a label once its loop exits.

// Engine
pub use tempobench_core::{
    cpu_usage, find_benchmarks, measure_overhead, measured_overhead, register, run_instance,
    use_real_time, walltime, Benchmark, BenchmarkFn, FilterError, Instance, RunConfig, RunData,
    State, ThreadStats,
};

// Formatting helpers shared by reporters
pub use tempobench_core::{human_readable_number, to_binary_string};

// Aggregation
pub use tempobench_stats::{compute_aggregates, WeightedStats};

// Reporting
pub use tempobench_report::{ConsoleReporter, Reporter, RunContext};

// Entry points and configuration
pub use tempobench_cli::{
    find_benchmark_names, initialize, run_matching_benchmarks, run_specified_benchmarks, Cli,
    HarnessSettings, TempoConfig,
};

/// Convenient imports for benchmark binaries.
pub mod prelude {
    pub use crate::{register, use_real_time, Benchmark, State};
}
