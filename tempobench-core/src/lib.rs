#![warn(missing_docs)]
//! Tempobench Core - Measurement Engine
//!
//! This crate provides the measurement machinery of the harness:
//! - process-wide registry of benchmark families and their expansion
//!   into named instances
//! - the per-worker [`State`] the user routine loops on, with its
//!   five-phase interval state machine
//! - wall/CPU clock sources and the cached [`FastClock`] behind the
//!   hot-path deadline check
//! - instance execution across worker threads and the empty-loop
//!   overhead probe

mod clock;
mod humanize;
mod registry;
mod runner;
mod state;

pub use clock::{cpu_usage, walltime, ClockKind, FastClock};
pub use humanize::{append_human_readable, human_readable_number, to_binary_string};
pub use registry::{
    find_benchmark_names, find_benchmarks, register, Benchmark, BenchmarkFn, FilterError, Instance,
};
pub use runner::{measure_overhead, measured_overhead, run_instance};
pub use state::{use_real_time, RunConfig, RunData, State, ThreadStats};

#[cfg(test)]
pub(crate) mod test_support {
    //! Serializes unit tests that touch process-wide engine state (the
    //! real-time request flag).
    use std::sync::{Mutex, MutexGuard};

    static ENGINE_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) fn engine_guard() -> MutexGuard<'static, ()> {
        ENGINE_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}
