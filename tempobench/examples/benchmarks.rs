//! Tempobench Example Benchmarks
//!
//! Demonstrates the harness features and serves as a template for a
//! benchmark binary.
//!
//! Run with:
//!   cargo run --release --example benchmarks
//!   cargo run --release --example benchmarks -- --benchmark_filter=memcpy
//!   cargo run --release --example benchmarks -- --benchmark_repetitions=3
//!   cargo run --release --example benchmarks -- --help

use std::hint::black_box;

use tempobench::prelude::*;

/// Simple arithmetic benchmark.
fn bm_addition(state: &mut State) {
    let x = black_box(42u64);
    let y = black_box(17u64);
    while state.keep_running() {
        black_box(x + y);
    }
}

/// Copy throughput across buffer sizes, reporting a byte rate.
fn bm_memcpy(state: &mut State) {
    let size = state.range_x() as usize;
    let src = vec![0xa5u8; size];
    let mut dst = vec![0u8; size];
    let mut iterations = 0u64;
    while state.keep_running() {
        dst.copy_from_slice(black_box(&src));
        iterations += 1;
    }
    black_box(&dst);
    state.set_bytes_processed(iterations * size as u64);
}

/// Vector sum with per-iteration setup excluded via pause/resume.
fn bm_vector_sum(state: &mut State) {
    while state.keep_running() {
        state.pause_timing();
        let data: Vec<i64> = (0..state.range_x()).collect();
        state.resume_timing();
        black_box(data.iter().sum::<i64>());
    }
    state.set_label("setup excluded");
}

/// Contended counter increments, one worker per CPU.
fn bm_shared_counter(state: &mut State) {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let mut items = 0u64;
    while state.keep_running() {
        COUNTER.fetch_add(1, Ordering::Relaxed);
        items += 1;
    }
    state.set_items_processed(items);
}

fn main() -> anyhow::Result<()> {
    register("addition", bm_addition);
    register("memcpy", bm_memcpy).range(8, 8 << 10);
    register("vector_sum", bm_vector_sum).arg(1000).arg(100_000);
    register("shared_counter", bm_shared_counter).thread_per_cpu();

    let _rest = tempobench::initialize(std::env::args());
    tempobench::run_specified_benchmarks()
}
