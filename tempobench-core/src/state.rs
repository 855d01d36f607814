//! Per-worker measurement state and the interval state machine.
//!
//! Each worker owns a [`State`] and hands it to the user routine, whose
//! inner loop is a single [`State::keep_running`] call. The hot path is
//! one cached-clock load; everything else happens when an interval
//! deadline passes, driven by the worker's phase:
//!
//! ```text
//! INITIAL -> STARTING -> RUNNING <-> RUNNING -> STOPPING -> STOPPED
//! ```
//!
//! Workers rendezvous in STARTING so that no data accumulates before the
//! last worker arrives; the last starter also pins the clock type for
//! the whole instance. A closed interval that still needs iterations is
//! extended as a continuation, overwriting the worker's own run slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use tracing::debug;

use crate::clock::{cpu_usage, walltime, ClockKind, FastClock};
use crate::registry::Instance;

/// Intervals stop doubling once they reach this length.
const MAX_INTERVAL_MICROS: i64 = 5_000_000;

/// Set when the user routine asks to measure wall time instead of CPU
/// time; reset before every instance.
static USE_REAL_TIME: AtomicBool = AtomicBool::new(false);

/// Base termination decisions on wall time rather than CPU time for the
/// current instance. Must be called before the routine's first
/// iteration to take effect for the whole instance.
pub fn use_real_time() {
    USE_REAL_TIME.store(true, Ordering::Relaxed);
}

pub(crate) fn real_time_requested() -> bool {
    USE_REAL_TIME.load(Ordering::Relaxed)
}

pub(crate) fn reset_real_time() {
    USE_REAL_TIME.store(false, Ordering::Relaxed);
}

/// Iteration and time budgets for one instance execution.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Lower bound on total iterations per worker.
    pub min_iters: u64,
    /// Upper bound on total iterations per worker.
    pub max_iters: u64,
    /// Lower bound, in seconds, on the sum over repetitions of the
    /// interval duration.
    pub min_time: f64,
    /// Completed runs per worker; 2 or more enables mean/stddev rows.
    pub repetitions: usize,
    /// Whether peak-heap measurement was requested (interface only).
    pub measure_memory: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            min_iters: 100,
            max_iters: 1_000_000_000,
            min_time: 0.5,
            repetitions: 1,
            measure_memory: false,
        }
    }
}

/// One measurement interval's output, one or more per instance.
#[derive(Debug, Clone, Default)]
pub struct RunData {
    /// Decorated instance name; filled in after the workers join.
    pub benchmark_name: String,
    /// Index of the worker that produced this run.
    pub thread_index: usize,
    /// Iterations executed inside the interval.
    pub iterations: u64,
    /// Wall seconds, minus paused intervals and overhead compensation.
    pub real_accumulated_time: f64,
    /// Process CPU seconds consumed during the interval.
    pub cpu_accumulated_time: f64,
    /// Aggregate throughput; zero when the routine reported no bytes.
    pub bytes_per_second: f64,
    /// Aggregate item rate; zero when the routine reported no items.
    pub items_per_second: f64,
    /// Peak heap bytes, when a memory collaborator populated it.
    pub max_heapbytes_used: f64,
    /// Free-form label set by the routine.
    pub label: String,
}

/// Counters the user routine sets after its loop exits. Owned by the
/// worker and merged into the shared totals once the routine returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadStats {
    /// Bytes the routine claims to have processed, per thread.
    pub bytes_processed: u64,
    /// Items the routine claims to have processed, per thread.
    pub items_processed: u64,
}

impl ThreadStats {
    fn add(&mut self, other: &ThreadStats) {
        self.bytes_processed += other.bytes_processed;
        self.items_processed += other.items_processed;
    }
}

pub(crate) struct SharedInner {
    /// Workers that have entered STARTING. Monotonic within an instance.
    pub(crate) starting: usize,
    /// Workers that have entered STOPPING. Monotonic within an instance.
    pub(crate) stopping: usize,
    /// Sum of the per-worker stats, merged as routines return.
    pub(crate) stats: ThreadStats,
    /// Accumulated runs, one slot per (worker, repetition).
    pub(crate) runs: Vec<RunData>,
    /// Label shared by the whole instance; last setter wins.
    pub(crate) label: String,
}

/// Coordination state shared by every worker of one instance execution.
pub struct SharedState {
    pub(crate) instance: Option<Instance>,
    pub(crate) threads: usize,
    pub(crate) inner: Mutex<SharedInner>,
    all_started: Condvar,
}

impl SharedState {
    pub(crate) fn new(instance: Option<Instance>, threads: usize) -> Self {
        SharedState {
            instance,
            threads,
            inner: Mutex::new(SharedInner {
                starting: 0,
                stopping: 0,
                stats: ThreadStats::default(),
                runs: Vec::new(),
                label: String::new(),
            }),
            all_started: Condvar::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initial,
    Starting,
    Running,
    Stopping,
    Stopped,
}

enum Decision {
    Continue { continuation: bool },
    Stop,
}

/// The object a user routine interacts with: the `keep_running`
/// predicate, pause/resume, processed counters, the label setter, and
/// the instance's parameter values.
pub struct State {
    clock: Arc<FastClock>,
    shared: Arc<SharedState>,
    thread_index: usize,
    phase: Phase,

    iterations: u64,
    total_iterations: u64,
    /// Deadline for the current interval, in clock microseconds.
    stop_time_micros: i64,
    interval_micros: i64,
    is_continuation: bool,
    /// Index in `shared.runs` of the slot the current repetition owns.
    run_slot: Option<usize>,
    completed_runs: usize,

    start_cpu: f64,
    start_time: f64,
    start_pause: f64,
    pause_time: f64,

    stats: ThreadStats,

    min_iters: u64,
    max_iters: u64,
    repetitions: usize,
}

impl State {
    pub(crate) fn new(
        clock: Arc<FastClock>,
        shared: Arc<SharedState>,
        thread_index: usize,
        config: &RunConfig,
    ) -> Self {
        assert!(config.repetitions >= 1, "repetitions must be positive");
        let interval_micros = (1e6 * config.min_time / config.repetitions as f64) as i64;
        State {
            clock,
            shared,
            thread_index,
            phase: Phase::Initial,
            iterations: 0,
            total_iterations: 0,
            stop_time_micros: 0,
            interval_micros,
            is_continuation: false,
            run_slot: None,
            completed_runs: 0,
            start_cpu: 0.0,
            start_time: 0.0,
            start_pause: 0.0,
            pause_time: 0.0,
            stats: ThreadStats::default(),
            min_iters: config.min_iters,
            max_iters: config.max_iters,
            repetitions: config.repetitions,
        }
    }

    /// Returns true to execute another iteration of the routine's inner
    /// loop and false, exactly once, to terminate it.
    #[inline]
    pub fn keep_running(&mut self) -> bool {
        // Fast path: the cached clock has not reached the deadline,
        // shifted by however long we have been paused.
        if !self
            .clock
            .has_reached(self.stop_time_micros + (self.pause_time * 1e6) as i64)
        {
            self.iterations += 1;
            return true;
        }

        match self.phase {
            Phase::Initial => self.start_running(),
            Phase::Running => self.finish_interval(),
            Phase::Stopping => self.maybe_stop(),
            Phase::Starting | Phase::Stopped => {
                panic!("keep_running observed impossible phase {:?}", self.phase)
            }
        }
    }

    /// Exclude the time until the matching [`resume_timing`] from the
    /// interval's accumulated wall time.
    ///
    /// [`resume_timing`]: State::resume_timing
    pub fn pause_timing(&mut self) {
        self.start_pause = walltime();
    }

    /// Close the pause opened by [`pause_timing`]. Cycles accumulate.
    ///
    /// [`pause_timing`]: State::pause_timing
    pub fn resume_timing(&mut self) {
        self.pause_time += walltime() - self.start_pause;
    }

    /// Record bytes processed by this worker. Legal only after the loop
    /// has exited.
    pub fn set_bytes_processed(&mut self, bytes: u64) {
        assert_eq!(
            self.phase,
            Phase::Stopped,
            "set_bytes_processed is only legal after the benchmark loop exits"
        );
        self.stats.bytes_processed = bytes;
    }

    /// Record items processed by this worker. Legal only after the loop
    /// has exited.
    pub fn set_items_processed(&mut self, items: u64) {
        assert_eq!(
            self.phase,
            Phase::Stopped,
            "set_items_processed is only legal after the benchmark loop exits"
        );
        self.stats.items_processed = items;
    }

    /// Attach a label to the instance's report lines. Legal only after
    /// the loop has exited.
    pub fn set_label(&mut self, label: &str) {
        assert_eq!(
            self.phase,
            Phase::Stopped,
            "set_label is only legal after the benchmark loop exits"
        );
        let mut inner = self.shared.inner.lock().unwrap();
        inner.label = label.to_string();
    }

    /// First-axis value of the running instance.
    ///
    /// # Panics
    /// If the family was registered without a first-axis parameter.
    pub fn range_x(&self) -> i64 {
        self.instance()
            .range_x
            .expect("range_x requested but the benchmark was registered without one")
    }

    /// Second-axis value of the running instance.
    ///
    /// # Panics
    /// If the family was registered without a second-axis parameter.
    pub fn range_y(&self) -> i64 {
        self.instance()
            .range_y
            .expect("range_y requested but the benchmark was registered without one")
    }

    /// Index of this worker within the instance, `0..threads`.
    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    fn instance(&self) -> &Instance {
        self.shared
            .instance
            .as_ref()
            .expect("state is not attached to a benchmark instance")
    }

    /// Run the user routine to completion, then fold this worker's stats
    /// into the shared totals.
    pub(crate) fn run(&mut self) {
        self.stats = ThreadStats::default();
        let routine = self.instance().routine;
        routine(self);
        let mut inner = self.shared.inner.lock().unwrap();
        let stats = self.stats;
        inner.stats.add(&stats);
    }

    /// INITIAL -> STARTING -> RUNNING. Rendezvous with the other
    /// workers; the last one to arrive pins the clock type.
    fn start_running(&mut self) -> bool {
        let shared = Arc::clone(&self.shared);
        {
            let mut inner = shared.inner.lock().unwrap();
            assert_eq!(self.phase, Phase::Initial);
            self.phase = Phase::Starting;
            self.is_continuation = false;

            assert!(inner.starting < shared.threads);
            inner.starting += 1;
            if inner.starting == shared.threads {
                // Last worker to start: the clock type is now fixed for
                // the whole instance.
                let kind = if real_time_requested() {
                    ClockKind::RealTime
                } else {
                    ClockKind::CpuTime
                };
                self.clock.set_kind(kind);
                shared.all_started.notify_all();
            } else {
                while inner.starting < shared.threads {
                    inner = shared.all_started.wait(inner).unwrap();
                }
            }
            self.phase = Phase::Running;
        }
        self.new_interval();
        true
    }

    fn new_interval(&mut self) {
        self.stop_time_micros = self.clock.now_micros() + self.interval_micros;
        if !self.is_continuation {
            debug!(
                thread = self.thread_index,
                interval_micros = self.interval_micros,
                "starting new interval"
            );
            self.iterations = 0;
            self.pause_time = 0.0;
            self.start_cpu = cpu_usage();
            self.start_time = walltime();
        } else {
            debug!(
                thread = self.thread_index,
                interval_micros = self.interval_micros,
                "continuing interval"
            );
        }
    }

    /// RUNNING -> RUNNING (grow, continue, or new repetition) or
    /// STOPPING/STOPPED.
    fn finish_interval(&mut self) -> bool {
        // Too few iterations to be meaningful: grow the window and
        // restart the interval from scratch.
        if self.iterations < self.min_iters / self.repetitions as u64
            && self.interval_micros < MAX_INTERVAL_MICROS
        {
            self.interval_micros *= 2;
            debug!(
                thread = self.thread_index,
                interval_micros = self.interval_micros,
                "interval was too short, doubling"
            );
            self.is_continuation = false;
            self.new_interval();
            return true;
        }

        let accumulated_time = walltime() - self.start_time;
        let total_overhead = 0.0; // Compensation hook; see measure_overhead.
        assert!(
            self.pause_time < accumulated_time,
            "pause/resume calls are unbalanced: paused {}s of a {}s interval",
            self.pause_time,
            accumulated_time
        );

        let data = RunData {
            thread_index: self.thread_index,
            iterations: self.iterations,
            real_accumulated_time: accumulated_time - (self.pause_time + total_overhead),
            cpu_accumulated_time: cpu_usage() - self.start_cpu,
            ..RunData::default()
        };
        self.total_iterations += self.iterations;

        let keep_going;
        let shared = Arc::clone(&self.shared);
        {
            let mut inner = shared.inner.lock().unwrap();
            match self.run_slot {
                // A continuation replaces the slot this worker already
                // owns; it never touches other workers' runs.
                Some(slot) if self.is_continuation => inner.runs[slot] = data,
                _ => {
                    inner.runs.push(data);
                    self.run_slot = Some(inner.runs.len() - 1);
                }
            }

            match self.next_decision() {
                Decision::Continue { continuation } => {
                    if !continuation {
                        self.completed_runs += 1;
                        self.run_slot = None;
                    }
                    self.is_continuation = continuation;
                    keep_going = true;
                }
                Decision::Stop => {
                    inner.stopping += 1;
                    if inner.stopping < shared.threads {
                        // Keep consuming CPU so the workers still
                        // measuring see a representative load, but stop
                        // accumulating into runs.
                        self.phase = Phase::Stopping;
                        keep_going = true;
                    } else {
                        self.phase = Phase::Stopped;
                        keep_going = false;
                    }
                }
            }
        }

        if self.phase == Phase::Running {
            self.new_interval();
        }
        keep_going
    }

    fn next_decision(&self) -> Decision {
        if self.total_iterations < self.min_iters {
            // Not enough iterations yet: extend the current repetition.
            return Decision::Continue { continuation: true };
        }
        if self.total_iterations > self.max_iters {
            return Decision::Stop;
        }
        if self.completed_runs + 1 >= self.repetitions {
            return Decision::Stop;
        }
        Decision::Continue {
            continuation: false,
        }
    }

    /// STOPPING -> STOPPED once every worker has stopped measuring.
    fn maybe_stop(&mut self) -> bool {
        let shared = Arc::clone(&self.shared);
        let inner = shared.inner.lock().unwrap();
        if inner.stopping < shared.threads {
            assert_eq!(self.phase, Phase::Stopping);
            return true;
        }
        self.phase = Phase::Stopped;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::engine_guard;

    fn single_state(config: &RunConfig) -> State {
        let clock = Arc::new(FastClock::new(ClockKind::CpuTime));
        let shared = Arc::new(SharedState::new(None, 1));
        State::new(clock, shared, 0, config)
    }

    #[test]
    fn empty_loop_produces_single_run() {
        let _guard = engine_guard();
        reset_real_time();
        let config = RunConfig {
            min_time: 0.05,
            ..RunConfig::default()
        };
        let clock = Arc::new(FastClock::new(ClockKind::CpuTime));
        let shared = Arc::new(SharedState::new(None, 1));
        let mut state = State::new(clock, Arc::clone(&shared), 0, &config);

        while state.keep_running() {}

        let inner = shared.inner.lock().unwrap();
        assert_eq!(inner.runs.len(), 1);
        let run = &inner.runs[0];
        assert!(run.iterations >= config.min_iters || run.iterations > config.max_iters);
        assert!(run.real_accumulated_time >= 0.0);
        assert!(run.cpu_accumulated_time >= 0.0);
    }

    #[test]
    fn repetitions_produce_one_slot_each() {
        let _guard = engine_guard();
        reset_real_time();
        let config = RunConfig {
            min_iters: 30,
            min_time: 0.06,
            repetitions: 3,
            ..RunConfig::default()
        };
        let clock = Arc::new(FastClock::new(ClockKind::CpuTime));
        let shared = Arc::new(SharedState::new(None, 1));
        let mut state = State::new(clock, Arc::clone(&shared), 0, &config);

        while state.keep_running() {}

        let inner = shared.inner.lock().unwrap();
        assert_eq!(inner.runs.len(), 3);
        for run in &inner.runs {
            assert!(run.iterations >= 1);
            assert!(run.real_accumulated_time >= 0.0);
        }
    }

    #[test]
    fn interval_doubles_for_slow_routines() {
        let _guard = engine_guard();
        reset_real_time();
        // One iteration per ~5ms against a 1ms first interval forces the
        // doubling path before any run is recorded.
        let config = RunConfig {
            min_iters: 4,
            min_time: 0.001,
            ..RunConfig::default()
        };
        let mut state = single_state(&config);
        // The routine sleeps, so decisions must follow wall time.
        use_real_time();

        let mut spins = 0u64;
        while state.keep_running() {
            std::thread::sleep(std::time::Duration::from_millis(5));
            spins += 1;
        }
        reset_real_time();

        assert!(spins >= 4);
        assert!(state.interval_micros > 1_000);
    }

    #[test]
    #[should_panic(expected = "only legal after the benchmark loop exits")]
    fn counters_before_stop_are_fatal() {
        let config = RunConfig::default();
        let mut state = single_state(&config);
        state.set_bytes_processed(1);
    }

    #[test]
    fn max_iters_bounds_runaway_loops() {
        let _guard = engine_guard();
        reset_real_time();
        let config = RunConfig {
            min_iters: 1,
            max_iters: 10_000,
            min_time: 0.05,
            repetitions: 5,
            ..RunConfig::default()
        };
        let mut state = single_state(&config);
        let mut count: u64 = 0;
        // Five repetitions were requested, but the iteration budget runs
        // out during the first interval of a fast loop.
        while state.keep_running() {
            count += 1;
            if count > 2_000_000_000 {
                panic!("max_iters failed to stop the loop");
            }
        }
        let runs = state.shared.inner.lock().unwrap().runs.len();
        assert!(runs < 5, "iteration budget should cut repetitions short");
    }
}
