//! Process-wide benchmark registry, family builders, and instance
//! expansion.
//!
//! A registered family carries a name, the user routine, up to two
//! integer parameter axes, and an optional thread-count axis. Families
//! are appended to an ordered list under a mutex; deregistration nulls
//! the slot so that the indices of the remaining families stay valid
//! while enumeration is in progress.

use std::sync::{LazyLock, Mutex};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::humanize::append_human_readable;
use crate::state::State;

/// A user measurement routine. Loops on [`State::keep_running`].
pub type BenchmarkFn = fn(&mut State);

/// For non-dense ranges, intermediate values are powers of this.
const RANGE_MULTIPLIER: i64 = 8;

/// Thread-count sentinel resolved to the CPU count at expansion time.
/// Zero is free for this because real thread counts must be positive.
const THREAD_PER_CPU_MARKER: usize = 0;

/// Filter errors surfaced by [`find_benchmarks`].
#[derive(Debug, Error)]
pub enum FilterError {
    /// The benchmark filter was not a valid regular expression.
    #[error("could not compile benchmark filter: {0}")]
    InvalidRegex(#[from] regex::Error),
}

struct Family {
    name: String,
    routine: BenchmarkFn,
    args_x: Vec<i64>,
    args_y: Vec<i64>,
    thread_counts: Vec<usize>,
}

static FAMILIES: LazyLock<Mutex<Vec<Option<Family>>>> = LazyLock::new(|| Mutex::new(Vec::new()));

/// One runnable configuration of a family: its decorated name, the
/// routine, the selected axis values, and a resolved thread count.
/// Built fresh per enumeration and discarded after the run.
#[derive(Clone)]
pub struct Instance {
    /// Family name decorated with axis values and thread count.
    pub name: String,
    /// The user routine to run.
    pub routine: BenchmarkFn,
    /// First-axis value, when the family set one.
    pub range_x: Option<i64>,
    /// Second-axis value, when the family set one.
    pub range_y: Option<i64>,
    /// Number of concurrent workers to spawn.
    pub threads: usize,
    /// Whether the family fixed a thread-count axis at all.
    pub multithreaded: bool,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("range_x", &self.range_x)
            .field("range_y", &self.range_y)
            .field("threads", &self.threads)
            .finish()
    }
}

/// Handle to a registered benchmark family. All builder methods mutate
/// the family in the registry and return the handle for chaining.
#[derive(Debug, Clone, Copy)]
pub struct Benchmark {
    index: usize,
}

/// Register a named family. Registration order is enumeration order.
pub fn register(name: &str, routine: BenchmarkFn) -> Benchmark {
    let mut families = FAMILIES.lock().unwrap();
    let index = families.len();
    families.push(Some(Family {
        name: name.to_string(),
        routine,
        args_x: Vec::new(),
        args_y: Vec::new(),
        thread_counts: Vec::new(),
    }));
    Benchmark { index }
}

impl Benchmark {
    fn with_family<R>(self, f: impl FnOnce(&mut Family) -> R) -> R {
        let mut families = FAMILIES.lock().unwrap();
        let family = families[self.index]
            .as_mut()
            .expect("benchmark family was deregistered");
        f(family)
    }

    /// Add a single first-axis value.
    pub fn arg(self, x: i64) -> Self {
        self.with_family(|family| family.args_x.push(x));
        self
    }

    /// Add a geometric first-axis range: `lo`, powers of 8 strictly
    /// between `lo` and `hi`, then `hi` if distinct.
    pub fn range(self, lo: i64, hi: i64) -> Self {
        let values = add_range(lo, hi, RANGE_MULTIPLIER);
        self.with_family(|family| family.args_x.extend(values));
        self
    }

    /// Add every value in `lo..=hi` to the first axis.
    pub fn dense_range(self, lo: i64, hi: i64) -> Self {
        assert!(lo >= 0, "dense_range start must be non-negative: {lo}");
        assert!(lo <= hi, "dense_range requires lo <= hi: {lo} > {hi}");
        self.with_family(|family| family.args_x.extend(lo..=hi));
        self
    }

    /// Add one value to each axis.
    pub fn arg_pair(self, x: i64, y: i64) -> Self {
        self.with_family(|family| {
            family.args_x.push(x);
            family.args_y.push(y);
        });
        self
    }

    /// Replace both axes with geometric ranges.
    pub fn range_pair(self, lo1: i64, hi1: i64, lo2: i64, hi2: i64) -> Self {
        let xs = add_range(lo1, hi1, RANGE_MULTIPLIER);
        let ys = add_range(lo2, hi2, RANGE_MULTIPLIER);
        self.with_family(|family| {
            family.args_x = xs;
            family.args_y = ys;
        });
        self
    }

    /// Run a caller-supplied configuration callback against this family.
    pub fn apply(self, custom_arguments: fn(Benchmark) -> Benchmark) -> Self {
        custom_arguments(self)
    }

    /// Fix a concurrent thread count.
    pub fn threads(self, t: usize) -> Self {
        assert!(t > 0, "thread count must be positive");
        self.with_family(|family| family.thread_counts.push(t));
        self
    }

    /// Fix a geometric range of thread counts, doubling from
    /// `min_threads` up to `max_threads`.
    pub fn thread_range(self, min_threads: usize, max_threads: usize) -> Self {
        assert!(min_threads > 0, "thread count must be positive");
        assert!(
            max_threads >= min_threads,
            "thread_range requires min <= max: {min_threads} > {max_threads}"
        );
        let counts = add_range(min_threads as i64, max_threads as i64, 2);
        self.with_family(|family| {
            family
                .thread_counts
                .extend(counts.into_iter().map(|t| t as usize));
        });
        self
    }

    /// Run with one worker per CPU, resolved at expansion time.
    pub fn thread_per_cpu(self) -> Self {
        self.with_family(|family| family.thread_counts.push(THREAD_PER_CPU_MARKER));
        self
    }

    /// Null this family's registry slot, preserving the indices of the
    /// others. Trailing empty slots are trimmed.
    pub fn deregister(self) {
        let mut families = FAMILIES.lock().unwrap();
        families[self.index] = None;
        while matches!(families.last(), Some(None)) {
            families.pop();
        }
    }
}

/// Geometric range expansion: `lo`, powers of `mult` strictly between
/// `lo` and `hi`, then `hi` when distinct, in ascending order.
fn add_range(lo: i64, hi: i64, mult: i64) -> Vec<i64> {
    assert!(lo >= 0, "range start must be non-negative: {lo}");
    assert!(hi >= lo, "range requires lo <= hi: {lo} > {hi}");

    let mut dst = vec![lo];
    let mut i: i64 = 1;
    while i < i64::MAX / mult {
        if i >= hi {
            break;
        }
        if i > lo {
            dst.push(i);
        }
        i *= mult;
    }
    if hi != lo {
        dst.push(hi);
    }
    dst
}

impl Family {
    /// Expand this family for one (x, y) axis selection into one
    /// instance per thread count.
    fn expand(&self, x: Option<i64>, y: Option<i64>, num_cpus: usize) -> Vec<Instance> {
        let one_thread = vec![1];
        let multithreaded = !self.thread_counts.is_empty();
        let thread_counts = if multithreaded {
            &self.thread_counts
        } else {
            &one_thread
        };

        let mut instances = Vec::with_capacity(thread_counts.len());
        for &count in thread_counts {
            let threads = if count == THREAD_PER_CPU_MARKER {
                num_cpus.max(1)
            } else {
                count
            };

            let mut name = self.name.clone();
            if let Some(x) = x {
                append_human_readable(x, &mut name);
            }
            if let Some(y) = y {
                append_human_readable(y, &mut name);
            }
            if multithreaded {
                name.push_str(&format!("/threads:{threads}"));
            }

            instances.push(Instance {
                name,
                routine: self.routine,
                range_x: x,
                range_y: y,
                threads,
                multithreaded,
            });
        }
        instances
    }
}

/// Expand every family whose *family* name (not the decorated instance
/// name) matches `spec` into the cross product of its axes and thread
/// counts.
pub fn find_benchmarks(spec: &str, num_cpus: usize) -> Result<Vec<Instance>, FilterError> {
    let re = match Regex::new(spec) {
        Ok(re) => re,
        Err(e) => {
            eprintln!("Could not compile benchmark re: {e}");
            return Err(e.into());
        }
    };

    let families = FAMILIES.lock().unwrap();
    let mut benchmarks = Vec::new();
    for family in families.iter().flatten() {
        if !re.is_match(&family.name) {
            debug!(family = %family.name, "skipping, filter does not match");
            continue;
        }

        if family.args_x.is_empty() && family.args_y.is_empty() {
            benchmarks.extend(family.expand(None, None, num_cpus));
        } else if family.args_y.is_empty() {
            for &x in &family.args_x {
                benchmarks.extend(family.expand(Some(x), None, num_cpus));
            }
        } else {
            for &x in &family.args_x {
                for &y in &family.args_y {
                    benchmarks.extend(family.expand(Some(x), Some(y), num_cpus));
                }
            }
        }
    }
    Ok(benchmarks)
}

/// The decorated names [`find_benchmarks`] would run, without running
/// anything.
pub fn find_benchmark_names(spec: &str, num_cpus: usize) -> Result<Vec<String>, FilterError> {
    Ok(find_benchmarks(spec, num_cpus)?
        .into_iter()
        .map(|instance| instance.name)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(state: &mut State) {
        while state.keep_running() {}
    }

    #[test]
    fn geometric_range_expansion() {
        assert_eq!(add_range(1, 64, 8), vec![1, 8, 64]);
        assert_eq!(add_range(8, 8, 8), vec![8]);
        assert_eq!(add_range(0, 100, 8), vec![0, 1, 8, 64, 100]);
        assert_eq!(add_range(2, 8, 8), vec![2, 8]);
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn negative_range_is_fatal() {
        add_range(-1, 64, 8);
    }

    #[test]
    #[should_panic(expected = "lo <= hi")]
    fn inverted_range_is_fatal() {
        add_range(64, 1, 8);
    }

    #[test]
    fn instance_names_carry_axes_and_threads() {
        let bench = register("registry_naming", noop).range(1, 64).threads(2);
        let names = find_benchmark_names("^registry_naming$", 4).unwrap();
        assert_eq!(
            names,
            vec![
                "registry_naming/1/threads:2",
                "registry_naming/8/threads:2",
                "registry_naming/64/threads:2",
            ]
        );
        bench.deregister();
    }

    #[test]
    fn bare_family_keeps_plain_name() {
        let bench = register("registry_bare", noop);
        let names = find_benchmark_names("^registry_bare$", 4).unwrap();
        assert_eq!(names, vec!["registry_bare"]);
        bench.deregister();
    }

    #[test]
    fn pair_axes_cross_product() {
        let bench = register("registry_pairs", noop).range_pair(1, 8, 1, 8);
        let names = find_benchmark_names("^registry_pairs$", 4).unwrap();
        assert_eq!(
            names,
            vec![
                "registry_pairs/1/1",
                "registry_pairs/1/8",
                "registry_pairs/8/1",
                "registry_pairs/8/8",
            ]
        );
        bench.deregister();
    }

    #[test]
    fn thread_per_cpu_resolves_at_expansion() {
        let bench = register("registry_percpu", noop).thread_per_cpu();
        let instances = find_benchmarks("^registry_percpu$", 6).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].threads, 6);
        assert_eq!(instances[0].name, "registry_percpu/threads:6");
        bench.deregister();
    }

    #[test]
    fn filter_matches_family_name_only() {
        let a = register("AaA_filter", noop);
        let b = register("AaB_filter", noop).arg(16);
        let c = register("C_filter", noop);
        let names = find_benchmark_names("^A.A_filter", 1).unwrap();
        assert_eq!(names, vec!["AaA_filter"]);
        a.deregister();
        b.deregister();
        c.deregister();
    }

    #[test]
    fn invalid_regex_reports_error() {
        assert!(find_benchmarks("(unclosed", 1).is_err());
    }

    #[test]
    fn deregistered_family_is_skipped() {
        let keep = register("registry_kept", noop);
        let drop = register("registry_dropped", noop);
        drop.deregister();
        let names = find_benchmark_names("^registry_", 1).unwrap();
        assert!(names.contains(&"registry_kept".to_string()));
        assert!(!names.iter().any(|n| n.contains("dropped")));
        keep.deregister();
    }
}
