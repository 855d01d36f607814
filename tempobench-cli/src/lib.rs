#![warn(missing_docs)]
//! Tempobench CLI - Harness Entry Points
//!
//! Benchmark binaries call [`initialize`] with their arguments and then
//! [`run_specified_benchmarks`]:
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     let rest = tempobench::initialize(std::env::args());
//!     // rest holds the arguments the harness did not consume
//!     tempobench::run_specified_benchmarks()
//! }
//! ```
//!
//! Flag precedence is CLI > `tempo.toml` > built-in default. Arguments
//! the harness does not recognize are returned to the caller untouched.

mod config;
mod sysinfo;

pub use config::{OutputConfig, RunnerConfig, TempoConfig};
pub use sysinfo::{cpu_scaling_enabled, cycles_per_second, num_cpus};

use std::sync::OnceLock;

use anyhow::Context;
use clap::Parser;
use tracing::debug;

use tempobench_core::{find_benchmarks, measure_overhead, run_instance, Instance, RunConfig};
use tempobench_report::{ConsoleReporter, Reporter, RunContext};
use tempobench_stats::compute_aggregates;

/// Harness flags. Every field is optional so that `tempo.toml` values
/// and built-in defaults can fill whatever the command line leaves out.
#[derive(Parser, Debug, Default)]
#[command(name = "tempobench", about = "tempobench - microbenchmark harness")]
pub struct Cli {
    /// Regular expression selecting the benchmarks to execute. An empty
    /// expression runs nothing; "all" runs every registered benchmark.
    #[arg(long = "benchmark_filter")]
    pub benchmark_filter: Option<String>,

    /// Minimum number of iterations per benchmark.
    #[arg(long = "benchmark_min_iters")]
    pub benchmark_min_iters: Option<u64>,

    /// Maximum number of iterations per benchmark.
    #[arg(long = "benchmark_max_iters")]
    pub benchmark_max_iters: Option<u64>,

    /// Minimum number of seconds a benchmark runs before results are
    /// considered significant. For CPU-time based benchmarks this bounds
    /// the total CPU time used by all threads; for real-time based
    /// benchmarks it bounds the elapsed time.
    #[arg(long = "benchmark_min_time")]
    pub benchmark_min_time: Option<f64>,

    /// Number of runs per benchmark. Greater than 1 reports the mean and
    /// standard deviation of the runs.
    #[arg(long = "benchmark_repetitions")]
    pub benchmark_repetitions: Option<usize>,

    /// Report memory usage for all benchmarks.
    #[arg(
        long = "benchmark_memory_usage",
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    pub benchmark_memory_usage: Option<bool>,

    /// Enable colorized output.
    #[arg(
        long = "color_print",
        num_args = 0..=1,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    pub color_print: Option<bool>,

    /// Verbose-logging threshold.
    #[arg(long = "v")]
    pub v: Option<i32>,
}

/// Fully resolved harness settings for one process.
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    /// Benchmark filter expression.
    pub filter: String,
    /// Measurement budgets handed to the engine.
    pub run: RunConfig,
    /// Colorized console output.
    pub color: bool,
    /// Verbose-logging threshold.
    pub verbosity: i32,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        HarnessSettings {
            filter: ".".to_string(),
            run: RunConfig::default(),
            color: true,
            verbosity: 0,
        }
    }
}

static SETTINGS: OnceLock<HarnessSettings> = OnceLock::new();

/// Flags the harness consumes; everything else passes through.
const HARNESS_FLAGS: [&str; 8] = [
    "benchmark_filter",
    "benchmark_min_iters",
    "benchmark_max_iters",
    "benchmark_min_time",
    "benchmark_repetitions",
    "benchmark_memory_usage",
    "color_print",
    "v",
];

fn is_harness_flag(arg: &str) -> bool {
    let Some(body) = arg.strip_prefix("--") else {
        return false;
    };
    if body == "help" {
        return true;
    }
    let name = body.split('=').next().unwrap_or(body);
    HARNESS_FLAGS.contains(&name)
}

fn resolve_settings(cli: &Cli, file: &TempoConfig) -> HarnessSettings {
    let defaults = RunConfig::default();
    let repetitions = cli
        .benchmark_repetitions
        .or(file.runner.repetitions)
        .unwrap_or(defaults.repetitions);
    assert!(repetitions >= 1, "benchmark_repetitions must be positive");

    HarnessSettings {
        filter: cli.benchmark_filter.clone().unwrap_or_else(|| ".".into()),
        run: RunConfig {
            min_iters: cli
                .benchmark_min_iters
                .or(file.runner.min_iters)
                .unwrap_or(defaults.min_iters),
            max_iters: cli
                .benchmark_max_iters
                .or(file.runner.max_iters)
                .unwrap_or(defaults.max_iters),
            min_time: cli
                .benchmark_min_time
                .or(file.runner.min_time)
                .unwrap_or(defaults.min_time),
            repetitions,
            measure_memory: cli
                .benchmark_memory_usage
                .or(file.output.memory_usage)
                .unwrap_or(false),
        },
        color: cli.color_print.or(file.output.color).unwrap_or(true),
        verbosity: cli.v.unwrap_or(0),
    }
}

fn init_tracing(verbosity: i32) {
    let level = if verbosity <= 0 {
        "info"
    } else if verbosity == 1 {
        "debug"
    } else {
        "trace"
    };
    let _ = tracing_subscriber::fmt().with_env_filter(level).try_init();
}

/// Parse harness flags out of `args`, load `tempo.toml` defaults, set up
/// logging, and measure the empty-loop overhead.
///
/// Returns the arguments the harness did not consume, in their original
/// order (including the program name). `--help` prints usage and exits
/// with status 0; malformed harness flags are fatal.
pub fn initialize<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut rest = Vec::new();
    if let Some(program) = args.next() {
        rest.push(program);
    }

    let mut ours = vec!["tempobench".to_string()];
    for arg in args {
        if is_harness_flag(&arg) {
            ours.push(arg);
        } else {
            rest.push(arg);
        }
    }

    let cli = Cli::parse_from(&ours);
    let file = TempoConfig::discover().unwrap_or_default();
    let settings = resolve_settings(&cli, &file);
    init_tracing(settings.verbosity);

    let overhead = measure_overhead(&settings.run);
    debug!(
        overhead_ns = overhead * 1e9,
        "measured empty-loop overhead"
    );

    let _ = SETTINGS.set(settings);
    rest
}

/// Run every benchmark matching the configured filter through the
/// default console reporter.
///
/// An empty filter is a no-op; the literal "all" runs everything. The
/// only error is an invalid filter expression.
pub fn run_specified_benchmarks() -> anyhow::Result<()> {
    let settings = SETTINGS.get().cloned().unwrap_or_default();
    let spec = match settings.filter.as_str() {
        "" => return Ok(()),
        "all" => ".",
        other => other,
    };
    let mut reporter = ConsoleReporter::new(settings.color, settings.run.measure_memory);
    run_matching_benchmarks(spec, &mut reporter, &settings.run)
}

/// Column width reserved for names, padded for the `_stddev` and
/// `/threads:` decorations the report may add.
fn name_field_width(benchmarks: &[Instance], repetitions: usize) -> usize {
    let mut width = 10;
    for benchmark in benchmarks {
        let padding = if benchmark.threads > 1 && repetitions > 1 {
            17
        } else if benchmark.threads > 1 {
            10
        } else if repetitions > 1 {
            7
        } else {
            0
        };
        width = width.max(benchmark.name.len() + padding);
    }
    width
}

/// Expand and run every instance matching `spec`, feeding each one's
/// runs (with aggregate rows appended when there are at least two) to
/// `reporter`.
pub fn run_matching_benchmarks(
    spec: &str,
    reporter: &mut dyn Reporter,
    config: &RunConfig,
) -> anyhow::Result<()> {
    if spec.is_empty() {
        return Ok(());
    }

    let num_cpus = sysinfo::num_cpus();
    let benchmarks = find_benchmarks(spec, num_cpus).context("selecting benchmarks")?;

    let context = RunContext {
        num_cpus,
        mhz_per_cpu: sysinfo::cycles_per_second() / 1e6,
        cpu_scaling_enabled: sysinfo::cpu_scaling_enabled(num_cpus),
        name_field_width: name_field_width(&benchmarks, config.repetitions),
    };

    if reporter.report_context(&context) {
        for benchmark in &benchmarks {
            let mut runs = run_instance(benchmark, config);
            if let Some((mean, stddev)) = compute_aggregates(&runs) {
                runs.push(mean);
                runs.push(stddev);
            }
            reporter.report_runs(&runs);
        }
    }
    Ok(())
}

/// The decorated names the configured CPU count would expand `spec` to,
/// without running anything.
pub fn find_benchmark_names(spec: &str) -> anyhow::Result<Vec<String>> {
    tempobench_core::find_benchmark_names(spec, sysinfo::num_cpus())
        .context("selecting benchmarks")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_flags_are_recognized() {
        assert!(is_harness_flag("--benchmark_filter=abc"));
        assert!(is_harness_flag("--benchmark_min_time=0.25"));
        assert!(is_harness_flag("--color_print"));
        assert!(is_harness_flag("--v=2"));
        assert!(is_harness_flag("--help"));

        assert!(!is_harness_flag("--benchmark"));
        assert!(!is_harness_flag("--verbose"));
        assert!(!is_harness_flag("-v"));
        assert!(!is_harness_flag("positional"));
    }

    #[test]
    fn cli_overrides_file_overrides_defaults() {
        let cli = Cli::parse_from([
            "tempobench",
            "--benchmark_min_iters=5",
            "--benchmark_min_time=0.125",
        ]);
        let file: TempoConfig = toml::from_str(
            r#"
            [runner]
            min_iters = 7
            repetitions = 4

            [output]
            color = false
            "#,
        )
        .unwrap();

        let settings = resolve_settings(&cli, &file);
        assert_eq!(settings.run.min_iters, 5); // CLI wins
        assert_eq!(settings.run.repetitions, 4); // file fills the gap
        assert_eq!(settings.run.min_time, 0.125);
        assert_eq!(settings.run.max_iters, 1_000_000_000); // default
        assert!(!settings.color); // file wins over default
        assert_eq!(settings.filter, ".");
    }

    #[test]
    fn bool_flags_accept_bare_and_valued_forms() {
        let bare = Cli::parse_from(["tempobench", "--color_print"]);
        assert_eq!(bare.color_print, Some(true));

        let valued = Cli::parse_from(["tempobench", "--color_print=false"]);
        assert_eq!(valued.color_print, Some(false));

        let memory = Cli::parse_from(["tempobench", "--benchmark_memory_usage"]);
        assert_eq!(memory.benchmark_memory_usage, Some(true));
    }

    #[test]
    #[should_panic(expected = "benchmark_repetitions must be positive")]
    fn zero_repetitions_is_fatal() {
        let cli = Cli::parse_from(["tempobench", "--benchmark_repetitions=0"]);
        resolve_settings(&cli, &TempoConfig::default());
    }

    #[test]
    fn name_width_accounts_for_decorations() {
        let instance = |name: &str, threads: usize| Instance {
            name: name.to_string(),
            routine: |_| {},
            range_x: None,
            range_y: None,
            threads,
            multithreaded: threads > 1,
        };

        // Short names keep the minimum width.
        assert_eq!(name_field_width(&[instance("ab", 1)], 1), 10);
        // Repetitions pad for the "_stddev" suffix.
        assert_eq!(name_field_width(&[instance("twelve_chars", 1)], 2), 19);
        // Thread decorations pad further.
        assert_eq!(name_field_width(&[instance("twelve_chars", 4)], 2), 29);
    }

    #[test]
    fn empty_spec_runs_nothing() {
        struct FailingReporter;
        impl Reporter for FailingReporter {
            fn report_context(&mut self, _: &RunContext) -> bool {
                panic!("context should not be reported for an empty spec");
            }
            fn report_runs(&mut self, _: &[tempobench_core::RunData]) {
                panic!("runs should not be reported for an empty spec");
            }
        }
        run_matching_benchmarks("", &mut FailingReporter, &RunConfig::default()).unwrap();
    }

    #[test]
    fn invalid_filter_is_an_error() {
        struct NullReporter;
        impl Reporter for NullReporter {
            fn report_context(&mut self, _: &RunContext) -> bool {
                true
            }
            fn report_runs(&mut self, _: &[tempobench_core::RunData]) {}
        }
        let result = run_matching_benchmarks("(unclosed", &mut NullReporter, &RunConfig::default());
        assert!(result.is_err());
    }
}
