//! The default console sink: a colorized fixed-width table.

use chrono::Local;
use colored::{Color, Colorize};

use tempobench_core::{human_readable_number, RunData};

use crate::{Reporter, RunContext};

/// Prefix printed in front of every reported line in debug builds.
fn line_prefix() -> &'static str {
    if cfg!(debug_assertions) {
        "DEBUG: "
    } else {
        ""
    }
}

/// Prints a context header followed by one line per run: name, real and
/// CPU nanoseconds per iteration, iteration count, and a rate/label
/// suffix.
pub struct ConsoleReporter {
    color: bool,
    print_memory: bool,
    name_field_width: usize,
}

impl ConsoleReporter {
    /// A reporter writing to stdout. `color` enables ANSI colors;
    /// `print_memory` appends peak-heap figures when present.
    pub fn new(color: bool, print_memory: bool) -> Self {
        ConsoleReporter {
            color,
            print_memory,
            name_field_width: 10,
        }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn memory_suffix(&self, bytes: f64) -> String {
        if !self.print_memory || bytes < 0.0 {
            return String::new();
        }
        format!(" {}B peak-mem", human_readable_number(bytes))
    }

    fn print_run_data(&self, result: &RunData) {
        let rate = if result.bytes_per_second > 0.0 {
            format!(" {}B/s", human_readable_number(result.bytes_per_second))
        } else {
            String::new()
        };
        let items = if result.items_per_second > 0.0 {
            format!(" {} items/s", human_readable_number(result.items_per_second))
        } else {
            String::new()
        };

        let iterations = result.iterations.max(1) as f64;
        let name = format!(
            "{:<width$} ",
            result.benchmark_name,
            width = self.name_field_width
        );
        let times = format!(
            "{:>10.0} {:>10.0} ",
            result.real_accumulated_time * 1e9 / iterations,
            result.cpu_accumulated_time * 1e9 / iterations,
        );
        let iters = format!("{:>10}", result.iterations);

        println!(
            "{}{}{}{}{:>16} {} {}{}",
            line_prefix(),
            self.paint(&name, Color::Green),
            self.paint(&times, Color::Yellow),
            self.paint(&iters, Color::Cyan),
            rate,
            items,
            result.label,
            self.memory_suffix(result.max_heapbytes_used),
        );
    }
}

impl Reporter for ConsoleReporter {
    fn report_context(&mut self, context: &RunContext) -> bool {
        self.name_field_width = context.name_field_width;

        println!(
            "Benchmarking on {} X {:.0} MHz CPU{}",
            context.num_cpus,
            context.mhz_per_cpu,
            if context.num_cpus > 1 { "s" } else { "" }
        );
        println!("{}", Local::now().format("%Y/%m/%d-%H:%M:%S"));

        if context.cpu_scaling_enabled {
            eprintln!("CPU scaling is enabled: Benchmark timings may be noisy.");
        }

        let header = format!(
            "{}{:<width$} {:>10} {:>10} {:>10}",
            line_prefix(),
            "Benchmark",
            "Time(ns)",
            "CPU(ns)",
            "Iterations",
            width = self.name_field_width
        );
        println!("{header}");
        println!("{}", "-".repeat(header.len()));

        true
    }

    fn report_runs(&mut self, runs: &[RunData]) {
        for run in runs {
            self.print_run_data(run);
        }
        if runs.len() >= 2 {
            println!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_suffix_respects_request_flag() {
        let silent = ConsoleReporter::new(false, false);
        assert_eq!(silent.memory_suffix(4096.0), "");

        let verbose = ConsoleReporter::new(false, true);
        assert_eq!(verbose.memory_suffix(4096.0), " 4.0kB peak-mem");
        assert_eq!(verbose.memory_suffix(-1.0), "");
    }

    #[test]
    fn paint_is_plain_without_color() {
        // The colored crate may itself strip colors off-tty, so only the
        // disabled path has a guaranteed rendering.
        let plain = ConsoleReporter::new(false, false);
        assert_eq!(plain.paint("abc", Color::Green), "abc");
    }

    #[test]
    fn reporting_smoke() {
        let mut reporter = ConsoleReporter::new(false, false);
        let context = RunContext {
            num_cpus: 2,
            mhz_per_cpu: 2400.0,
            cpu_scaling_enabled: false,
            name_field_width: 12,
        };
        assert!(reporter.report_context(&context));
        reporter.report_runs(&[RunData {
            benchmark_name: "smoke".to_string(),
            iterations: 1000,
            real_accumulated_time: 0.001,
            cpu_accumulated_time: 0.001,
            ..RunData::default()
        }]);
    }
}
