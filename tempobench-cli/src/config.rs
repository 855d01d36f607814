//! Configuration loading from tempo.toml
//!
//! Harness defaults can be specified in a `tempo.toml` discovered by
//! walking up from the current directory. Command-line flags override
//! anything set here; built-in defaults fill the rest.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root of a `tempo.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TempoConfig {
    /// Measurement budgets.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Reporting options.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[runner]` table: iteration and time budgets.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    /// Lower bound on significant measurement time, in seconds.
    #[serde(default)]
    pub min_time: Option<f64>,
    /// Minimum total iterations per benchmark.
    #[serde(default)]
    pub min_iters: Option<u64>,
    /// Maximum total iterations per benchmark.
    #[serde(default)]
    pub max_iters: Option<u64>,
    /// Runs per instance; 2 or more adds mean/stddev rows.
    #[serde(default)]
    pub repetitions: Option<usize>,
}

/// `[output]` table: reporting options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// ANSI colors in the console reporter.
    #[serde(default)]
    pub color: Option<bool>,
    /// Report peak heap usage (interface only).
    #[serde(default)]
    pub memory_usage: Option<bool>,
}

impl TempoConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Discover and load configuration by walking up from the current
    /// directory.
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("tempo.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }
}
