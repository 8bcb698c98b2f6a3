#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grading configuration, read from a JSON file with environment overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{constants::DEFAULT_TEST_DIR, harness::ExecutionOptions, log::AdmissionFilter};

/// Controls how results are rendered for Gradescope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct ReportConfig {
    /// Rescale the final score to this many points.
    pub points_possible:           Option<f64>,
    /// Show captured stdout once grades are published.
    #[builder(default)]
    pub show_stdout:               bool,
    /// Show hidden test results once grades are published.
    #[builder(default)]
    pub show_hidden:               bool,
    /// Always include the public test summary item.
    #[builder(default)]
    pub force_public_test_summary: bool,
    /// Collapse the score to all-or-nothing at this fraction of points.
    pub score_threshold:           Option<f64>,
}

/// Everything needed to grade one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct GradingConfig {
    /// Report rendering options.
    #[serde(flatten)]
    #[builder(default)]
    pub report:               ReportConfig,
    /// Directory of test specifications.
    #[builder(default = PathBuf::from(DEFAULT_TEST_DIR), into)]
    pub test_dir:             PathBuf,
    /// Keep executing after a failing cell.
    #[builder(default = true)]
    pub ignore_errors:        bool,
    /// Seed for the script randomness functions.
    pub seed:                 Option<i64>,
    /// Bind the seed to this variable instead of reseeding every cell.
    #[builder(into)]
    pub seed_variable:        Option<String>,
    /// Extra directory from which submissions may import script modules.
    #[builder(into)]
    pub working_dir_addition: Option<PathBuf>,
    /// Replay the submission's log instead of executing it.
    #[builder(default)]
    pub grade_from_log:       bool,
    /// Log file written during execution and read during replay.
    #[builder(into)]
    pub log_path:             Option<PathBuf>,
    /// Admission filter for shelving and unshelving environments.
    pub variables:            Option<AdmissionFilter>,
    /// Upper bound on script operations per cell.
    pub max_operations:       Option<u64>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        GradingConfig::builder().build()
    }
}

impl GradingConfig {
    /// Reads a configuration file, filling unspecified fields with defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Could not parse config file {}", path.display()))
    }

    /// Applies `NBGRADE_TEST_DIR`, `NBGRADE_SEED` and `NBGRADE_LOG_PATH` on top
    /// of the current values.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(dir) = read_env("NBGRADE_TEST_DIR") {
            self.test_dir = PathBuf::from(dir);
        }
        if let Some(seed) = read_env("NBGRADE_SEED") {
            self.seed = Some(
                seed.parse()
                    .with_context(|| format!("NBGRADE_SEED is not an integer: {seed}"))?,
            );
        }
        if let Some(path) = read_env("NBGRADE_LOG_PATH") {
            self.log_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Options for the execution harness derived from this configuration.
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions::builder()
            .ignore_errors(self.ignore_errors)
            .maybe_seed(self.seed)
            .maybe_seed_variable(self.seed_variable.clone())
            .maybe_working_dir_addition(self.working_dir_addition.clone())
            .test_dir(self.test_dir.clone())
            .maybe_log_path(if self.grade_from_log {
                None
            } else {
                self.log_path.clone()
            })
            .maybe_admission_filter(self.variables.clone())
            .maybe_max_operations(self.max_operations)
            .build()
    }
}

/// Returns a trimmed, non-empty environment variable.
fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
