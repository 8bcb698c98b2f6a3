//! # nbgrade
//!
//! A grading engine for notebook submissions written in Rhai. Submissions are
//! executed cell by cell with their grading calls captured, or rebuilt from a
//! log of environment snapshots, and scored against instructor-authored test
//! files.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Grading configuration
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Error taxonomy
pub mod error;
/// Test cases, test files, scoring and reports
pub mod grade;
/// Cell-by-cell execution of submissions
pub mod harness;
/// Rewriting of grading calls in submitted code
pub mod instrument;
/// Execution log and environment snapshots
pub mod log;
/// Grading from a recorded log
pub mod replay;
/// Script engine, grader type and per-submission state
pub mod runtime;
/// Submission documents
pub mod submission;

use config::GradingConfig;
use error::GradingError;
use grade::{GradingResults, TestCollection};
use harness::execute_with_tests;
use replay::replay_log;
use submission::Submission;

/// Grades `submission`. Never fails: anything that prevents grading is
/// reported as a catastrophic result that still renders to a valid report.
pub fn grade(submission: &Submission, config: &GradingConfig) -> GradingResults {
    match try_grade(submission, config) {
        Ok(results) => results,
        Err(e) => {
            tracing::error!("Grading failed: {e}");
            let e = match e {
                GradingError::CatastrophicGradingFailure(_) => e,
                other => GradingError::catastrophic(other),
            };
            GradingResults::without_results(&e)
        }
    }
}

/// Grades `submission`, propagating every error.
pub fn try_grade(
    submission: &Submission,
    config: &GradingConfig,
) -> Result<GradingResults, GradingError> {
    let options = config.execution_options();
    let tests = TestCollection::load(&options.test_dir)?;
    if tests.is_empty() {
        return Err(GradingError::CatastrophicGradingFailure(format!(
            "No test files found in {}",
            options.test_dir.display()
        )));
    }

    if config.grade_from_log {
        let path = config.log_path.as_ref().ok_or_else(|| {
            GradingError::CatastrophicGradingFailure(
                "Grading from a log requires a log path".to_string(),
            )
        })?;
        let log = log::Log::from_file(path)?;
        let results = replay_log(submission, &log, tests, &options)?;
        return Ok(GradingResults::new(results));
    }

    let execution = execute_with_tests(submission, tests, &options)?;
    for failure in &execution.failures {
        tracing::info!("Cell {} raised: {}", failure.index, failure.message);
    }

    let mut results = GradingResults::new(execution.results);
    if config.report.show_stdout && !execution.stdout.is_empty() {
        results.set_output(execution.stdout);
    }
    Ok(results)
}
