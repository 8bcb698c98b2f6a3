#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # nbgrade
//!
//! Grades a notebook submission against a directory of test files and writes
//! a Gradescope `results.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use nbgrade::{
    config::{GradingConfig, ReportConfig},
    constants::DEFAULT_RESULTS_PATH,
    error::GradingError,
    grade::GradingResults,
    submission::Submission,
};
use tabled::{Table, settings::Style};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Arguments of the `grade` subcommand.
#[derive(Debug, Clone)]
struct GradeArgs {
    /// JSON configuration file.
    config:     Option<PathBuf>,
    /// Test directory override.
    tests:      Option<PathBuf>,
    /// Log file override.
    log:        Option<PathBuf>,
    /// Replay the log instead of executing.
    from_log:   bool,
    /// Where to write the report.
    output:     PathBuf,
    /// Debug logging.
    verbose:    bool,
    /// Notebook or script to grade.
    submission: PathBuf,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade one submission
    Grade(GradeArgs),
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    let config = long("config")
        .short('c')
        .help("JSON grading configuration")
        .argument::<PathBuf>("PATH")
        .optional();
    let tests = long("tests")
        .short('t')
        .help("Directory of test files")
        .argument::<PathBuf>("DIR")
        .optional();
    let log = long("log")
        .short('l')
        .help("Log file to record to, or replay from")
        .argument::<PathBuf>("PATH")
        .optional();
    let from_log = long("from-log")
        .help("Grade from the log instead of executing the submission")
        .switch();
    let output = long("output")
        .short('o')
        .help("Where to write results.json")
        .argument::<PathBuf>("PATH")
        .fallback(PathBuf::from(DEFAULT_RESULTS_PATH));
    let verbose = long("verbose").short('v').help("Show debug output").switch();
    let submission = positional::<PathBuf>("SUBMISSION").help("Notebook or .rhai script to grade");

    let grade = construct!(GradeArgs {
        config,
        tests,
        log,
        from_log,
        output,
        verbose,
        submission
    })
    .to_options()
    .command("grade")
    .help("Grade a submission")
    .map(Cmd::Grade);

    grade.to_options().descr("Notebook submission grader").run()
}

/// Loads the configuration and applies command line overrides.
fn load_config(args: &GradeArgs) -> Result<GradingConfig> {
    let mut config = match &args.config {
        Some(path) => GradingConfig::from_file(path)?,
        None => GradingConfig::default(),
    }
    .with_env_overrides()?;

    if let Some(tests) = &args.tests {
        config.test_dir = tests.clone();
    }
    if let Some(log) = &args.log {
        config.log_path = Some(log.clone());
    }
    if args.from_log {
        config.grade_from_log = true;
    }
    Ok(config)
}

/// Results for a run that could not start grading.
fn failed_before_grading(err: anyhow::Error) -> GradingResults {
    tracing::error!("{err:#}");
    GradingResults::without_results(&GradingError::catastrophic(err))
}

fn main() -> Result<()> {
    dotenv().ok();

    let Cmd::Grade(args) = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    });
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let (results, report) = match load_config(&args) {
        Ok(config) => {
            let results = match Submission::load(&args.submission) {
                Ok(submission) => nbgrade::grade(&submission, &config),
                Err(e) => failed_before_grading(e.into()),
            };
            (results, config.report)
        }
        Err(e) => (failed_before_grading(e), ReportConfig::default()),
    };

    if !results.has_catastrophic_failure() {
        let mut table = Table::new(results.score_rows());
        table.with(Style::modern());
        eprintln!("{table}");
        eprintln!(
            "Total: {:.2}/{:.2} ({:.1}%)",
            results.total(),
            results.possible(),
            results.percent() * 100.0
        );
    }

    results
        .write_report(&args.output, &report)
        .with_context(|| format!("Could not write report to {}", args.output.display()))?;

    Ok(())
}
