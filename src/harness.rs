#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Direct re-execution of a submission, cell by cell.

use std::{collections::HashSet, path::PathBuf, sync::Arc};

use bon::Builder;
use rhai::{Engine, Scope};

use crate::{
    constants::DEFAULT_TEST_DIR,
    error::GradingError,
    grade::{TestCollection, TestFile},
    instrument::{CheckCallState, instrument},
    log::{AdmissionFilter, EventType, LogEntry},
    runtime::{CancellationToken, Environment, ScriptContext, Session, create_engine},
    submission::Submission,
};

/// Options controlling one execution.
#[derive(Debug, Clone, Builder)]
pub struct ExecutionOptions {
    /// Continue with the next cell when one fails.
    #[builder(default = true)]
    pub ignore_errors:        bool,
    /// Seed for script randomness.
    pub seed:                 Option<i64>,
    /// Variable bound to the seed once, instead of reseeding every cell.
    #[builder(into)]
    pub seed_variable:        Option<String>,
    /// Extra directory script modules may be imported from.
    #[builder(into)]
    pub working_dir_addition: Option<PathBuf>,
    /// Directory of test specifications.
    #[builder(default = PathBuf::from(DEFAULT_TEST_DIR), into)]
    pub test_dir:             PathBuf,
    /// Record checks, with shelves, to this log file.
    #[builder(into)]
    pub log_path:             Option<PathBuf>,
    /// Admission filter used when shelving.
    pub admission_filter:     Option<AdmissionFilter>,
    /// Upper bound on script operations per evaluation.
    pub max_operations:       Option<u64>,
    /// Hook for an external watchdog.
    #[builder(default)]
    pub cancellation:         CancellationToken,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        ExecutionOptions::builder().build()
    }
}

/// A cell failure that was absorbed because errors were ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Position of the cell in the submission.
    pub index:   usize,
    /// What went wrong.
    pub message: String,
}

/// Outcome of executing a submission.
#[derive(Debug)]
pub struct Execution {
    /// Final variables, imports and functions.
    pub environment: Environment,
    /// Captured checks in call order, then the remaining test files in name
    /// order.
    pub results:     Vec<TestFile>,
    /// Absorbed cell failures.
    pub failures:    Vec<UnitFailure>,
    /// Everything the submission printed.
    pub stdout:      String,
}

/// Loads the test files from `options.test_dir` and executes `submission`
/// against them.
pub fn execute_submission(
    submission: &Submission,
    options: &ExecutionOptions,
) -> Result<Execution, GradingError> {
    let tests = TestCollection::load(&options.test_dir)?;
    execute_with_tests(submission, tests, options)
}

/// Executes every code cell of `submission` in order, capturing check calls,
/// then runs every test file that was not checked against the final
/// environment.
///
/// * `submission`: cells to run
/// * `tests`: test files checks are run against
/// * `options`: execution options
pub fn execute_with_tests(
    submission: &Submission,
    tests: TestCollection,
    options: &ExecutionOptions,
) -> Result<Execution, GradingError> {
    let session = Session::new(tests, options);
    let engine = create_engine(&session, options)?;
    let mut scope = Scope::new();

    if let Some(seed) = options.seed
        && let Some(variable) = &options.seed_variable
    {
        scope.push(variable.clone(), seed);
    }

    if let Some(recorder) = session.recorder() {
        LogEntry::event(EventType::Init).flush_to_file(&recorder.path)?;
    }

    let mut state = CheckCallState::default();
    let mut failures = Vec::new();

    for (index, cell) in submission.code_cells() {
        let outcome = {
            let _headless = session.headless();
            run_unit(&engine, &session, &mut scope, &mut state, &cell.source, options)
        };

        match outcome {
            Ok(()) => tracing::debug!("Cell {index} executed"),
            Err(message) if session.cancellation().is_cancelled() => {
                tracing::warn!("Execution cancelled in cell {index}");
                return Err(GradingError::SubmissionExecution { index, message });
            }
            Err(message) if options.ignore_errors => {
                tracing::warn!("Cell {index} failed, continuing: {message}");
                failures.push(UnitFailure { index, message });
            }
            Err(message) => return Err(GradingError::SubmissionExecution { index, message }),
        }
    }

    let prelude = session.prelude().clone();
    let environment = Environment { scope, prelude };

    let mut results = session.take_captured();
    let triggered: HashSet<String> = results.iter().map(|file| file.name.clone()).collect();
    let runner = ScriptContext::for_environment(&engine, &environment);
    for file in session.tests().iter() {
        if !triggered.contains(&file.name) {
            tracing::debug!("Running {} against the final environment", file.name);
            results.push(file.run_copy(&runner));
        }
    }

    Ok(Execution {
        environment,
        results,
        failures,
        stdout: session.take_stdout(),
    })
}

/// Instruments and evaluates one cell in the persistent scope.
fn run_unit(
    engine: &Engine,
    session: &Arc<Session>,
    scope: &mut Scope<'static>,
    state: &mut CheckCallState,
    source: &str,
    options: &ExecutionOptions,
) -> Result<(), String> {
    let instrumented = instrument(source, state);
    if instrumented.captured + instrumented.removed > 0 {
        tracing::debug!(
            "Instrumented {} check(s), removed {} administrative call(s)",
            instrumented.captured,
            instrumented.removed
        );
    }

    let body = match (options.seed, &options.seed_variable) {
        (Some(seed), None) => format!("seed({seed});\n{}", instrumented.source),
        _ => instrumented.source.clone(),
    };

    // Only imports that resolve on their own are carried into later units.
    let known = session.prelude().imports.clone();
    let resolved: Vec<&String> = instrumented
        .imports
        .iter()
        .filter(|statement| !known.contains(statement))
        .filter(|statement| match engine.run_with_scope(&mut scope.clone(), statement) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Not carrying `{statement}` forward: {e}");
                false
            }
        })
        .collect();

    let ast = {
        let mut prelude = session.prelude_mut();
        for statement in resolved {
            prelude.add_import(statement);
        }
        let unit = engine
            .compile(prelude.with_imports(&body))
            .map_err(|e| e.to_string())?;
        prelude.add_definitions(&instrumented.source, &unit);
        prelude.library.merge(&unit)
    };

    engine
        .run_ast_with_scope(scope, &ast)
        .map_err(|e| e.to_string())
}
