#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grading from a log instead of re-running the submission.

use rhai::Scope;

use crate::{
    error::GradingError,
    grade::{TestCollection, TestFile},
    harness::ExecutionOptions,
    instrument::collect_imports,
    log::{Log, unshelve},
    runtime::{Environment, ScriptContext, Session, create_engine},
    submission::Submission,
};

/// Rebuilds each logged question's environment and runs its test file.
///
/// Only the submission's imports are evaluated. Every question with a check
/// entry in `log` is then unshelved from its most recent entry into a copy
/// of that import-only environment and checked, newest question first.
///
/// * `submission`: source of the imports
/// * `log`: the recorded session
/// * `tests`: test files to run
/// * `options`: engine options and the admission filter
pub fn replay_log(
    submission: &Submission,
    log: &Log,
    tests: TestCollection,
    options: &ExecutionOptions,
) -> Result<Vec<TestFile>, GradingError> {
    let replay_options = ExecutionOptions {
        log_path: None,
        ..options.clone()
    };
    let session = Session::new(tests, &replay_options);
    let engine = create_engine(&session, &replay_options)?;
    let _headless = session.headless();

    let mut base = Environment::default();
    for (index, cell) in submission.code_cells() {
        for statement in collect_imports(&cell.source) {
            engine
                .run_with_scope(&mut Scope::new(), &statement)
                .map_err(|e| GradingError::SubmissionExecution {
                    index,
                    message: e.to_string(),
                })?;
            base.prelude.add_import(&statement);
        }
    }

    let mut results = Vec::new();
    for entry in log.question_iterator() {
        let Some(question) = entry.question.as_deref() else {
            continue;
        };
        let test_file = session.tests().get(question)?;
        let shelf = entry.shelf.as_deref().ok_or_else(|| {
            GradingError::ShelfDeserialization(format!("no shelf recorded for {question}"))
        })?;

        let environment =
            unshelve(&engine, shelf, options.admission_filter.as_ref(), &base)?;
        let result = test_file.run_copy(&ScriptContext::for_environment(&engine, &environment));
        tracing::debug!(
            "Replayed {question}: {:.2}/{:.2}",
            result.score(),
            result.possible()
        );
        results.push(result);
    }

    Ok(results)
}
