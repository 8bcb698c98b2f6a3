#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The `grading` script module and its `Notebook` grader type.

use std::sync::Arc;

use rhai::{
    CustomType, Dynamic, EvalAltResult, EvalContext, Expression, ImmutableString, Module,
    TypeBuilder,
};

use super::{environment::ScriptContext, session::Session};
use crate::{constants::GRADER_TYPE, log::EventType, log::LogEntry};

/// Map host errors into script errors with string messages.
fn host_err<E: std::fmt::Display>(e: E) -> Box<EvalAltResult> {
    e.to_string().into()
}

/// The grader object submissions construct with `Notebook()`.
#[derive(Debug, Clone)]
pub struct Notebook {
    /// Session the grader reports to.
    session: Arc<Session>,
}

impl Notebook {
    /// A grader bound to `session`.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Reached only when a check call escaped instrumentation, for example
    /// through a copied reference to the grader.
    fn check(&mut self, question: Dynamic) {
        tracing::warn!(
            "Ignoring check of {question}: the call was not made directly on the grader variable"
        );
    }

    /// Runs every question interactively.
    fn check_all(&mut self) {
        self.administrative("check_all", EventType::BeginCheckAll, EventType::EndCheckAll);
    }

    /// Packages the submission.
    fn export(&mut self) {
        self.administrative("export", EventType::BeginExport, EventType::EndExport);
    }

    /// Packages the submission under a file name.
    fn export_to(&mut self, _path: Dynamic) {
        self.export();
    }

    /// Renders the submission to a document.
    fn to_pdf(&mut self) {
        if self.session.is_headless() {
            tracing::debug!("Skipping to_pdf while grading");
            return;
        }
        if let Some(recorder) = self.session.recorder() {
            recorder.record(&LogEntry::event(EventType::ToExternalFormat));
        }
        tracing::info!("to_pdf has no effect in this environment");
    }

    /// Renders the submission to a named document.
    fn to_pdf_at(&mut self, _path: Dynamic) {
        self.to_pdf();
    }

    /// Shared behaviour of the administrative methods: nothing while
    /// headless, otherwise a begin and end entry in the log.
    fn administrative(&self, method: &str, begin: EventType, end: EventType) {
        if self.session.is_headless() {
            tracing::debug!("Skipping {method} while grading");
            return;
        }
        let recorder = self.session.recorder();
        if let Some(recorder) = recorder {
            recorder.record(&LogEntry::event(begin));
        }
        tracing::info!("{method} has no effect in this environment");
        if let Some(recorder) = recorder {
            recorder.record(&LogEntry::event(end));
        }
    }
}

impl CustomType for Notebook {
    fn build(mut builder: TypeBuilder<Self>) {
        builder
            .with_name(GRADER_TYPE)
            .with_fn("check", Notebook::check)
            .with_fn("check_all", Notebook::check_all)
            .with_fn("export", Notebook::export)
            .with_fn("export", Notebook::export_to)
            .with_fn("to_pdf", Notebook::to_pdf)
            .with_fn("to_pdf", Notebook::to_pdf_at);
    }
}

/// Builds the `grading` module for one session. `Notebook()` and
/// `Notebook(test_dir)` both construct a grader; the directory argument is
/// accepted for compatibility and ignored.
pub fn module(session: &Arc<Session>) -> Module {
    let mut module = Module::new();

    let for_new = Arc::clone(session);
    module.set_native_fn(GRADER_TYPE, move || -> Result<Notebook, Box<EvalAltResult>> {
        Ok(Notebook::new(Arc::clone(&for_new)))
    });

    let for_dir = Arc::clone(session);
    module.set_native_fn(
        GRADER_TYPE,
        move |test_dir: ImmutableString| -> Result<Notebook, Box<EvalAltResult>> {
            tracing::debug!("Ignoring grader test directory {test_dir}");
            Ok(Notebook::new(Arc::clone(&for_dir)))
        },
    );

    module.build_index();
    module
}

/// Handler for the capture syntax `grading_capture <grader> (<question>)`.
///
/// Runs the question's test file against a copy of the live scope, records
/// the result with the session (and in the log, with a shelf, when logging
/// is enabled) and returns it to the script.
pub fn capture_check(
    session: &Session,
    context: &mut EvalContext,
    inputs: &[Expression],
) -> Result<Dynamic, Box<EvalAltResult>> {
    let grader = inputs[0].get_string_value().unwrap_or_default().to_string();
    if context.scope().get_value::<Notebook>(&grader).is_none() {
        return Err(host_err(format!("`{grader}` is not a grader")));
    }

    let question = context
        .eval_expression_tree(&inputs[1])?
        .into_string()
        .map_err(|_| host_err("Question names must be strings"))?;
    let test_file = session.tests().get(&question).map_err(host_err)?;

    let result = {
        let prelude = session.prelude();
        let runner = ScriptContext::new(context.engine(), context.scope(), &prelude);
        let result = test_file.run_copy(&runner);
        if let Some(recorder) = session.recorder()
            && let Err(e) =
                recorder.record_check(&question, context.scope(), &prelude.definitions, &result)
        {
            tracing::warn!("Could not record check of {question}: {e}");
        }
        result
    };

    tracing::debug!(
        "Checked {question}: {:.2}/{:.2}",
        result.score(),
        result.possible()
    );
    session.push_captured(result.clone());
    Ok(Dynamic::from(result))
}
