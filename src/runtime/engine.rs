#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Engine construction for one grading session.

use std::sync::Arc;

use rand::{Rng, seq::SliceRandom};
use rhai::{
    Array, Dynamic, Engine, EvalAltResult, ImmutableString, NativeCallContext,
    module_resolvers::{FileModuleResolver, ModuleResolversCollection, StaticModuleResolver},
};

use super::{
    notebook::{self, Notebook},
    session::Session,
};
use crate::{
    constants::{CAPTURE_KEYWORD, GRADER_MODULE},
    error::GradingError,
    grade::TestFile,
    harness::ExecutionOptions,
    log::ShelfValue,
};

/// Result type of fallible host functions.
type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// Creates and returns a new `Engine` with the grading module, the capture
/// syntax and every host function registered.
pub fn create_engine(
    session: &Arc<Session>,
    options: &ExecutionOptions,
) -> Result<Engine, GradingError> {
    let mut engine = Engine::new();

    let mut grading = StaticModuleResolver::new();
    grading.insert(GRADER_MODULE, notebook::module(session));
    let mut resolvers = ModuleResolversCollection::new();
    resolvers.push(grading);
    if let Some(dir) = &options.working_dir_addition {
        resolvers.push(FileModuleResolver::new_with_path(dir.clone()));
    }
    engine.set_module_resolver(resolvers);

    if let Some(max) = options.max_operations {
        engine.set_max_operations(max);
    }

    engine.build_type::<Notebook>();
    register_results(&mut engine);
    register_assertions(&mut engine);
    register_randomness(&mut engine, session);

    let for_print = Arc::clone(session);
    engine.on_print(move |text| for_print.append_stdout(text));
    let for_debug = Arc::clone(session);
    engine.on_debug(move |text, _, _| for_debug.append_stdout(text));

    let token = session.cancellation().clone();
    engine.on_progress(move |_| {
        token
            .is_cancelled()
            .then(|| Dynamic::from("Execution was cancelled"))
    });

    let for_capture = Arc::clone(session);
    engine
        .register_custom_syntax([CAPTURE_KEYWORD, "$ident$", "$expr$"], false, move |context, inputs| {
            notebook::capture_check(&for_capture, context, inputs)
        })
        .map_err(|e| GradingError::Engine(e.to_string()))?;

    Ok(engine)
}

/// Exposes captured results to scripts.
fn register_results(engine: &mut Engine) {
    engine
        .register_type_with_name::<TestFile>("TestFileResult")
        .register_get("name", |file: &mut TestFile| file.name.clone())
        .register_get("score", |file: &mut TestFile| file.score())
        .register_get("possible", |file: &mut TestFile| file.possible())
        .register_get("passed_all", |file: &mut TestFile| file.passed_all())
        .register_fn("to_string", |file: &mut TestFile| file.to_string())
        .register_fn("to_debug", |file: &mut TestFile| file.to_string());
}

/// `assert(cond)`, `assert(cond, message)` and `assert_eq(left, right)`.
fn register_assertions(engine: &mut Engine) {
    engine
        .register_fn("assert", |condition: bool| -> HostResult<()> {
            if condition {
                Ok(())
            } else {
                Err("Assertion failed".into())
            }
        })
        .register_fn(
            "assert",
            |condition: bool, message: ImmutableString| -> HostResult<()> {
                if condition {
                    Ok(())
                } else {
                    Err(format!("Assertion failed: {message}").into())
                }
            },
        )
        .register_fn(
            "assert_eq",
            |context: NativeCallContext, left: Dynamic, right: Dynamic| -> HostResult<()> {
                let equal = context
                    .call_fn::<bool>("==", (left.clone(), right.clone()))
                    .unwrap_or_else(|_| {
                        let shelved = ShelfValue::from_dynamic(&left);
                        shelved.is_some() && shelved == ShelfValue::from_dynamic(&right)
                    });
                if equal {
                    Ok(())
                } else {
                    Err(format!("Assertion failed: {left} != {right}").into())
                }
            },
        );
}

/// `seed`, `rand`, `rand_float`, `rand_int` and `shuffle`, all drawing from
/// the session's generator.
fn register_randomness(engine: &mut Engine, session: &Arc<Session>) {
    let s = Arc::clone(session);
    engine.register_fn("seed", move |seed: i64| s.reseed(seed));

    let s = Arc::clone(session);
    engine.register_fn("rand", move || s.with_rng(|rng| rng.r#gen::<i64>()));

    let s = Arc::clone(session);
    engine.register_fn("rand_float", move || s.with_rng(|rng| rng.r#gen::<f64>()));

    let s = Arc::clone(session);
    engine.register_fn("rand_int", move |low: i64, high: i64| -> HostResult<i64> {
        if low > high {
            return Err(format!("rand_int: {low} is greater than {high}").into());
        }
        Ok(s.with_rng(|rng| rng.gen_range(low..=high)))
    });

    let s = Arc::clone(session);
    engine.register_fn("shuffle", move |array: &mut Array| {
        s.with_rng(|rng| array.shuffle(rng));
    });
}
