use std::path::PathBuf;

use nbgrade::{
    error::GradingError,
    harness::{ExecutionOptions, execute_submission},
    submission::{Cell, Submission},
};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("assignment")
}

fn options() -> ExecutionOptions {
    ExecutionOptions::builder()
        .test_dir(fixture_root().join("tests"))
        .build()
}

fn cells(sources: &[&str]) -> Submission {
    Submission::new(sources.iter().map(|source| Cell::code(*source)).collect())
}

const GRADER: &str = "import \"grading\" as g;\nlet grader = g::Notebook();";

#[test]
fn passing_notebook_earns_full_marks() {
    let submission = Submission::load(&fixture_root().join("submissions/passing.ipynb")).unwrap();
    let execution = execute_submission(&submission, &options()).unwrap();

    assert!(execution.failures.is_empty(), "{:?}", execution.failures);
    let names: Vec<&str> = execution.results.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["q1", "q2"]);

    let q1 = &execution.results[0];
    assert!(q1.passed_all());
    assert_eq!(q1.score(), 1.0);

    let q2 = &execution.results[1];
    assert!(q2.passed_all());
    assert_eq!(q2.score(), 3.0);

    assert_eq!(execution.stdout, "16\n");
}

#[test]
fn wrong_value_scores_zero() {
    let submission = cells(&[GRADER, "let a = 1;\nlet b = 3;\ngrader.check(\"q1\");"]);
    let execution = execute_submission(&submission, &options()).unwrap();

    let q1 = &execution.results[0];
    assert_eq!(q1.name, "q1");
    assert!(!q1.passed_all());
    assert_eq!(q1.score(), 0.0);
    assert!(q1.test_case_results[0].message.contains("Set a to 1 and b to 2."));
}

#[test]
fn checks_see_the_scope_at_call_time() {
    let submission = cells(&[
        GRADER,
        "let a = 1;\nlet b = 3;\ngrader.check(\"q1\");\nb = 2;",
    ]);
    let execution = execute_submission(&submission, &options()).unwrap();

    assert_eq!(execution.results[0].score(), 0.0);
    assert_eq!(execution.environment.get("b").unwrap().as_int().unwrap(), 2);
}

#[test]
fn aliased_imports_and_graders_are_captured() {
    let submission = cells(&[
        "import \"grading\" as nb;",
        "const my_grader = nb::Notebook(\"tests\");",
        "let a = 1;\nlet b = 2;\nlet r = my_grader.check(\"q1\");",
    ]);
    let execution = execute_submission(&submission, &options()).unwrap();

    assert!(execution.failures.is_empty(), "{:?}", execution.failures);
    assert_eq!(execution.results[0].name, "q1");
    assert!(execution.results[0].passed_all());
    assert!(execution.environment.contains("r"));
}

#[test]
fn unchecked_questions_run_against_the_final_environment() {
    let submission = cells(&["let a = 1;", "let b = 2;", "fn square(x) { x * x }"]);
    let execution = execute_submission(&submission, &options()).unwrap();

    let names: Vec<&str> = execution.results.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["q1", "q2"]);
    assert!(execution.results.iter().all(|file| file.passed_all()));
}

#[test]
fn failing_cells_are_skipped_when_ignoring_errors() {
    let submission = Submission::load(&fixture_root().join("submissions/failing.ipynb")).unwrap();
    let execution = execute_submission(&submission, &options()).unwrap();

    assert_eq!(execution.failures.len(), 1);
    assert_eq!(execution.failures[0].index, 2);

    let q2 = &execution.results[1];
    assert_eq!(q2.name, "q2");
    assert_eq!(q2.score(), 2.0);
    assert!(q2.passed_all_public());
    assert!(!q2.passed_all());
}

#[test]
fn failing_cells_abort_when_errors_matter() {
    let submission = Submission::load(&fixture_root().join("submissions/failing.ipynb")).unwrap();
    let options = ExecutionOptions::builder()
        .test_dir(fixture_root().join("tests"))
        .ignore_errors(false)
        .build();

    match execute_submission(&submission, &options) {
        Err(GradingError::SubmissionExecution { index, .. }) => assert_eq!(index, 2),
        other => panic!("expected a submission error, got {other:?}"),
    }
}

#[test]
fn functions_and_imports_persist_across_cells() {
    let options = ExecutionOptions::builder()
        .test_dir(fixture_root().join("tests"))
        .working_dir_addition(fixture_root().join("modules"))
        .build();
    let submission = cells(&[
        "import \"helpers\" as h;",
        "fn square(x) { x * x }",
        "let d = h::double(21);\nlet s = square(5);",
    ]);
    let execution = execute_submission(&submission, &options).unwrap();

    assert!(execution.failures.is_empty(), "{:?}", execution.failures);
    assert_eq!(execution.environment.get("d").unwrap().as_int().unwrap(), 42);
    assert_eq!(execution.environment.get("s").unwrap().as_int().unwrap(), 25);
}

#[test]
fn failed_imports_do_not_block_later_cells() {
    let submission = cells(&["import \"does_not_exist\" as missing;", "let a = 1;\nlet b = 2;"]);
    let execution = execute_submission(&submission, &options()).unwrap();

    assert_eq!(execution.failures.len(), 1);
    assert_eq!(execution.failures[0].index, 0);
    assert_eq!(execution.environment.get("a").unwrap().as_int().unwrap(), 1);

    let q1 = &execution.results[0];
    assert_eq!(q1.name, "q1");
    assert_eq!(q1.score(), 1.0);
}

#[test]
fn submissions_cannot_replace_assertions() {
    let submission = cells(&["fn assert_eq(x, y) { }\nfn square(x) { 0 }"]);
    let execution = execute_submission(&submission, &options()).unwrap();

    assert!(execution.failures.is_empty(), "{:?}", execution.failures);
    let q2 = &execution.results[1];
    assert_eq!(q2.name, "q2");
    // Only "square of zero" holds.
    assert_eq!(q2.score(), 1.0);
    assert!(!q2.passed_all_public());
}

#[test]
fn administrative_calls_do_nothing_during_grading() {
    let submission = cells(&[
        GRADER,
        "grader.export(\"lab.zip\");\ngrader.check_all();\ngrader.to_pdf();\nlet after = true;",
    ]);
    let execution = execute_submission(&submission, &options()).unwrap();

    assert!(execution.failures.is_empty(), "{:?}", execution.failures);
    assert!(execution.environment.contains("after"));
}

#[test]
fn seeded_runs_are_reproducible() {
    let options = ExecutionOptions::builder()
        .test_dir(fixture_root().join("tests"))
        .seed(42)
        .build();
    let submission = cells(&[
        "let first = rand_int(1, 1000000);",
        "let second = rand_int(1, 1000000);",
    ]);

    let one = execute_submission(&submission, &options).unwrap();
    let two = execute_submission(&submission, &options).unwrap();

    let value = |execution: &nbgrade::harness::Execution, name: &str| {
        execution.environment.get(name).unwrap().as_int().unwrap()
    };
    assert_eq!(value(&one, "first"), value(&two, "first"));
    assert_eq!(value(&one, "second"), value(&two, "second"));
    // Every cell is reseeded, so both cells draw the same number.
    assert_eq!(value(&one, "first"), value(&one, "second"));
}

#[test]
fn seed_variable_is_bound_once() {
    let options = ExecutionOptions::builder()
        .test_dir(fixture_root().join("tests"))
        .seed(7)
        .seed_variable("SEED")
        .build();
    let submission = cells(&["seed(SEED);\nlet roll = rand_int(1, 6);", "let copy = SEED;"]);
    let execution = execute_submission(&submission, &options).unwrap();

    assert!(execution.failures.is_empty(), "{:?}", execution.failures);
    assert_eq!(execution.environment.get("copy").unwrap().as_int().unwrap(), 7);
    let roll = execution.environment.get("roll").unwrap().as_int().unwrap();
    assert!((1..=6).contains(&roll));
}

#[test]
fn checking_an_unknown_question_fails_the_cell() {
    let submission = cells(&[GRADER, "grader.check(\"q9\");"]);
    let execution = execute_submission(&submission, &options()).unwrap();

    assert_eq!(execution.failures.len(), 1);
    assert_eq!(execution.failures[0].index, 1);
    assert!(execution.failures[0].message.contains("q9"));
}

#[test]
fn operation_limit_stops_runaway_cells() {
    let options = ExecutionOptions::builder()
        .test_dir(fixture_root().join("tests"))
        .max_operations(10_000)
        .build();
    let submission = cells(&["let n = 0;\nloop { n += 1; }", "let after = 1;"]);
    let execution = execute_submission(&submission, &options).unwrap();

    assert_eq!(execution.failures.len(), 1);
    assert_eq!(execution.failures[0].index, 0);
    assert!(execution.environment.contains("after"));
}
