use std::{collections::BTreeMap, path::PathBuf};

use nbgrade::{
    constants::SHELF_VERSION,
    error::GradingError,
    grade::{GradingResults, TestCollection},
    harness::{ExecutionOptions, execute_submission},
    log::{AdmissionFilter, EventType, Log, LogEntry, Shelf, ShelfValue, ShelvedBinding},
    replay::replay_log,
    submission::{Cell, Submission},
};
use tempfile::TempDir;

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("assignment")
}

fn tests() -> TestCollection {
    TestCollection::load(&fixture_root().join("tests")).unwrap()
}

fn cells(sources: &[&str]) -> Submission {
    Submission::new(sources.iter().map(|source| Cell::code(*source)).collect())
}

const GRADER: &str = "import \"grading\" as g;\nlet grader = g::Notebook();";

fn logged_options(log_path: PathBuf, filter: Option<AdmissionFilter>) -> ExecutionOptions {
    ExecutionOptions::builder()
        .test_dir(fixture_root().join("tests"))
        .log_path(log_path)
        .maybe_admission_filter(filter)
        .build()
}

#[test]
fn checks_are_logged_with_shelves() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("grading.log");
    let submission = cells(&[GRADER, "let a = 1;\nlet b = 2;\ngrader.check(\"q1\");"]);

    execute_submission(&submission, &logged_options(log_path.clone(), None)).unwrap();

    let log = Log::from_file(&log_path).unwrap();
    let kinds: Vec<EventType> = log.entries().iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, [EventType::Init, EventType::Check]);

    let entry = log.get_question_entry("q1").unwrap();
    assert!(entry.success);
    assert!(entry.not_shelved.contains(&"grader".to_string()));
    assert_eq!(entry.results.as_ref().unwrap().score(), 1.0);

    let shelf: Shelf = serde_json::from_str(entry.shelf.as_deref().unwrap()).unwrap();
    assert_eq!(shelf.version, SHELF_VERSION);
    let names: Vec<&str> = shelf.bindings.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn rechecking_keeps_only_the_latest_shelf() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("grading.log");
    let submission = cells(&[
        GRADER,
        "let a = 1;\nlet b = 3;\ngrader.check(\"q1\");",
        "b = 2;\ngrader.check(\"q1\");",
    ]);

    execute_submission(&submission, &logged_options(log_path.clone(), None)).unwrap();

    let log = Log::from_file(&log_path).unwrap();
    let checks: Vec<&LogEntry> = log
        .entries()
        .iter()
        .filter(|e| e.event_type == EventType::Check)
        .collect();
    assert_eq!(checks.len(), 2);
    assert!(checks[0].shelf.is_none());
    assert!(checks[1].shelf.is_some());
    assert_eq!(log.question_iterator().count(), 1);

    let replayed = replay_log(&submission, &log, tests(), &ExecutionOptions::default()).unwrap();
    assert_eq!(replayed.len(), 1);
    assert!(replayed[0].passed_all());
}

#[test]
fn replay_uses_the_environment_at_check_time() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("grading.log");
    let submission = cells(&[
        GRADER,
        "let a = 1;\nlet b = 3;\ngrader.check(\"q1\");",
        "b = 2;",
    ]);

    let execution =
        execute_submission(&submission, &logged_options(log_path.clone(), None)).unwrap();
    assert_eq!(execution.results[0].score(), 0.0);

    let log = Log::from_file(&log_path).unwrap();
    let replayed = replay_log(&submission, &log, tests(), &ExecutionOptions::default()).unwrap();
    assert_eq!(replayed[0].name, "q1");
    assert_eq!(replayed[0].score(), 0.0);
}

#[test]
fn replay_is_idempotent_and_restores_functions() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("grading.log");
    let submission = cells(&[
        GRADER,
        "let a = 1;\nlet b = 2;\ngrader.check(\"q1\");",
        "fn square(x) { x * x }",
        "grader.check(\"q2\");",
    ]);

    execute_submission(&submission, &logged_options(log_path.clone(), None)).unwrap();
    let log = Log::from_file(&log_path).unwrap();

    let first = replay_log(&submission, &log, tests(), &ExecutionOptions::default()).unwrap();
    let second = replay_log(&submission, &log, tests(), &ExecutionOptions::default()).unwrap();
    assert_eq!(first, second);

    // Newest question first.
    let names: Vec<&str> = first.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["q2", "q1"]);
    assert_eq!(first[0].score(), 3.0);

    let results = GradingResults::new(first);
    assert!(results.verify_against_log(&log, false).is_empty());
}

#[test]
fn type_filter_keeps_mistyped_values_off_the_shelf() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("grading.log");
    let filter = AdmissionFilter::Types(BTreeMap::from([
        ("a".to_string(), "i64".to_string()),
        ("b".to_string(), "i64".to_string()),
    ]));
    let submission = cells(&[
        GRADER,
        "let a = 1;\nlet b = \"2\";\nlet scratch = 5;\ngrader.check(\"q1\");",
    ]);

    execute_submission(&submission, &logged_options(log_path.clone(), Some(filter.clone())))
        .unwrap();

    let log = Log::from_file(&log_path).unwrap();
    let entry = log.get_question_entry("q1").unwrap();
    assert!(entry.not_shelved.contains(&"b".to_string()));
    assert!(!entry.not_shelved.contains(&"scratch".to_string()));

    let shelf: Shelf = serde_json::from_str(entry.shelf.as_deref().unwrap()).unwrap();
    let names: Vec<&str> = shelf.bindings.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["a"]);

    let options = ExecutionOptions::builder().admission_filter(filter).build();
    let replayed = replay_log(&submission, &log, tests(), &options).unwrap();
    assert!(!replayed[0].passed_all());
}

fn forged_shelf(question: &str, bindings: Vec<ShelvedBinding>, definitions: &[&str]) -> Log {
    let shelf = Shelf {
        version: SHELF_VERSION,
        bindings,
        definitions: definitions.iter().map(|d| d.to_string()).collect(),
    };
    Log::new(vec![
        LogEntry::event(EventType::Init),
        LogEntry::builder()
            .event_type(EventType::Check)
            .question(question)
            .shelf(serde_json::to_string(&shelf).unwrap())
            .build(),
    ])
}

fn int_binding(name: &str, value: i64) -> ShelvedBinding {
    ShelvedBinding {
        name:     name.to_string(),
        type_tag: "i64".to_string(),
        value:    ShelfValue::Int(value),
    }
}

fn forged_log(binding: ShelvedBinding) -> Log {
    forged_shelf("q1", vec![int_binding("a", 1), binding], &[])
}

#[test]
fn forged_shelves_are_rejected() {
    let filter = AdmissionFilter::Types(BTreeMap::from([
        ("a".to_string(), "i64".to_string()),
        ("b".to_string(), "i64".to_string()),
    ]));
    let options = ExecutionOptions::builder().admission_filter(filter).build();
    let submission = cells(&[GRADER]);

    let wrong_type = forged_log(ShelvedBinding {
        name:     "b".to_string(),
        type_tag: "string".to_string(),
        value:    ShelfValue::Str("2".to_string()),
    });
    assert!(matches!(
        replay_log(&submission, &wrong_type, tests(), &options),
        Err(GradingError::ShelfDeserialization(_))
    ));

    let mislabelled = forged_log(ShelvedBinding {
        name:     "b".to_string(),
        type_tag: "i64".to_string(),
        value:    ShelfValue::Str("2".to_string()),
    });
    assert!(matches!(
        replay_log(&submission, &mislabelled, tests(), &options),
        Err(GradingError::ShelfDeserialization(_))
    ));

    let unlisted = forged_log(ShelvedBinding {
        name:     "payload".to_string(),
        type_tag: "i64".to_string(),
        value:    ShelfValue::Int(0),
    });
    assert!(matches!(
        replay_log(&submission, &unlisted, tests(), &options),
        Err(GradingError::ShelfDeserialization(_))
    ));

    let honest = forged_log(ShelvedBinding {
        name:     "b".to_string(),
        type_tag: "i64".to_string(),
        value:    ShelfValue::Int(2),
    });
    let replayed = replay_log(&submission, &honest, tests(), &options).unwrap();
    assert!(replayed[0].passed_all());
}

#[test]
fn shelved_definitions_cannot_replace_assertions() {
    let filter = AdmissionFilter::Types(BTreeMap::from([
        ("a".to_string(), "i64".to_string()),
        ("b".to_string(), "i64".to_string()),
    ]));
    let filtered = ExecutionOptions::builder().admission_filter(filter).build();
    let submission = cells(&[GRADER]);

    let silent_assert = forged_shelf(
        "q1",
        vec![int_binding("a", 99), int_binding("b", 2)],
        &["fn assert(c) { }"],
    );
    assert!(matches!(
        replay_log(&submission, &silent_assert, tests(), &ExecutionOptions::default()),
        Err(GradingError::ShelfDeserialization(_))
    ));

    let silent_assert_eq =
        forged_shelf("q2", Vec::new(), &["fn assert_eq(x, y) { }\nfn square(x) { 0 }"]);
    assert!(matches!(
        replay_log(&submission, &silent_assert_eq, tests(), &filtered),
        Err(GradingError::ShelfDeserialization(_))
    ));
    assert!(matches!(
        replay_log(&submission, &silent_assert_eq, tests(), &ExecutionOptions::default()),
        Err(GradingError::ShelfDeserialization(_))
    ));

    // Under a filter, functions must be admitted like variables.
    let square = forged_shelf("q2", Vec::new(), &["fn square(x) { x * x }"]);
    assert!(matches!(
        replay_log(&submission, &square, tests(), &filtered),
        Err(GradingError::ShelfDeserialization(_))
    ));

    let admitting = AdmissionFilter::Types(BTreeMap::from([(
        "square".to_string(),
        "Fn".to_string(),
    )]));
    let options = ExecutionOptions::builder().admission_filter(admitting).build();
    let replayed = replay_log(&submission, &square, tests(), &options).unwrap();
    assert_eq!(replayed[0].name, "q2");
    assert_eq!(replayed[0].score(), 3.0);
}

#[test]
fn replay_requires_known_questions_and_shelves() {
    let submission = cells(&[GRADER]);

    let unknown = Log::new(vec![
        LogEntry::builder()
            .event_type(EventType::Check)
            .question("q9")
            .shelf("{}")
            .build(),
    ]);
    assert!(matches!(
        replay_log(&submission, &unknown, tests(), &ExecutionOptions::default()),
        Err(GradingError::QuestionNotFound(_))
    ));

    let unshelved = Log::new(vec![
        LogEntry::builder()
            .event_type(EventType::Check)
            .question("q1")
            .build(),
    ]);
    assert!(matches!(
        replay_log(&submission, &unshelved, tests(), &ExecutionOptions::default()),
        Err(GradingError::ShelfDeserialization(_))
    ));
}

#[test]
fn verification_reports_score_discrepancies() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("grading.log");
    let submission = cells(&[GRADER, "let a = 1;\nlet b = 2;\ngrader.check(\"q1\");"]);

    let execution =
        execute_submission(&submission, &logged_options(log_path.clone(), None)).unwrap();
    let log = Log::from_file(&log_path).unwrap();

    let everything = GradingResults::new(execution.results.clone());
    let unlogged = everything.verify_against_log(&log, false);
    assert_eq!(unlogged, ["No score for q2 found in log"]);

    let mut results =
        GradingResults::new(execution.results.into_iter().filter(|file| file.name == "q1"));
    assert!(results.verify_against_log(&log, false).is_empty());

    results.update_score("q1", 0.9).unwrap();
    let discrepancies = results.verify_against_log(&log, false);
    assert_eq!(discrepancies.len(), 1);
    assert!(discrepancies[0].contains("q1"));
}
