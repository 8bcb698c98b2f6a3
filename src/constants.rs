#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Script module path that exposes the grader type.
pub const GRADER_MODULE: &str = "grading";

/// Name of the grader type inside [`GRADER_MODULE`].
pub const GRADER_TYPE: &str = "Notebook";

/// Grader method that runs one question's checks.
pub const CHECK_METHOD: &str = "check";

/// Grader methods with side effects that are suppressed during grading.
pub const ADMIN_METHODS: [&str; 3] = ["check_all", "export", "to_pdf"];

/// Host functions that script definitions may not replace.
pub const HOST_FUNCTIONS: [&str; 7] =
    ["assert", "assert_eq", "seed", "rand", "rand_float", "rand_int", "shuffle"];

/// Type tag under which an admission filter lists script functions.
pub const FUNCTION_TAG: &str = "Fn";

/// Custom syntax keyword that instrumented check calls are rewritten to.
pub const CAPTURE_KEYWORD: &str = "grading_capture";

/// Version written into every shelf.
pub const SHELF_VERSION: u32 = 1;

/// Absolute tolerance when comparing scores against a log.
pub const SCORE_TOLERANCE: f64 = 1e-5;

/// Default directory containing test specifications.
pub const DEFAULT_TEST_DIR: &str = "tests";

/// Default location of the Gradescope report.
pub const DEFAULT_RESULTS_PATH: &str = "/autograder/results/results.json";
