#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Single test cases and their outcomes.
pub mod case;
/// Test files and scoring.
pub mod file;
/// Gradescope integration utilities.
pub mod gradescope;
/// Loading test specifications from disk.
pub mod loader;
/// Point resolution.
pub mod points;
/// Aggregated grading results.
pub mod results;

pub use case::{CheckRunner, TestCase, TestCaseResult, Visibility};
pub use file::{GradingMode, TestFile};
pub use gradescope::{
    GradescopeOutputFormat, GradescopeStatus, GradescopeSubmission, GradescopeTestCase,
    GradescopeVisibility,
};
pub use loader::{TestCollection, parse_test_file};
pub use points::{TotalPoints, resolve_test_file_points};
pub use results::{GradingResults, ScoreRow};
