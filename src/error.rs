#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Error taxonomy for the grading engine.

use std::path::PathBuf;

/// Errors that can occur while executing, replaying, or scoring a submission.
#[derive(thiserror::Error, Debug)]
pub enum GradingError {
    /// A code unit failed and `ignore_errors` was not set.
    #[error("Cell {index} failed to execute: {message}")]
    SubmissionExecution {
        /// Zero-based position of the failing code unit in the submission.
        index:   usize,
        /// Engine-provided description of the failure.
        message: String,
    },
    /// A test file or test case is missing a required field or is otherwise
    /// unusable.
    #[error("Malformed test specification {}: {reason}", path.display())]
    MalformedTestSpec {
        /// Path of the offending test file.
        path:   PathBuf,
        /// What is wrong with it.
        reason: String,
    },
    /// Pre-specified test case points exceed the stated file total.
    #[error(
        "More points specified in test cases ({specified}) than allowed for test {name} ({total})"
    )]
    PointOverAllocation {
        /// Name of the test file.
        name:      String,
        /// Sum of the explicitly assigned case points.
        specified: f64,
        /// File-level total.
        total:     f64,
    },
    /// A shelf could not be unpacked or failed admission filtering.
    #[error("Could not unshelve environment: {0}")]
    ShelfDeserialization(String),
    /// No test file or log entry exists for the requested question.
    #[error("Question {0} not found")]
    QuestionNotFound(String),
    /// Nothing could be graded at all.
    #[error("Grading failed catastrophically: {0}")]
    CatastrophicGradingFailure(String),
    /// The script engine could not be configured.
    #[error("Could not configure the script engine: {0}")]
    Engine(String),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GradingError {
    /// Wraps any error as a catastrophic failure, keeping its full chain as
    /// the detail message.
    pub fn catastrophic(err: impl std::fmt::Display) -> Self {
        GradingError::CatastrophicGradingFailure(format!("{err:#}"))
    }
}
