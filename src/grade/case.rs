#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Single test cases and their outcomes.

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Whether a test case outcome is shown to students before grades are
/// published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Always shown.
    #[default]
    Public,
    /// Only shown according to the report configuration.
    Hidden,
}

impl Visibility {
    /// Maps the `hidden` flag used in test specification files.
    pub fn from_hidden(hidden: bool) -> Self {
        if hidden {
            Visibility::Hidden
        } else {
            Visibility::Public
        }
    }

    /// Returns true for hidden cases.
    pub fn is_hidden(self) -> bool {
        matches!(self, Visibility::Hidden)
    }
}

/// Something that can evaluate a test case body against an environment.
pub trait CheckRunner {
    /// Evaluates `body`, returning `Err` with a diagnostic when the case
    /// fails.
    fn run_check(&self, body: &str) -> Result<(), String>;
}

/// A single assertion-bearing check.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct TestCase {
    /// Name shown in summaries.
    pub name:            String,
    /// Script evaluated against the environment.
    pub body:            String,
    /// Visibility of the outcome.
    #[builder(default)]
    #[serde(default)]
    pub visibility:      Visibility,
    /// Point value; `None` until resolved.
    pub points:          Option<f64>,
    /// Message shown when the case passes.
    pub success_message: Option<String>,
    /// Message shown when the case fails.
    pub failure_message: Option<String>,
}

impl TestCase {
    /// Returns the resolved point value, treating unresolved points as zero.
    pub fn point_value(&self) -> f64 {
        self.points.unwrap_or(0.0)
    }

    /// Returns true if the case is hidden.
    pub fn hidden(&self) -> bool {
        self.visibility.is_hidden()
    }

    /// Returns a copy of this case with its point value set.
    pub fn with_points(&self, points: f64) -> Self {
        TestCase {
            points: Some(points),
            ..self.clone()
        }
    }

    /// Runs the case body and builds its result.
    pub fn run(&self, runner: &dyn CheckRunner) -> TestCaseResult {
        match runner.run_check(&self.body) {
            Ok(()) => TestCaseResult {
                test_case: self.clone(),
                message:   self
                    .success_message
                    .clone()
                    .unwrap_or_else(|| "✅ Test case passed".to_string()),
                passed:    true,
            },
            Err(error) => {
                let mut message = format!("❌ Test case failed\n{error}");
                if let Some(failure) = &self.failure_message {
                    message.push('\n');
                    message.push_str(failure);
                }
                TestCaseResult {
                    test_case: self.clone(),
                    message,
                    passed: false,
                }
            }
        }
    }
}

/// Outcome of running one [`TestCase`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    /// The case this result belongs to.
    pub test_case: TestCase,
    /// Diagnostic message.
    pub message:   String,
    /// Whether the case passed.
    pub passed:    bool,
}
