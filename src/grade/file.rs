#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Named collections of test cases for one question.

use std::{fmt::Write as _, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    case::{CheckRunner, TestCase, TestCaseResult},
    points::{TotalPoints, resolve_test_file_points},
};
use crate::error::GradingError;

/// How a test file turns passed cases into a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingMode {
    /// Full credit only when every case passes.
    #[default]
    AllOrNothing,
    /// Each passed case contributes its points.
    PartialCredit,
}

impl GradingMode {
    /// Maps the `all_or_nothing` flag used in test specification files.
    pub fn from_all_or_nothing(all_or_nothing: bool) -> Self {
        if all_or_nothing {
            GradingMode::AllOrNothing
        } else {
            GradingMode::PartialCredit
        }
    }
}

/// The test cases for one question, plus their results once run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFile {
    /// Question name.
    pub name:              String,
    /// Where the specification was loaded from.
    pub path:              PathBuf,
    /// Resolved test cases, in specification order.
    pub test_cases:        Vec<TestCase>,
    /// Scoring mode.
    pub mode:              GradingMode,
    /// One result per case, in case order; empty until run.
    #[serde(default)]
    pub test_case_results: Vec<TestCaseResult>,
    /// Explicit score set by an external policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_override:    Option<f64>,
}

impl TestFile {
    /// Builds a test file, resolving case points against `total`.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        test_cases: Vec<TestCase>,
        total: Option<&TotalPoints>,
        mode: GradingMode,
    ) -> Result<Self, GradingError> {
        let name = name.into();
        let test_cases = resolve_test_file_points(&name, total, &test_cases)?;
        Ok(Self {
            name,
            path: path.into(),
            test_cases,
            mode,
            test_case_results: Vec::new(),
            score_override: None,
        })
    }

    /// Runs every case against `runner`, replacing any previous results.
    pub fn run(&mut self, runner: &dyn CheckRunner) {
        self.test_case_results = self.test_cases.iter().map(|case| case.run(runner)).collect();
    }

    /// Returns a freshly run copy of this file.
    pub fn run_copy(&self, runner: &dyn CheckRunner) -> Self {
        let mut copy = self.clone();
        copy.score_override = None;
        copy.run(runner);
        copy
    }

    /// Returns true once results exist for every case.
    pub fn has_run(&self) -> bool {
        self.test_case_results.len() == self.test_cases.len()
    }

    /// Sum of all case points, whatever the outcome.
    pub fn possible(&self) -> f64 {
        self.test_cases.iter().map(TestCase::point_value).sum()
    }

    /// Sum of the points of public cases.
    pub fn public_possible(&self) -> f64 {
        self.test_cases
            .iter()
            .filter(|case| !case.hidden())
            .map(TestCase::point_value)
            .sum()
    }

    /// The earned score, honouring any explicit override.
    pub fn score(&self) -> f64 {
        if let Some(score) = self.score_override {
            return score;
        }
        self.score_over(false)
    }

    /// The earned score over public cases only.
    pub fn public_score(&self) -> f64 {
        self.score_over(true)
    }

    /// Computes the score over all cases, or public ones only.
    fn score_over(&self, public_only: bool) -> f64 {
        let considered = || {
            self.test_case_results
                .iter()
                .filter(move |result| !public_only || !result.test_case.hidden())
        };
        match self.mode {
            GradingMode::AllOrNothing => {
                let passed = if public_only {
                    self.passed_all_public()
                } else {
                    self.passed_all()
                };
                match (passed, public_only) {
                    (true, true) => self.public_possible(),
                    (true, false) => self.possible(),
                    (false, _) => 0.0,
                }
            }
            GradingMode::PartialCredit => considered()
                .filter(|result| result.passed)
                .map(|result| result.test_case.point_value())
                .sum(),
        }
    }

    /// Returns true if the file has run and every case passed.
    pub fn passed_all(&self) -> bool {
        self.has_run() && self.test_case_results.iter().all(|result| result.passed)
    }

    /// Returns true if the file has run and every public case passed.
    pub fn passed_all_public(&self) -> bool {
        self.has_run()
            && self
                .test_case_results
                .iter()
                .filter(|result| !result.test_case.hidden())
                .all(|result| result.passed)
    }

    /// Returns true if no case is hidden.
    pub fn all_public(&self) -> bool {
        self.test_cases.iter().all(|case| !case.hidden())
    }

    /// Overrides the score reported for this file.
    pub fn update_score(&mut self, score: f64) {
        self.score_override = Some(score);
    }

    /// Renders a plain-text summary of the results.
    ///
    /// * `public_only`: leave hidden cases out of the summary
    pub fn summary(&self, public_only: bool) -> String {
        let considered: Vec<&TestCaseResult> = self
            .test_case_results
            .iter()
            .filter(|result| !public_only || !result.test_case.hidden())
            .collect();

        if !self.has_run() {
            return format!("{} results: not run", self.name);
        }

        if considered.iter().all(|result| result.passed) {
            let mut out = format!("{} results: All test cases passed!", self.name);
            for result in considered
                .iter()
                .filter(|result| result.test_case.success_message.is_some())
            {
                let _ = write!(out, "\n{} message: {}", result.test_case.name, result.message);
            }
            return out;
        }

        let mut out = format!("{} results:", self.name);
        for result in considered {
            let _ = write!(out, "\n    {} result:", result.test_case.name);
            for line in result.message.lines() {
                let _ = write!(out, "\n        {line}");
            }
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Display for TestFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary(false))
    }
}
