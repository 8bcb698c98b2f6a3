#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Aggregation of many test files into one score and report.

use std::{fs, path::Path};

use itertools::Itertools;
use tabled::Tabled;

use super::{
    file::TestFile,
    gradescope::{
        GradescopeOutputFormat, GradescopeStatus, GradescopeSubmission, GradescopeTestCase,
        GradescopeVisibility, round_score,
    },
};
use crate::{config::ReportConfig, constants::SCORE_TOLERANCE, error::GradingError, log::Log};

/// Name of the leading public summary item.
const PUBLIC_SUMMARY_NAME: &str = "Public Tests";

/// Student-facing message for a catastrophic failure.
const CATASTROPHIC_MESSAGE: &str = "The autograder encountered an error when grading this \
                                    submission. Please contact your instructor.";

/// One row of the grading overview table.
#[derive(Tabled)]
pub struct ScoreRow {
    /// Question name.
    #[tabled(rename = "Question")]
    pub question: String,
    /// Earned points.
    #[tabled(rename = "Score")]
    pub score:    String,
    /// Available points.
    #[tabled(rename = "Possible")]
    pub possible: String,
    /// Whether every public case passed.
    #[tabled(rename = "Public")]
    pub public:   String,
}

/// The combined outcome of grading one submission.
#[derive(Debug, Clone, Default)]
pub struct GradingResults {
    /// Test files in first-seen order, unique by name.
    test_files:         Vec<TestFile>,
    /// Free text shown alongside the report.
    output:             Option<String>,
    /// Forces every item to be hidden.
    all_hidden:         bool,
    /// Detail of a failure that prevented grading.
    catastrophic_error: Option<String>,
}

impl GradingResults {
    /// Builds results from run test files. A later file with the same name
    /// replaces the earlier one in place.
    pub fn new(results: impl IntoIterator<Item = TestFile>) -> Self {
        let mut test_files: Vec<TestFile> = Vec::new();
        for file in results {
            match test_files.iter_mut().find(|existing| existing.name == file.name) {
                Some(existing) => *existing = file,
                None => test_files.push(file),
            }
        }
        Self {
            test_files,
            ..Self::default()
        }
    }

    /// Builds an empty, catastrophic result from the error that stopped
    /// grading.
    pub fn without_results(error: &GradingError) -> Self {
        Self {
            catastrophic_error: Some(error.to_string()),
            ..Self::default()
        }
    }

    /// Returns true if grading could not complete.
    pub fn has_catastrophic_failure(&self) -> bool {
        self.catastrophic_error.is_some()
    }

    /// Detail of the catastrophic failure, if any.
    pub fn catastrophic_error(&self) -> Option<&str> {
        self.catastrophic_error.as_deref()
    }

    /// The graded test files.
    pub fn test_files(&self) -> &[TestFile] {
        &self.test_files
    }

    /// Looks up the result for one question.
    pub fn get_result(&self, name: &str) -> Result<&TestFile, GradingError> {
        self.test_files
            .iter()
            .find(|file| file.name == name)
            .ok_or_else(|| GradingError::QuestionNotFound(name.to_string()))
    }

    /// The score of one question.
    pub fn get_score(&self, name: &str) -> Result<f64, GradingError> {
        self.get_result(name).map(TestFile::score)
    }

    /// Total points earned.
    pub fn total(&self) -> f64 {
        self.test_files.iter().map(TestFile::score).sum()
    }

    /// Total points available.
    pub fn possible(&self) -> f64 {
        self.test_files.iter().map(TestFile::possible).sum()
    }

    /// Fraction of available points earned; zero when nothing is available.
    pub fn percent(&self) -> f64 {
        let possible = self.possible();
        if possible == 0.0 {
            0.0
        } else {
            self.total() / possible
        }
    }

    /// Returns true if every public case of every file passed.
    pub fn passed_all_public(&self) -> bool {
        self.test_files.iter().all(TestFile::passed_all_public)
    }

    /// Overrides the score of one question.
    pub fn update_score(&mut self, name: &str, score: f64) -> Result<(), GradingError> {
        let file = self
            .test_files
            .iter_mut()
            .find(|file| file.name == name)
            .ok_or_else(|| GradingError::QuestionNotFound(name.to_string()))?;
        file.update_score(score);
        Ok(())
    }

    /// Sets the free-text output.
    pub fn set_output(&mut self, output: impl Into<String>) {
        self.output = Some(output.into());
    }

    /// The free-text output, if set.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Forces every report item to be hidden.
    pub fn hide_everything(&mut self) {
        self.all_hidden = true;
    }

    /// Returns true once everything has been hidden.
    pub fn all_hidden(&self) -> bool {
        self.all_hidden
    }

    /// Returns true if any case of any file is hidden.
    fn has_hidden_cases(&self) -> bool {
        self.test_files.iter().any(|file| !file.all_public())
    }

    /// Summaries of every file, separated by blank lines.
    pub fn summary(&self, public_only: bool) -> String {
        self.test_files
            .iter()
            .map(|file| file.summary(public_only))
            .join("\n\n")
    }

    /// Rows for the grading overview table.
    pub fn score_rows(&self) -> Vec<ScoreRow> {
        self.test_files
            .iter()
            .map(|file| ScoreRow {
                question: file.name.clone(),
                score:    format!("{:.2}", file.score()),
                possible: format!("{:.2}", file.possible()),
                public:   if file.passed_all_public() { "passed" } else { "failed" }.to_string(),
            })
            .collect()
    }

    /// Renders the Gradescope representation of these results.
    pub fn to_external_report(&self, config: &ReportConfig) -> GradescopeSubmission {
        if let Some(error) = &self.catastrophic_error {
            return self.catastrophic_report(error);
        }

        let hidden_visibility = if config.show_hidden {
            GradescopeVisibility::AfterPublished
        } else {
            GradescopeVisibility::Hidden
        };

        let mut tests = Vec::with_capacity(self.test_files.len() + 1);

        if !self.all_hidden && (self.has_hidden_cases() || config.force_public_test_summary) {
            tests.push(
                GradescopeTestCase::builder()
                    .name(PUBLIC_SUMMARY_NAME)
                    .visibility(GradescopeVisibility::Visible)
                    .status(if self.passed_all_public() {
                        GradescopeStatus::Passed
                    } else {
                        GradescopeStatus::Failed
                    })
                    .output(self.summary(true))
                    .build(),
            );
        }

        for file in &self.test_files {
            let visibility = if file.all_public() {
                GradescopeVisibility::Visible
            } else {
                hidden_visibility
            };
            tests.push(
                GradescopeTestCase::builder()
                    .name(file.name.clone())
                    .score(round_score(file.score()))
                    .max_score(round_score(file.possible()))
                    .visibility(visibility)
                    .output(file.summary(false))
                    .build(),
            );
        }

        let mut score = config
            .points_possible
            .map(|points| round_score(self.percent() * points));

        if let Some(threshold) = config.score_threshold {
            score = Some(if self.percent() >= threshold {
                config.points_possible.unwrap_or_else(|| self.possible())
            } else {
                0.0
            });
        }

        let mut stdout_visibility =
            config.show_stdout.then_some(GradescopeVisibility::AfterPublished);

        if self.all_hidden {
            for test in &mut tests {
                test.visibility = Some(GradescopeVisibility::Hidden);
            }
            stdout_visibility = Some(GradescopeVisibility::Hidden);
        }

        GradescopeSubmission::builder()
            .score(score)
            .output(self.output.clone())
            .test_output_format(GradescopeOutputFormat::Text)
            .stdout_visibility(stdout_visibility)
            .tests(tests)
            .build()
    }

    /// The report produced when nothing could be graded.
    fn catastrophic_report(&self, error: &str) -> GradescopeSubmission {
        let tests = vec![
            GradescopeTestCase::builder()
                .name("Autograder Error")
                .score(0.0)
                .max_score(0.0)
                .status(GradescopeStatus::Failed)
                .visibility(GradescopeVisibility::Visible)
                .output(CATASTROPHIC_MESSAGE)
                .build(),
            GradescopeTestCase::builder()
                .name("Autograder Exception")
                .score(0.0)
                .max_score(0.0)
                .visibility(GradescopeVisibility::Hidden)
                .output(error.to_string())
                .build(),
        ];

        GradescopeSubmission::builder()
            .score(0.0)
            .output(self.output.clone())
            .test_output_format(GradescopeOutputFormat::Text)
            .tests(tests)
            .build()
    }

    /// Writes the Gradescope report as pretty-printed JSON.
    pub fn write_report(&self, path: &Path, config: &ReportConfig) -> Result<(), GradingError> {
        let report = self.to_external_report(config);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        Ok(())
    }

    /// Compares each question's score with the most recent score recorded in
    /// `log`, returning one message per discrepancy.
    ///
    /// * `ignore_hidden`: compare public-case scores only
    pub fn verify_against_log(&self, log: &Log, ignore_hidden: bool) -> Vec<String> {
        let score_of = |file: &TestFile| {
            if ignore_hidden {
                file.public_score()
            } else {
                file.score()
            }
        };

        let mut discrepancies = Vec::new();
        for file in &self.test_files {
            let logged = log
                .get_question_entry(&file.name)
                .ok()
                .and_then(|entry| entry.results.as_ref());

            let Some(logged) = logged else {
                discrepancies.push(format!("No score for {} found in log", file.name));
                continue;
            };

            let actual = score_of(file);
            let recorded = score_of(logged);
            if (actual - recorded).abs() > SCORE_TOLERANCE {
                discrepancies.push(format!(
                    "Score for {} ({actual:.3}) differs from logged score ({recorded:.3})",
                    file.name
                ));
            }
        }
        discrepancies
    }
}
