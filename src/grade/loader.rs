#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Loading instructor-authored test specifications from a directory.

use std::path::{Path, PathBuf};

use glob::glob;
use serde::Deserialize;

use super::{
    case::{TestCase, Visibility},
    file::{GradingMode, TestFile},
    points::TotalPoints,
};
use crate::error::GradingError;

/// On-disk shape of a test case.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestCaseSpec {
    /// Case name.
    name:            Option<String>,
    /// Case body.
    code:            Option<String>,
    /// Hidden flag.
    #[serde(default)]
    hidden:          bool,
    /// Optional point value.
    points:          Option<f64>,
    /// Optional success message.
    success_message: Option<String>,
    /// Optional failure message.
    failure_message: Option<String>,
}

/// On-disk shape of a test file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestFileSpec {
    /// Question name.
    name:           Option<String>,
    /// Manually graded questions are skipped by the autograder.
    #[serde(default)]
    manual:         bool,
    /// File-level points.
    points:         Option<TotalPoints>,
    /// Scoring mode flag.
    #[serde(default = "default_all_or_nothing")]
    all_or_nothing: bool,
    /// Cases.
    #[serde(default)]
    test_cases:     Vec<TestCaseSpec>,
}

/// `all_or_nothing` defaults to true.
fn default_all_or_nothing() -> bool {
    true
}

/// The test files available for one assignment, in name order.
#[derive(Debug, Clone, Default)]
pub struct TestCollection {
    /// Loaded files.
    files: Vec<TestFile>,
}

impl TestCollection {
    /// Wraps already-built test files.
    pub fn new(mut files: Vec<TestFile>) -> Self {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Self { files }
    }

    /// Loads every `*.toml` specification in `dir`.
    pub fn load(dir: &Path) -> Result<Self, GradingError> {
        let pattern = dir.join("*.toml");
        let pattern = pattern.to_str().ok_or_else(|| GradingError::MalformedTestSpec {
            path:   dir.to_path_buf(),
            reason: "test directory is not valid UTF-8".to_string(),
        })?;

        let mut paths: Vec<PathBuf> = glob(pattern)
            .map_err(|e| GradingError::MalformedTestSpec {
                path:   dir.to_path_buf(),
                reason: e.to_string(),
            })?
            .filter_map(Result::ok)
            .collect();
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let text = std::fs::read_to_string(&path)?;
            if let Some(file) = parse_test_file(&text, &path)? {
                files.push(file);
            }
        }
        tracing::debug!("Loaded {} test files from {}", files.len(), dir.display());
        Ok(Self::new(files))
    }

    /// Looks up a test file by question name.
    pub fn get(&self, name: &str) -> Result<&TestFile, GradingError> {
        self.files
            .iter()
            .find(|file| file.name == name)
            .ok_or_else(|| GradingError::QuestionNotFound(name.to_string()))
    }

    /// Iterates over the loaded files.
    pub fn iter(&self) -> impl Iterator<Item = &TestFile> {
        self.files.iter()
    }

    /// Number of loaded files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true when no test files were loaded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Parses one TOML test specification. Returns `None` for manually graded
/// questions.
///
/// * `text`: file contents
/// * `path`: where the contents came from
pub fn parse_test_file(text: &str, path: &Path) -> Result<Option<TestFile>, GradingError> {
    let malformed = |reason: String| GradingError::MalformedTestSpec {
        path: path.to_path_buf(),
        reason,
    };

    let spec: TestFileSpec = toml::from_str(text).map_err(|e| malformed(e.to_string()))?;
    if spec.manual {
        return Ok(None);
    }

    let name = spec
        .name
        .ok_or_else(|| malformed("missing `name`".to_string()))?;

    let mut cases = Vec::with_capacity(spec.test_cases.len());
    for (i, case) in spec.test_cases.into_iter().enumerate() {
        let body = case
            .code
            .ok_or_else(|| malformed(format!("test case {} is missing `code`", i + 1)))?;
        if case.points.is_some_and(|p| p < 0.0) {
            return Err(malformed(format!("test case {} has negative points", i + 1)));
        }
        cases.push(TestCase {
            name: case.name.unwrap_or_else(|| format!("{name} - {}", i + 1)),
            body,
            visibility: Visibility::from_hidden(case.hidden),
            points: case.points,
            success_message: case.success_message,
            failure_message: case.failure_message,
        });
    }

    let negative = match &spec.points {
        Some(TotalPoints::Scalar(total)) => *total < 0.0,
        Some(TotalPoints::PerCase(list)) => list.iter().any(|p| *p < 0.0),
        None => false,
    };
    if negative {
        return Err(malformed("negative `points`".to_string()));
    }

    TestFile::new(
        name,
        path,
        cases,
        spec.points.as_ref(),
        GradingMode::from_all_or_nothing(spec.all_or_nothing),
    )
    .map(Some)
    .map_err(|e| match e {
        GradingError::MalformedTestSpec { reason, .. } => malformed(reason),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_specification() {
        let text = r#"
name = "q1"
points = 2
all_or_nothing = false

[[test_cases]]
code = "a == 1"

[[test_cases]]
name = "hidden check"
hidden = true
code = "assert(b == 2)"
failure_message = "b is off"
"#;
        let file = parse_test_file(text, Path::new("tests/q1.toml"))
            .unwrap()
            .unwrap();
        assert_eq!(file.name, "q1");
        assert_eq!(file.mode, GradingMode::PartialCredit);
        assert_eq!(file.test_cases[0].name, "q1 - 1");
        assert_eq!(file.test_cases[1].visibility, Visibility::Hidden);
        assert_eq!(file.possible(), 2.0);
    }

    #[test]
    fn manual_questions_are_skipped() {
        let text = "name = \"q9\"\nmanual = true\n";
        assert!(parse_test_file(text, Path::new("q9.toml")).unwrap().is_none());
    }

    #[test]
    fn missing_code_is_malformed() {
        let text = "name = \"q1\"\n[[test_cases]]\nname = \"x\"\n";
        let err = parse_test_file(text, Path::new("q1.toml")).unwrap_err();
        assert!(matches!(err, GradingError::MalformedTestSpec { .. }));
    }

    #[test]
    fn negative_point_lists_are_malformed() {
        let text = r#"
name = "q1"
points = [-5.0, 1.0]

[[test_cases]]
code = "a == 1"

[[test_cases]]
code = "b == 2"
"#;
        match parse_test_file(text, Path::new("q1.toml")) {
            Err(GradingError::MalformedTestSpec { reason, .. }) => {
                assert!(reason.contains("negative"), "{reason}")
            }
            other => panic!("expected a malformed spec, got {other:?}"),
        }
    }
}
