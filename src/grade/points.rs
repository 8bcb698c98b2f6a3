#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Distribution of a test file's point total across its cases.

use serde::{Deserialize, Serialize};

use super::case::TestCase;
use crate::error::GradingError;

/// The file-level `points` value of a test specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalPoints {
    /// A single total split across the cases.
    Scalar(f64),
    /// One explicit value per case.
    PerCase(Vec<f64>),
}

/// Resolves the point value of every case in a test file.
///
/// * `name`: test file name, used in error messages
/// * `total`: the file-level total, if any
/// * `test_cases`: the cases, possibly with pre-specified points
///
/// A per-case list assigns points positionally and overrides anything the
/// cases specify. A scalar total first honours pre-specified points and
/// splits the remainder evenly across the unspecified cases. Without a total,
/// a single point is split across the unspecified cases only when every
/// specified value is zero; otherwise unspecified cases are worth nothing.
pub fn resolve_test_file_points(
    name: &str,
    total: Option<&TotalPoints>,
    test_cases: &[TestCase],
) -> Result<Vec<TestCase>, GradingError> {
    let total = match total {
        Some(TotalPoints::PerCase(points)) => {
            if points.len() != test_cases.len() {
                return Err(GradingError::MalformedTestSpec {
                    path:   name.into(),
                    reason: format!(
                        "{} point values given for {} test cases",
                        points.len(),
                        test_cases.len()
                    ),
                });
            }
            return Ok(test_cases
                .iter()
                .zip(points)
                .map(|(case, points)| case.with_points(*points))
                .collect());
        }
        Some(TotalPoints::Scalar(total)) => Some(*total),
        None => None,
    };

    let specified: Vec<f64> = test_cases.iter().filter_map(|case| case.points).collect();
    let unspecified = test_cases.len() - specified.len();
    let pre_specified: f64 = specified.iter().sum();

    let per_remaining = match total {
        Some(total) => {
            if pre_specified > total {
                return Err(GradingError::PointOverAllocation {
                    name: name.to_string(),
                    specified: pre_specified,
                    total,
                });
            }
            split(total - pre_specified, unspecified)
        }
        None if specified.iter().all(|points| *points == 0.0) => split(1.0, unspecified),
        None => 0.0,
    };

    Ok(test_cases
        .iter()
        .map(|case| case.with_points(case.points.unwrap_or(per_remaining)))
        .collect())
}

/// Splits `amount` evenly over `count` cases, yielding zero when there are no
/// cases to receive it.
fn split(amount: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        amount / count as f64
    }
}
