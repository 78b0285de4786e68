// src/models/complexity.rs

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Empirical growth classes, totally ordered from cheapest to most expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComplexityClass {
    Logn,
    N,
    Nlogn,
    N2,
    N3,
    Exp,
}

impl ComplexityClass {
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Logn => 0,
            Self::N => 1,
            Self::Nlogn => 2,
            Self::N2 => 3,
            Self::N3 => 4,
            Self::Exp => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logn => "LOGN",
            Self::N => "N",
            Self::Nlogn => "NLOGN",
            Self::N2 => "N2",
            Self::N3 => "N3",
            Self::Exp => "EXP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOGN" => Some(Self::Logn),
            "N" => Some(Self::N),
            "NLOGN" => Some(Self::Nlogn),
            "N2" => Some(Self::N2),
            "N3" => Some(Self::N3),
            "EXP" => Some(Self::Exp),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComplexityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a generated probe array is arranged after the random draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FillPattern {
    Random,
    Sorted,
    Reverse,
    Constant,
}

/// Inclusive range probe values are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: i64,
    pub max: i64,
}

/// Smallest and largest accepted growth factor between consecutive probe sizes.
/// The classification bins assume input roughly doubles at each step.
pub const MIN_SIZE_GROWTH: f64 = 1.5;
pub const MAX_SIZE_GROWTH: f64 = 2.5;

/// Per-problem configuration of the complexity probe run.
/// Stored as JSON on the problem row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityProbeSpec {
    pub sizes: Vec<usize>,
    pub value_range: ValueRange,
    pub fill: FillPattern,
    pub expected: ComplexityClass,
}

impl ComplexityProbeSpec {
    /// Checks the preconditions the classifier relies on:
    /// at least three strictly increasing sizes, the first three roughly
    /// doubling, and a non-empty value range.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.sizes.len() < 3 {
            return Err(AppError::Validation(format!(
                "complexity probe needs at least 3 sizes, got {}",
                self.sizes.len()
            )));
        }
        if self.sizes[0] == 0 {
            return Err(AppError::Validation(
                "complexity probe sizes must be positive".to_string(),
            ));
        }
        for pair in self.sizes.windows(2) {
            if pair[1] <= pair[0] {
                return Err(AppError::Validation(format!(
                    "complexity probe sizes must be strictly increasing ({} then {})",
                    pair[0], pair[1]
                )));
            }
        }
        for pair in self.sizes[..3].windows(2) {
            let growth = pair[1] as f64 / pair[0] as f64;
            if !(MIN_SIZE_GROWTH..=MAX_SIZE_GROWTH).contains(&growth) {
                return Err(AppError::Validation(format!(
                    "complexity probe sizes must roughly double ({} -> {} grows by {:.2})",
                    pair[0], pair[1], growth
                )));
            }
        }
        if self.value_range.min > self.value_range.max {
            return Err(AppError::Validation(format!(
                "complexity value range is empty ({} > {})",
                self.value_range.min, self.value_range.max
            )));
        }
        Ok(())
    }
}

/// Result of classifying a series of probe timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "class", rename_all = "UPPERCASE")]
pub enum Classification {
    Class(ComplexityClass),
    /// Consecutive ratios disagree too much to trust.
    Unstable,
    /// Average ratio fell outside every bin.
    Unknown,
}

/// Outcome of a complexity probe run compared against the expected class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityVerdict {
    pub observed: Option<ComplexityClass>,
    pub expected: ComplexityClass,
    pub passed: bool,
    /// Elapsed seconds per probe, in probe order.
    pub timings: Vec<f64>,
}
