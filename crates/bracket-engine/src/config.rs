//! Run parameters for the bracket optimizer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BracketError, Result};

/// Default maximum gap between consecutive exposures of one bracket (seconds).
pub const DEFAULT_TIME_DELTA_SECONDS: f64 = 2.0;
/// Default gap allowed when folding a stray single into a neighbouring bracket.
pub const DEFAULT_MERGE_WINDOW_SECONDS: f64 = 30.0;
pub const DEFAULT_MIN_BRACKET_SIZE: usize = 2;

/// What to do with clusters smaller than `min_bracket_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum SingleFileHandling {
    /// Fold into the closer adjacent bracket inside the merge window.
    Merge,
    /// Emit as its own bracket.
    Keep,
    /// Emit in the separate singles list.
    Separate,
    /// Drop, but count in the report.
    Skip,
}

impl SingleFileHandling {
    pub fn as_str(&self) -> &'static str {
        match self {
            SingleFileHandling::Merge => "merge",
            SingleFileHandling::Keep => "keep",
            SingleFileHandling::Separate => "separate",
            SingleFileHandling::Skip => "skip",
        }
    }
}

impl fmt::Display for SingleFileHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SingleFileHandling {
    type Err = BracketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "merge" => Ok(SingleFileHandling::Merge),
            "keep" => Ok(SingleFileHandling::Keep),
            "separate" => Ok(SingleFileHandling::Separate),
            "skip" => Ok(SingleFileHandling::Skip),
            other => Err(BracketError::Configuration(format!(
                "unknown single_file_handling '{}', expected one of merge, keep, separate, skip",
                other
            ))),
        }
    }
}

impl TryFrom<String> for SingleFileHandling {
    type Error = BracketError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BracketingConfig {
    /// Maximum gap between two consecutive photos of the same bracket (seconds)
    pub time_delta_seconds: f64,
    /// Maximum gap when absorbing a single into an adjacent bracket (seconds)
    pub merge_window_seconds: f64,
    /// Minimum cluster size to count as a bracket
    pub min_bracket_size: usize,
    pub single_file_handling: SingleFileHandling,
}

impl Default for BracketingConfig {
    fn default() -> Self {
        Self {
            time_delta_seconds: DEFAULT_TIME_DELTA_SECONDS,
            merge_window_seconds: DEFAULT_MERGE_WINDOW_SECONDS,
            min_bracket_size: DEFAULT_MIN_BRACKET_SIZE,
            single_file_handling: SingleFileHandling::Keep,
        }
    }
}

impl BracketingConfig {
    /// Reject parameters that would make clustering meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.time_delta_seconds.is_finite() || self.time_delta_seconds <= 0.0 {
            return Err(BracketError::Configuration(format!(
                "time_delta_seconds must be a positive number, got {}",
                self.time_delta_seconds
            )));
        }
        if !self.merge_window_seconds.is_finite() || self.merge_window_seconds < 0.0 {
            return Err(BracketError::Configuration(format!(
                "merge_window_seconds must be zero or positive, got {}",
                self.merge_window_seconds
            )));
        }
        if self.min_bracket_size == 0 {
            return Err(BracketError::Configuration(
                "min_bracket_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
