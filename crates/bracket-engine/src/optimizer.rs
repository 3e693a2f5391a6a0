//! Bracket optimizer: records and configuration in, brackets and report out.
//!
//! The whole run is a pure function of its inputs. It needs every record of a
//! job at once, since clustering sorts the complete set.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::camera::detect_effective_delta;
use crate::cluster::cluster_records;
use crate::config::BracketingConfig;
use crate::error::{BracketError, Result};
use crate::quality::QualityReport;
use crate::reconcile::reconcile;
use crate::record::{Bracket, PhotoRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketResult {
    /// Brackets ordered by the capture time of their first member
    pub brackets: Vec<Bracket>,
    /// Under-size records returned separately under the `separate` policy
    pub singles: Vec<PhotoRecord>,
    pub report: QualityReport,
}

impl BracketResult {
    /// Records present in the output (excludes records dropped by `skip`)
    pub fn emitted_files(&self) -> usize {
        self.brackets.iter().map(|b| b.len()).sum::<usize>() + self.singles.len()
    }

    /// Bracket path lists in delivery order
    pub fn bracket_paths(&self) -> Vec<Vec<&str>> {
        self.brackets.iter().map(|b| b.paths()).collect()
    }
}

pub struct BracketOptimizer {
    config: BracketingConfig,
}

impl BracketOptimizer {
    /// Create an optimizer, rejecting invalid configuration up front
    pub fn new(config: BracketingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_default_config() -> Self {
        Self {
            config: BracketingConfig::default(),
        }
    }

    pub fn config(&self) -> &BracketingConfig {
        &self.config
    }

    /// Build brackets from a complete, time-stamped record set
    pub fn build(&self, records: Vec<PhotoRecord>) -> Result<BracketResult> {
        let config = &self.config;

        if let Some(incomplete) = records.iter().find(|r| r.capture_timestamp.is_none()) {
            return Err(BracketError::IncompleteRecord {
                path: incomplete.path.clone(),
            });
        }

        let (effective_delta, reason) = detect_effective_delta(
            records.iter().map(|r| r.camera_model.as_deref()),
            config.time_delta_seconds,
        );

        if records.is_empty() {
            debug!("no records supplied, returning empty result");
            return Ok(BracketResult {
                brackets: Vec::new(),
                singles: Vec::new(),
                report: QualityReport::empty(effective_delta, reason),
            });
        }

        let total_files = records.len();
        debug!(total_files, effective_delta, reason = %reason, "building brackets");

        let clusters = cluster_records(records, effective_delta);
        let partition = reconcile(
            clusters,
            config.min_bracket_size,
            config.single_file_handling,
            config.merge_window_seconds,
        );
        let report = QualityReport::assess(total_files, &partition, effective_delta, reason);

        info!(
            total_files,
            brackets = report.total_brackets,
            singles = report.single_files,
            score = report.quality_score,
            "bracket build complete"
        );

        Ok(BracketResult {
            brackets: partition.brackets,
            singles: partition.singles,
            report,
        })
    }
}

/// Build brackets for `records` under `config`.
///
/// Fails with [`BracketError::Configuration`] before touching any record if
/// the configuration is invalid, and with [`BracketError::IncompleteRecord`]
/// if any record lacks a capture timestamp. Empty input is not an error.
pub fn build_brackets(records: Vec<PhotoRecord>, config: &BracketingConfig) -> Result<BracketResult> {
    BracketOptimizer::new(config.clone())?.build(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SingleFileHandling;
    use crate::camera::DetectionReason;
    use chrono::{TimeZone, Utc};

    fn record(name: &str, secs: i64) -> PhotoRecord {
        PhotoRecord::new(
            name,
            format!("/listing/{}", name),
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        )
    }

    #[test]
    fn test_invalid_config_fails_before_records() {
        let config = BracketingConfig {
            time_delta_seconds: 0.0,
            ..Default::default()
        };
        let mut incomplete = record("a.jpg", 0);
        incomplete.capture_timestamp = None;
        let err = build_brackets(vec![incomplete], &config).unwrap_err();
        assert!(matches!(err, BracketError::Configuration(_)));
    }

    #[test]
    fn test_incomplete_record_fails_whole_batch() {
        let mut missing = record("b.jpg", 1);
        missing.capture_timestamp = None;
        let records = vec![record("a.jpg", 0), missing, record("c.jpg", 2)];
        let err = build_brackets(records, &BracketingConfig::default()).unwrap_err();
        match err {
            BracketError::IncompleteRecord { path } => assert_eq!(path, "/listing/b.jpg"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_input() {
        let result = build_brackets(Vec::new(), &BracketingConfig::default()).unwrap();
        assert!(result.brackets.is_empty());
        assert!(result.singles.is_empty());
        assert_eq!(result.report.total_files, 0);
        assert_eq!(result.report.total_brackets, 0);
        assert_eq!(result.report.detection_reason, DetectionReason::StandardCamera);
    }

    #[test]
    fn test_drone_records_use_drone_delta() {
        // 6s gaps split under 2s but chain under the 10s drone tolerance.
        let records = vec![
            record("DJI_0001.DNG", 0).with_camera_model("FC3170"),
            record("DJI_0002.DNG", 6).with_camera_model("FC3170"),
            record("DJI_0003.DNG", 12).with_camera_model("FC3170"),
        ];
        let result = build_brackets(records, &BracketingConfig::default()).unwrap();
        assert_eq!(result.brackets.len(), 1);
        assert_eq!(result.report.effective_time_delta_seconds, 10.0);
        assert_eq!(result.report.detection_reason, DetectionReason::DroneCamera);
    }

    #[test]
    fn test_separate_policy_output() {
        let config = BracketingConfig {
            single_file_handling: SingleFileHandling::Separate,
            ..Default::default()
        };
        let records = vec![record("a.jpg", 0), record("b.jpg", 1), record("c.jpg", 60)];
        let result = build_brackets(records, &config).unwrap();
        assert_eq!(result.bracket_paths(), vec![vec!["/listing/a.jpg", "/listing/b.jpg"]]);
        assert_eq!(result.singles.len(), 1);
        assert_eq!(result.emitted_files(), 3);
    }

    #[test]
    fn test_optimizer_new_validates() {
        let config = BracketingConfig {
            min_bracket_size: 0,
            ..Default::default()
        };
        assert!(BracketOptimizer::new(config).is_err());
        assert_eq!(BracketOptimizer::with_default_config().config().min_bracket_size, 2);
    }
}
