//! Quality scoring for a finished bracket partition.
//!
//! The score rewards jobs where most files land in brackets of a consistent
//! exposure count, and penalises leftover singles.

use serde::{Deserialize, Serialize};

use crate::camera::DetectionReason;
use crate::reconcile::Reconciliation;
use crate::record::BracketKind;

/// Brackets larger than this usually mean the delta chained separate shots together.
const OVERSIZED_BRACKET: usize = 9;
const HIGH_SINGLE_RATIO: f64 = 0.3;

const GROUPED_WEIGHT: f64 = 0.5;
const CONSISTENCY_WEIGHT: f64 = 0.3;
const SINGLES_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_files: usize,
    pub total_brackets: usize,
    /// Records that fell into under-size clusters, before the policy ran
    pub single_files: usize,
    pub merged_singles: usize,
    pub dropped_singles: usize,
    pub effective_time_delta_seconds: f64,
    pub detection_reason: DetectionReason,
    /// Overall quality score (0.0 - 100.0)
    pub quality_score: f64,
    pub recommendations: Vec<String>,
}

impl QualityReport {
    /// Report for a run with no input files
    pub fn empty(effective_time_delta_seconds: f64, detection_reason: DetectionReason) -> Self {
        Self {
            total_files: 0,
            total_brackets: 0,
            single_files: 0,
            merged_singles: 0,
            dropped_singles: 0,
            effective_time_delta_seconds,
            detection_reason,
            quality_score: 0.0,
            recommendations: vec!["No photos were supplied, so there was nothing to bracket.".to_string()],
        }
    }

    /// Score a reconciled partition of `total_files` records.
    pub fn assess(
        total_files: usize,
        partition: &Reconciliation,
        effective_time_delta_seconds: f64,
        detection_reason: DetectionReason,
    ) -> Self {
        if total_files == 0 {
            return Self::empty(effective_time_delta_seconds, detection_reason);
        }

        let sizes: Vec<usize> = partition
            .brackets
            .iter()
            .filter(|b| b.kind == BracketKind::Exposures)
            .map(|b| b.len())
            .collect();

        let total = total_files as f64;
        let grouped_ratio = sizes.iter().sum::<usize>() as f64 / total;
        let unabsorbed = partition.single_files.saturating_sub(partition.merged_singles);
        let single_ratio = unabsorbed as f64 / total;
        let consistency = size_consistency(&sizes);

        let quality_score = calculate_score(grouped_ratio, consistency, single_ratio);
        let recommendations = recommend(
            quality_score,
            single_ratio,
            sizes.iter().copied().max().unwrap_or(0),
            detection_reason,
        );

        Self {
            total_files,
            total_brackets: partition.brackets.len(),
            single_files: partition.single_files,
            merged_singles: partition.merged_singles,
            dropped_singles: partition.dropped_singles,
            effective_time_delta_seconds,
            detection_reason,
            quality_score,
            recommendations,
        }
    }

    /// Get a human-readable quality category
    pub fn quality_category(&self) -> &'static str {
        match self.quality_score {
            x if x >= 85.0 => "Excellent",
            x if x >= 60.0 => "Good",
            x if x >= 40.0 => "Fair",
            _ => "Poor",
        }
    }
}

/// `1 / (1 + cv)` over bracket sizes; identical sizes score 1.0.
fn size_consistency(sizes: &[usize]) -> f64 {
    if sizes.len() < 2 {
        return 1.0;
    }
    let n = sizes.len() as f64;
    let mean = sizes.iter().sum::<usize>() as f64 / n;
    let variance = sizes
        .iter()
        .map(|&s| {
            let d = s as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let cv = variance.sqrt() / mean;
    1.0 / (1.0 + cv)
}

fn calculate_score(grouped_ratio: f64, consistency: f64, single_ratio: f64) -> f64 {
    let raw = GROUPED_WEIGHT * grouped_ratio
        + CONSISTENCY_WEIGHT * consistency
        + SINGLES_WEIGHT * (1.0 - single_ratio);
    let score = (raw * 100.0).clamp(0.0, 100.0);
    (score * 10.0).round() / 10.0
}

fn recommend(
    score: f64,
    single_ratio: f64,
    largest_bracket: usize,
    reason: DetectionReason,
) -> Vec<String> {
    let mut out = Vec::new();

    let headline = match score {
        x if x >= 85.0 => "Excellent bracketing: files group cleanly into consistent brackets.",
        x if x >= 60.0 => "Good bracketing: most files were grouped, a few may need review.",
        _ => "Bracketing needs review: many files did not group into consistent brackets.",
    };
    out.push(headline.to_string());

    if single_ratio > HIGH_SINGLE_RATIO {
        out.push(format!(
            "{:.0}% of files ended up as singles; try a larger time_delta_seconds or single_file_handling=merge.",
            single_ratio * 100.0
        ));
    }

    if largest_bracket > OVERSIZED_BRACKET {
        out.push(format!(
            "Largest bracket has {} exposures; separate shots may have chained together, consider a smaller time_delta_seconds.",
            largest_bracket
        ));
    }

    if reason == DetectionReason::DroneCamera {
        out.push("Drone camera detected; the fixed drone tolerance was used instead of the configured time delta.".to_string());
    }

    out
}
