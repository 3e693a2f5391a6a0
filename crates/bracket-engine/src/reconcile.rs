//! Size partition and single-file policy.
//!
//! Clusters that reach `min_bracket_size` become brackets. Smaller groups are
//! singles and are handled according to [`SingleFileHandling`].

use tracing::debug;

use crate::cluster::Cluster;
use crate::config::SingleFileHandling;
use crate::record::{gap_seconds, Bracket, PhotoRecord};

/// Outcome of applying the single-file policy to a cluster sequence.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub brackets: Vec<Bracket>,
    /// Under-size records returned separately (only with `separate`)
    pub singles: Vec<PhotoRecord>,
    /// Records that were in under-size clusters before the policy ran
    pub single_files: usize,
    /// Single records absorbed into a neighbouring bracket
    pub merged_singles: usize,
    /// Single records dropped by `skip`
    pub dropped_singles: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Preceding,
    Following,
}

/// Split clusters into brackets and singles, then apply `handling`.
pub fn reconcile(
    clusters: Vec<Cluster>,
    min_bracket_size: usize,
    handling: SingleFileHandling,
    merge_window_seconds: f64,
) -> Reconciliation {
    let qualifies: Vec<bool> = clusters
        .iter()
        .map(|c| c.len() >= min_bracket_size)
        .collect();
    let single_files = clusters
        .iter()
        .zip(&qualifies)
        .filter(|(_, q)| !**q)
        .map(|(c, _)| c.len())
        .sum();

    let targets: Vec<Option<usize>> = if handling == SingleFileHandling::Merge {
        (0..clusters.len())
            .map(|i| {
                if qualifies[i] {
                    return None;
                }
                merge_side(&clusters, &qualifies, i, merge_window_seconds).map(|side| match side {
                    Side::Preceding => i - 1,
                    Side::Following => i + 1,
                })
            })
            .collect()
    } else {
        vec![None; clusters.len()]
    };

    // Targets only ever point at an adjacent cluster, so filling the member
    // lists in time order keeps every bracket sorted.
    let mut members: Vec<Vec<PhotoRecord>> = vec![Vec::new(); clusters.len()];
    let mut merged_singles = 0;
    for (i, cluster) in clusters.into_iter().enumerate() {
        let target = match targets[i] {
            Some(target) => {
                merged_singles += cluster.len();
                target
            }
            None => i,
        };
        members[target].extend(cluster);
    }

    let mut result = Reconciliation {
        single_files,
        merged_singles,
        ..Default::default()
    };

    for (i, records) in members.into_iter().enumerate() {
        if records.is_empty() {
            continue;
        }
        if qualifies[i] {
            result.brackets.push(Bracket::new(records));
            continue;
        }
        match handling {
            SingleFileHandling::Keep | SingleFileHandling::Merge => {
                result.brackets.push(Bracket::single(records));
            }
            SingleFileHandling::Separate => result.singles.extend(records),
            SingleFileHandling::Skip => result.dropped_singles += records.len(),
        }
    }

    debug!(
        brackets = result.brackets.len(),
        single_files = result.single_files,
        merged = result.merged_singles,
        dropped = result.dropped_singles,
        policy = %handling,
        "single-file reconciliation complete"
    );
    result
}

/// Which neighbouring bracket, if any, the under-size cluster at `index` joins.
///
/// Groups at either end of the sequence are never merged. Otherwise the
/// closer qualifying neighbour inside the window wins, preceding on ties.
fn merge_side(clusters: &[Cluster], qualifies: &[bool], index: usize, window: f64) -> Option<Side> {
    if index == 0 || index + 1 >= clusters.len() {
        return None;
    }

    let single = &clusters[index];
    let preceding = qualifies[index - 1]
        .then(|| boundary_gap(&clusters[index - 1], single))
        .flatten()
        .filter(|gap| *gap <= window);
    let following = qualifies[index + 1]
        .then(|| boundary_gap(single, &clusters[index + 1]))
        .flatten()
        .filter(|gap| *gap <= window);

    match (preceding, following) {
        (Some(before), Some(after)) if after < before => Some(Side::Following),
        (Some(_), _) => Some(Side::Preceding),
        (None, Some(_)) => Some(Side::Following),
        (None, None) => None,
    }
}

/// Gap between the last record of `earlier` and the first record of `later`.
fn boundary_gap(earlier: &Cluster, later: &Cluster) -> Option<f64> {
    let end = earlier.last()?.capture_timestamp?;
    let start = later.first()?.capture_timestamp?;
    Some(gap_seconds(end, start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::cluster_records;
    use crate::record::BracketKind;
    use chrono::{TimeZone, Utc};

    fn records(times: &[i64]) -> Vec<PhotoRecord> {
        times
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                PhotoRecord::new(
                    format!("IMG_{:04}.CR2", i),
                    format!("/listing/IMG_{:04}.CR2", i),
                    Utc.timestamp_opt(1_650_000_000 + t, 0).unwrap(),
                )
            })
            .collect()
    }

    fn run(times: &[i64], handling: SingleFileHandling, window: f64) -> Reconciliation {
        let clusters = cluster_records(records(times), 2.0);
        reconcile(clusters, 2, handling, window)
    }

    fn bracket_sizes(result: &Reconciliation) -> Vec<usize> {
        result.brackets.iter().map(|b| b.len()).collect()
    }

    #[test]
    fn test_keep_leaves_single_in_place() {
        let result = run(&[0, 1, 2, 20, 40, 41], SingleFileHandling::Keep, 60.0);
        assert_eq!(bracket_sizes(&result), vec![3, 1, 2]);
        assert_eq!(result.brackets[1].kind, BracketKind::Single);
        assert_eq!(result.single_files, 1);
        assert!(result.singles.is_empty());
    }

    #[test]
    fn test_separate_moves_singles_out() {
        let result = run(&[0, 1, 2, 20, 40, 41, 90], SingleFileHandling::Separate, 60.0);
        assert_eq!(bracket_sizes(&result), vec![3, 2]);
        assert_eq!(result.singles.len(), 2);
        assert_eq!(result.singles[0].name, "IMG_0003.CR2");
        assert_eq!(result.singles[1].name, "IMG_0006.CR2");
        assert_eq!(result.single_files, 2);
    }

    #[test]
    fn test_skip_drops_and_counts() {
        let result = run(&[0, 1, 2, 20, 40, 41], SingleFileHandling::Skip, 60.0);
        assert_eq!(bracket_sizes(&result), vec![3, 2]);
        assert!(result.singles.is_empty());
        assert_eq!(result.dropped_singles, 1);
        assert_eq!(result.single_files, 1);
    }

    #[test]
    fn test_merge_prefers_closer_bracket() {
        // Single at 35: 33s after the first bracket, 5s before the second.
        let result = run(&[0, 1, 2, 35, 40, 41], SingleFileHandling::Merge, 60.0);
        assert_eq!(bracket_sizes(&result), vec![3, 3]);
        assert_eq!(result.brackets[1].records[0].name, "IMG_0003.CR2");
        assert_eq!(result.merged_singles, 1);
    }

    #[test]
    fn test_merge_tie_prefers_preceding() {
        let result = run(&[0, 1, 2, 12, 22, 23], SingleFileHandling::Merge, 60.0);
        assert_eq!(bracket_sizes(&result), vec![4, 2]);
        assert_eq!(result.brackets[0].records[3].name, "IMG_0003.CR2");
    }

    #[test]
    fn test_merge_respects_window() {
        let result = run(&[0, 1, 2, 20, 40, 41], SingleFileHandling::Merge, 10.0);
        assert_eq!(bracket_sizes(&result), vec![3, 1, 2]);
        assert_eq!(result.brackets[1].kind, BracketKind::Single);
        assert_eq!(result.merged_singles, 0);
    }

    #[test]
    fn test_merge_only_one_neighbour_in_window() {
        // 8s after the first bracket, 32s before the second.
        let result = run(&[0, 1, 2, 10, 42, 43], SingleFileHandling::Merge, 10.0);
        assert_eq!(bracket_sizes(&result), vec![4, 2]);
    }

    #[test]
    fn test_merge_boundary_single_falls_back_to_keep() {
        let result = run(&[0, 1, 2, 50], SingleFileHandling::Merge, 60.0);
        assert_eq!(bracket_sizes(&result), vec![3, 1]);
        assert_eq!(result.brackets[1].kind, BracketKind::Single);

        let leading = run(&[0, 30, 31, 32], SingleFileHandling::Merge, 60.0);
        assert_eq!(bracket_sizes(&leading), vec![1, 3]);
    }

    #[test]
    fn test_merge_between_two_singles_keeps_them() {
        let result = run(&[0, 20, 40], SingleFileHandling::Merge, 60.0);
        assert_eq!(bracket_sizes(&result), vec![1, 1, 1]);
        assert_eq!(result.merged_singles, 0);
    }

    #[test]
    fn test_adjacent_singles_merge_outward() {
        let result = run(&[0, 1, 10, 20, 29, 30], SingleFileHandling::Merge, 60.0);
        // Single at 10 joins the first bracket, single at 20 the last one.
        assert_eq!(bracket_sizes(&result), vec![3, 3]);
        assert_eq!(result.merged_singles, 2);
    }

    #[test]
    fn test_min_size_one_makes_policy_irrelevant() {
        for handling in [
            SingleFileHandling::Merge,
            SingleFileHandling::Keep,
            SingleFileHandling::Separate,
            SingleFileHandling::Skip,
        ] {
            let clusters = cluster_records(records(&[0, 1, 20, 40, 41]), 2.0);
            let result = reconcile(clusters, 1, handling, 60.0);
            assert_eq!(bracket_sizes(&result), vec![2, 1, 2]);
            assert!(result.brackets.iter().all(|b| b.kind == BracketKind::Exposures));
            assert_eq!(result.single_files, 0);
        }
    }
}
