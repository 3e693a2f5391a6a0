//! Greedy temporal clustering.
//!
//! Records are ordered by capture time (name breaks ties) and walked once.
//! Each record joins the current cluster when it was taken within the
//! effective delta of its immediate predecessor. There is no backtracking:
//! a slow sequence whose individual gaps all fit the delta chains into one
//! cluster however long its total span.

use std::cmp::Ordering;

use tracing::debug;

use crate::record::{gap_seconds, PhotoRecord};

/// Contiguous run of records produced by the greedy walk, in capture order.
pub type Cluster = Vec<PhotoRecord>;

/// Total order used before clustering: capture time, then name.
pub fn capture_order(a: &PhotoRecord, b: &PhotoRecord) -> Ordering {
    a.capture_timestamp
        .cmp(&b.capture_timestamp)
        .then_with(|| a.name.cmp(&b.name))
}

/// Partition `records` into time-contiguous clusters.
pub fn cluster_records(mut records: Vec<PhotoRecord>, effective_delta: f64) -> Vec<Cluster> {
    if records.is_empty() {
        return Vec::new();
    }

    records.sort_by(capture_order);

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut current: Cluster = Vec::new();

    for record in records {
        let extends = match current.last() {
            Some(previous) => within_delta(previous, &record, effective_delta),
            None => true,
        };

        if !extends {
            clusters.push(std::mem::take(&mut current));
        }
        current.push(record);
    }

    if !current.is_empty() {
        clusters.push(current);
    }

    debug!(
        clusters = clusters.len(),
        effective_delta, "temporal clustering complete"
    );
    clusters
}

fn within_delta(previous: &PhotoRecord, next: &PhotoRecord, delta: f64) -> bool {
    match (previous.capture_timestamp, next.capture_timestamp) {
        (Some(a), Some(b)) => gap_seconds(a, b) <= delta,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(name: &str, secs: i64) -> PhotoRecord {
        PhotoRecord::new(
            name,
            format!("/shoot/{}", name),
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        )
    }

    fn sizes(clusters: &[Cluster]) -> Vec<usize> {
        clusters.iter().map(|c| c.len()).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_records(Vec::new(), 2.0).is_empty());
    }

    #[test]
    fn test_gap_splits_clusters() {
        let records = vec![
            record("a.jpg", 0),
            record("b.jpg", 1),
            record("c.jpg", 2),
            record("d.jpg", 30),
            record("e.jpg", 31),
        ];
        let clusters = cluster_records(records, 2.0);
        assert_eq!(sizes(&clusters), vec![3, 2]);
    }

    #[test]
    fn test_gap_equal_to_delta_joins() {
        let records = vec![record("a.jpg", 0), record("b.jpg", 2), record("c.jpg", 5)];
        let clusters = cluster_records(records, 2.0);
        assert_eq!(sizes(&clusters), vec![2, 1]);
    }

    #[test]
    fn test_unsorted_input_is_ordered() {
        let records = vec![
            record("c.jpg", 31),
            record("a.jpg", 0),
            record("d.jpg", 30),
            record("b.jpg", 1),
        ];
        let clusters = cluster_records(records, 2.0);
        let names: Vec<Vec<&str>> = clusters
            .iter()
            .map(|c| c.iter().map(|r| r.name.as_str()).collect())
            .collect();
        assert_eq!(names, vec![vec!["a.jpg", "b.jpg"], vec!["d.jpg", "c.jpg"]]);
    }

    #[test]
    fn test_timestamp_ties_broken_by_name() {
        let records = vec![record("z.jpg", 0), record("m.jpg", 0), record("a.jpg", 0)];
        let clusters = cluster_records(records, 2.0);
        let names: Vec<&str> = clusters[0].iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "m.jpg", "z.jpg"]);
    }

    #[test]
    fn test_slow_chain_stays_one_cluster() {
        // Each gap is 2s, total span 18s: the greedy walk keeps it together.
        let records: Vec<_> = (0..10)
            .map(|i| record(&format!("img{:02}.jpg", i), i * 2))
            .collect();
        let clusters = cluster_records(records, 2.0);
        assert_eq!(sizes(&clusters), vec![10]);
    }

    #[test]
    fn test_subsecond_gaps() {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let records = vec![
            PhotoRecord::new("a.jpg", "/a.jpg", base),
            PhotoRecord::new("b.jpg", "/b.jpg", base + Duration::milliseconds(400)),
            PhotoRecord::new("c.jpg", "/c.jpg", base + Duration::milliseconds(1100)),
        ];
        let clusters = cluster_records(records, 0.5);
        assert_eq!(sizes(&clusters), vec![2, 1]);
    }
}
