//! Photo records and the brackets built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One physical file as seen by the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Display filename
    pub name: String,
    /// Canonical storage path, the record's stable key
    pub path: String,
    /// When the shutter fired. Must be present before the record reaches the optimizer.
    pub capture_timestamp: Option<DateTime<Utc>>,
    pub camera_model: Option<String>,
    pub size_bytes: Option<u64>,
}

impl PhotoRecord {
    /// Create a record with the fields the optimizer needs
    pub fn new(name: impl Into<String>, path: impl Into<String>, capture_timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            capture_timestamp: Some(capture_timestamp),
            camera_model: None,
            size_bytes: None,
        }
    }

    pub fn with_camera_model(mut self, model: impl Into<String>) -> Self {
        self.camera_model = Some(model.into());
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

/// Seconds from `earlier` to `later`, keeping sub-second precision.
pub fn gap_seconds(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let delta = later.signed_duration_since(earlier);
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_seconds() as f64,
    }
}

/// How a bracket came to be in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketKind {
    /// Reached `min_bracket_size` (possibly after absorbing singles)
    Exposures,
    /// An under-size group emitted on its own
    Single,
}

/// An ordered group of exposures handed downstream for HDR merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    /// Content id derived from the member paths
    pub id: String,
    pub kind: BracketKind,
    /// Members, ascending by capture time
    pub records: Vec<PhotoRecord>,
}

impl Bracket {
    pub fn new(records: Vec<PhotoRecord>) -> Self {
        Self::with_kind(BracketKind::Exposures, records)
    }

    /// Wrap an under-size group that stays in the bracket sequence
    pub fn single(records: Vec<PhotoRecord>) -> Self {
        Self::with_kind(BracketKind::Single, records)
    }

    fn with_kind(kind: BracketKind, records: Vec<PhotoRecord>) -> Self {
        let id = bracket_id(&records);
        Self { id, kind, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_capture(&self) -> Option<DateTime<Utc>> {
        self.records.first().and_then(|r| r.capture_timestamp)
    }

    pub fn last_capture(&self) -> Option<DateTime<Utc>> {
        self.records.last().and_then(|r| r.capture_timestamp)
    }

    /// Time between the first and last exposure (seconds)
    pub fn span_seconds(&self) -> f64 {
        match (self.first_capture(), self.last_capture()) {
            (Some(first), Some(last)) => gap_seconds(first, last),
            _ => 0.0,
        }
    }

    /// Path references in exposure order, the shape the delivery pipeline consumes
    pub fn paths(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.path.as_str()).collect()
    }
}

/// First 8 bytes of SHA-256 over the member paths, hex encoded.
fn bracket_id(records: &[PhotoRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.path.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
