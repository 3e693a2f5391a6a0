//! Normalization of paginated discovery output.
//!
//! Extraction workers report metadata page by page, and the aggregated
//! payload may arrive as a flat list or as nested lists of pages. This module
//! flattens it, drops duplicate paths and turns each entry into a
//! [`PhotoRecord`]. Entries whose timestamp cannot be read are rejected here
//! with a reason, never given a made-up time.

use std::collections::HashSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::exif::parse_timestamp;
use crate::extract::{Extraction, RejectedFile};
use crate::file_type::is_dji_file;
use crate::record::PhotoRecord;

pub const DEFAULT_FILES_PER_PAGE: usize = 25;

/// Model hint given to drone files whose EXIF carried no model
const DJI_MODEL_HINT: &str = "DJI";

/// One file's metadata as reported by an extraction worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub name: String,
    #[serde(alias = "path_lower", alias = "id", alias = "path_id")]
    pub path: String,
    #[serde(default, alias = "capture_timestamp")]
    pub date_taken: Option<String>,
    #[serde(default, alias = "model")]
    pub camera_model: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default, alias = "size_bytes")]
    pub size: Option<u64>,
}

impl MetadataEntry {
    /// Convert to a record. The timestamp stays `None` when it cannot be parsed.
    pub fn to_record(&self) -> PhotoRecord {
        let camera_model = self
            .camera_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or_else(|| self.drone_hint());

        PhotoRecord {
            name: self.name.clone(),
            path: self.path.clone(),
            capture_timestamp: self.date_taken.as_deref().and_then(parse_timestamp),
            camera_model,
            size_bytes: self.size,
        }
    }

    fn drone_hint(&self) -> Option<String> {
        let tagged = self
            .manufacturer
            .as_deref()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case("dji"));
        (tagged || is_dji_file(&self.name)).then(|| DJI_MODEL_HINT.to_string())
    }
}

/// A page payload item: either a file entry or a nested batch of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageItem {
    Batch(Vec<PageItem>),
    Entry(MetadataEntry),
}

/// Flatten arbitrarily nested page payloads, preserving order.
pub fn flatten_pages(items: Vec<PageItem>) -> Vec<MetadataEntry> {
    let mut out = Vec::new();
    let mut stack: Vec<std::vec::IntoIter<PageItem>> = vec![items.into_iter()];
    while let Some(iter) = stack.last_mut() {
        match iter.next() {
            Some(PageItem::Entry(entry)) => out.push(entry),
            Some(PageItem::Batch(batch)) => stack.push(batch.into_iter()),
            None => {
                stack.pop();
            }
        }
    }
    out
}

/// Keep the first entry for each path.
pub fn dedupe_by_path(entries: Vec<MetadataEntry>) -> Vec<MetadataEntry> {
    let mut seen = HashSet::new();
    let before = entries.len();
    let unique: Vec<_> = entries
        .into_iter()
        .filter(|e| seen.insert(e.path.clone()))
        .collect();
    if unique.len() < before {
        warn!(duplicates = before - unique.len(), "dropped duplicate paths from metadata pages");
    }
    unique
}

/// Flatten, deduplicate and convert page payloads into records.
pub fn normalize_pages(items: Vec<PageItem>) -> Extraction {
    normalize_entries(flatten_pages(items))
}

/// Deduplicate flat entries and convert them into records.
pub fn normalize_entries(entries: Vec<MetadataEntry>) -> Extraction {
    let entries = dedupe_by_path(entries);
    let mut extraction = Extraction::default();

    for entry in entries {
        let record = entry.to_record();
        if record.capture_timestamp.is_some() {
            extraction.records.push(record);
            continue;
        }
        let reason = match entry.date_taken.as_deref() {
            Some(raw) => format!("unparseable capture timestamp '{}'", raw),
            None => "no capture timestamp".to_string(),
        };
        warn!(path = %entry.path, %reason, "rejecting metadata entry");
        extraction.rejected.push(RejectedFile {
            name: entry.name,
            path: entry.path,
            reason,
        });
    }

    debug!(
        records = extraction.records.len(),
        rejected = extraction.rejected.len(),
        "normalized metadata pages"
    );
    extraction
}

/// Page layout for a discovered file list. Pages are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total_files: usize,
    pub files_per_page: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(total_files: usize, files_per_page: usize) -> Self {
        let files_per_page = files_per_page.max(1);
        Self {
            total_files,
            files_per_page,
            total_pages: total_files.div_ceil(files_per_page),
        }
    }

    /// Index range covered by `page`, or `None` when out of range
    pub fn page_range(&self, page: usize) -> Option<Range<usize>> {
        if page == 0 || page > self.total_pages {
            return None;
        }
        let start = (page - 1) * self.files_per_page;
        let end = (start + self.files_per_page).min(self.total_files);
        Some(start..end)
    }
}
