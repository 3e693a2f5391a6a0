//! File type classification by extension.
//!
//! Decides which files a job picks up, how much of each must be read to find
//! its EXIF block, and what size limits apply per format.

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

/// Bytes read from the head of a RAW file to reach its EXIF block
pub const RAW_HEADER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Raw,
    /// Canon CR3 wraps its metadata in an MP4-style container
    Cr3,
    Tiff,
    Jpeg,
    Png,
    Other,
    Unsupported,
}

/// How much of a file the EXIF reader needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPlan {
    HeaderOnly(usize),
    Full,
}

impl FileKind {
    pub fn from_name(name: &str) -> Self {
        match extension(name).as_deref() {
            Some("dng" | "raw" | "cr2" | "nef" | "arw" | "orf" | "rw2") => FileKind::Raw,
            Some("cr3") => FileKind::Cr3,
            Some("tif" | "tiff") => FileKind::Tiff,
            Some("jpg" | "jpeg") => FileKind::Jpeg,
            Some("png") => FileKind::Png,
            Some("heic" | "webp" | "bmp" | "gif") => FileKind::Other,
            _ => FileKind::Unsupported,
        }
    }

    pub fn is_supported(&self) -> bool {
        *self != FileKind::Unsupported
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, FileKind::Raw | FileKind::Cr3)
    }

    /// Size limit accepted by the enhancement pipeline (MB)
    pub fn max_size_mb(&self) -> u64 {
        match self {
            FileKind::Raw | FileKind::Cr3 => 250,
            FileKind::Tiff => 300,
            FileKind::Jpeg => 50,
            FileKind::Png => 100,
            FileKind::Other | FileKind::Unsupported => 75,
        }
    }

    /// CR3 needs the whole container; other RAWs keep EXIF near the start.
    pub fn read_plan(&self) -> ReadPlan {
        match self {
            FileKind::Raw => ReadPlan::HeaderOnly(RAW_HEADER_SIZE),
            _ => ReadPlan::Full,
        }
    }
}

/// Lowercase extension without the dot
pub fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// DJI drones name their RAW output `DJI_NNNN.DNG`.
pub fn is_dji_file(name: &str) -> bool {
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);
    let upper = base.to_ascii_uppercase();
    upper.starts_with("DJI_") && upper.ends_with(".DNG")
}

/// Check a file against its format's size limit.
pub fn validate_size(name: &str, size_bytes: u64) -> Result<(), ExtractionError> {
    let kind = FileKind::from_name(name);
    let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
    let limit_mb = kind.max_size_mb();
    if size_mb > limit_mb as f64 {
        return Err(ExtractionError::TooLarge {
            name: name.to_string(),
            size_mb,
            limit_mb,
        });
    }
    Ok(())
}
