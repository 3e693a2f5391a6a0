//! Capture metadata extraction from raw file bytes.
//!
//! The optimizer only needs a capture timestamp and, where available, the
//! camera model. [`RexifReader`] pulls both from JPEG and TIFF-based RAW
//! containers; other readers can be plugged in through [`MetadataReader`].

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use rexif::TagValue;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ExtractionError;
use crate::file_type::is_dji_file;

/// What a reader found in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub capture_time: DateTime<Utc>,
    pub camera_model: Option<String>,
}

/// Pulls capture metadata out of file contents.
pub trait MetadataReader: Send + Sync {
    fn read(&self, name: &str, bytes: &[u8]) -> Result<CaptureMetadata, ExtractionError>;
}

/// EXIF reader backed by `rexif`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RexifReader;

const TAG_MODEL: u16 = 0x0110;
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_SUBSEC_TIME: u16 = 0x9290;
const TAG_SUBSEC_TIME_ORIGINAL: u16 = 0x9291;

/// ASCII date fields of one file, as written by the camera.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DateFields {
    pub original: Option<String>,
    pub subsec_original: Option<String>,
    pub modified: Option<String>,
    pub subsec_modified: Option<String>,
}

impl DateFields {
    /// Resolve the capture time, keeping sub-second digits when present.
    /// DJI bodies write the reliable shutter time to `DateTime`, so it is
    /// tried first for their files.
    pub fn capture_time(&self, name: &str) -> Option<DateTime<Utc>> {
        let original = (self.original.as_deref(), self.subsec_original.as_deref());
        let modified = (self.modified.as_deref(), self.subsec_modified.as_deref());
        let candidates = if is_dji_file(name) {
            [modified, original]
        } else {
            [original, modified]
        };
        candidates.into_iter().find_map(|(date, subsec)| {
            let date = date?;
            parse_capture_time(Some(date), subsec).or_else(|| parse_timestamp(date))
        })
    }
}

impl MetadataReader for RexifReader {
    fn read(&self, name: &str, bytes: &[u8]) -> Result<CaptureMetadata, ExtractionError> {
        let (parsed, warnings) = rexif::parse_buffer_quiet(bytes);
        for warning in warnings {
            debug!(file = name, %warning, "EXIF warning");
        }
        let data = parsed.map_err(|e| ExtractionError::Exif {
            name: name.to_string(),
            message: format!("{:?}", e),
        })?;

        let mut fields = DateFields::default();
        let mut model = None;
        for entry in &data.entries {
            // SubSec tags are unknown to rexif, so match on the raw tag number
            let TagValue::Ascii(ref text) = entry.value else {
                continue;
            };
            let slot = match entry.ifd.tag {
                TAG_DATE_TIME_ORIGINAL => &mut fields.original,
                TAG_SUBSEC_TIME_ORIGINAL => &mut fields.subsec_original,
                TAG_DATE_TIME => &mut fields.modified,
                TAG_SUBSEC_TIME => &mut fields.subsec_modified,
                TAG_MODEL => &mut model,
                _ => continue,
            };
            *slot = Some(text.trim_end_matches('\0').trim().to_string());
        }

        let capture_time = fields
            .capture_time(name)
            .ok_or_else(|| ExtractionError::MissingTimestamp(name.to_string()))?;

        Ok(CaptureMetadata {
            capture_time,
            camera_model: model.filter(|m| !m.is_empty()),
        })
    }
}

/// Parse an EXIF `DateTimeOriginal` value with optional `SubSecTimeOriginal` digits.
pub fn parse_capture_time(date_time_original: Option<&str>, subsec_time_original: Option<&str>) -> Option<DateTime<Utc>> {
    let date_str = date_time_original?.trim();

    let naive_dt = NaiveDateTime::parse_from_str(date_str, "%Y:%m:%d %H:%M:%S").ok()?;

    let dt_with_subsec = match subsec_time_original.map(str::trim) {
        Some(subsec) if !subsec.is_empty() && subsec.len() <= 9 => match subsec.parse::<u32>() {
            // Sub-second digits are a decimal fraction: "5" is 500ms, "050" is 50ms
            Ok(subsec_num) => {
                let subsec_nanos = subsec_num * 10u32.pow(9 - subsec.len() as u32);
                naive_dt.with_nanosecond(subsec_nanos).unwrap_or(naive_dt)
            }
            Err(_) => naive_dt,
        },
        _ => naive_dt,
    };

    Some(DateTime::from_naive_utc_and_offset(dt_with_subsec, Utc))
}

/// Parse a capture timestamp in any of the shapes metadata pages carry:
/// EXIF (`2024:01:15 14:30:25`), naive ISO-8601 or RFC 3339. Naive values
/// are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim().trim_end_matches('\0');
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y:%m:%d %H:%M:%S%.f",
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}
