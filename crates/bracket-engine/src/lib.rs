//! HDR bracket construction for real-estate photo sets.
//!
//! Photos of one shooting job arrive as [`PhotoRecord`]s with a capture time
//! and, where known, a camera model. [`build_brackets`] groups them into
//! exposure brackets:
//!
//! - **Camera detection**: drone cameras get a wider time tolerance
//! - **Temporal clustering**: consecutive shots within the tolerance join one cluster
//! - **Single-file policy**: under-size clusters are merged, kept, separated or skipped
//! - **Quality report**: a 0-100 score plus human-readable recommendations
//!
//! The [`extract`] and [`discovery`] modules turn image files or paginated
//! metadata payloads into records.

pub mod camera;
pub mod cluster;
pub mod config;
pub mod discovery;
pub mod error;
pub mod exif;
pub mod extract;
pub mod file_type;
pub mod optimizer;
pub mod quality;
pub mod reconcile;
pub mod record;

pub use camera::{detect_effective_delta, DetectionReason};
pub use config::{BracketingConfig, SingleFileHandling};
pub use error::{BracketError, ExtractionError};
pub use extract::{Extraction, RejectedFile};
pub use optimizer::{build_brackets, BracketOptimizer, BracketResult};
pub use quality::QualityReport;
pub use record::{Bracket, BracketKind, PhotoRecord};
