use std::path::PathBuf;

/// Failures of the bracket optimizer. All of them are local and deterministic,
/// so none are worth retrying with the same input.
#[derive(Debug, thiserror::Error)]
pub enum BracketError {
    #[error("invalid bracketing configuration: {0}")]
    Configuration(String),

    #[error("record has no capture timestamp: {path}")]
    IncompleteRecord { path: String },
}

/// Per-file failures of the extraction stage.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error for {name}: {message}")]
    Exif { name: String, message: String },

    #[error("no capture timestamp found in {0}")]
    MissingTimestamp(String),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("folder does not exist: {}", .0.display())]
    FolderNotFound(PathBuf),

    #[error("file too large: {name} ({size_mb:.1}MB > {limit_mb}MB limit)")]
    TooLarge {
        name: String,
        size_mb: f64,
        limit_mb: u64,
    },
}

pub type Result<T> = std::result::Result<T, BracketError>;
