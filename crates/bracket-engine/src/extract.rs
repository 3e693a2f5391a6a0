//! Parallel metadata extraction over a storage source.
//!
//! Each file is read independently (header only for most RAW formats), its
//! capture metadata parsed, and the results merged into one record list.
//! Files that cannot be read or carry no usable timestamp are reported as
//! rejected with a reason.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::exif::MetadataReader;
use crate::file_type::{validate_size, FileKind, ReadPlan};
use crate::record::PhotoRecord;

/// A file listed by a storage source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
}

/// A file that did not produce a record, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedFile {
    pub name: String,
    pub path: String,
    pub reason: String,
}

/// Records extracted from a job plus the files that were turned away
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub records: Vec<PhotoRecord>,
    pub rejected: Vec<RejectedFile>,
}

/// Where image files come from.
pub trait StorageSource: Send + Sync {
    /// List supported image files in `folder`
    fn list_files(&self, folder: &str) -> Result<Vec<FileEntry>, ExtractionError>;

    /// Read a file according to `plan`
    fn read(&self, path: &str, plan: ReadPlan) -> Result<Vec<u8>, ExtractionError>;
}

/// A folder on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFolder {
    root: PathBuf,
}

impl LocalFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

impl StorageSource for LocalFolder {
    fn list_files(&self, folder: &str) -> Result<Vec<FileEntry>, ExtractionError> {
        let dir = self.resolve(folder);
        if !dir.is_dir() {
            return Err(ExtractionError::FolderNotFound(dir));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !FileKind::from_name(&name).is_supported() {
                continue;
            }
            files.push(FileEntry {
                path: entry.path().to_string_lossy().to_string(),
                name,
                size: metadata.len(),
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(folder = %dir.display(), files = files.len(), "listed folder");
        Ok(files)
    }

    fn read(&self, path: &str, plan: ReadPlan) -> Result<Vec<u8>, ExtractionError> {
        read_file(Path::new(path), plan)
    }
}

fn read_file(path: &Path, plan: ReadPlan) -> Result<Vec<u8>, ExtractionError> {
    match plan {
        ReadPlan::Full => Ok(fs::read(path)?),
        ReadPlan::HeaderOnly(limit) => {
            let mut buf = Vec::with_capacity(limit);
            File::open(path)?.take(limit as u64).read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn extract_one(
    source: &dyn StorageSource,
    reader: &dyn MetadataReader,
    file: &FileEntry,
) -> Result<PhotoRecord, ExtractionError> {
    let kind = FileKind::from_name(&file.name);
    if !kind.is_supported() {
        return Err(ExtractionError::UnsupportedFormat(file.name.clone()));
    }
    validate_size(&file.name, file.size)?;

    let bytes = source.read(&file.path, kind.read_plan())?;
    let metadata = reader.read(&file.name, &bytes)?;

    let mut record = PhotoRecord::new(&file.name, &file.path, metadata.capture_time).with_size(file.size);
    record.camera_model = metadata.camera_model;
    Ok(record)
}

/// Extract records for `files` in parallel.
///
/// `progress` is called with `(completed, total)` after each file. Output
/// records are ordered by path and each path appears at most once.
pub fn extract_all<F>(
    source: &dyn StorageSource,
    files: &[FileEntry],
    reader: &dyn MetadataReader,
    progress: F,
) -> Extraction
where
    F: Fn(usize, usize) + Send + Sync,
{
    let total = files.len();
    let completed = AtomicUsize::new(0);

    let results: Vec<(&FileEntry, Result<PhotoRecord, ExtractionError>)> = files
        .par_iter()
        .map(|file| {
            let result = extract_one(source, reader, file);
            let current = completed.fetch_add(1, Ordering::Relaxed) + 1;
            progress(current, total);
            (file, result)
        })
        .collect();

    let mut extraction = Extraction::default();
    for (file, result) in results {
        match result {
            Ok(record) => extraction.records.push(record),
            Err(e) => {
                warn!(path = %file.path, error = %e, "skipping file");
                extraction.rejected.push(RejectedFile {
                    name: file.name.clone(),
                    path: file.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    extraction.records.sort_by(|a, b| a.path.cmp(&b.path));
    let before = extraction.records.len();
    extraction.records.dedup_by(|a, b| a.path == b.path);
    if extraction.records.len() < before {
        warn!(duplicates = before - extraction.records.len(), "dropped duplicate paths");
    }

    info!(
        total,
        records = extraction.records.len(),
        rejected = extraction.rejected.len(),
        "metadata extraction complete"
    );
    extraction
}

/// List `folder` and extract every supported file in it.
pub fn extract_folder(
    source: &dyn StorageSource,
    folder: &str,
    reader: &dyn MetadataReader,
) -> Result<Extraction, ExtractionError> {
    let files = source.list_files(folder)?;
    Ok(extract_all(source, &files, reader, |_, _| {}))
}
