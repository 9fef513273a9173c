//! Voice sample store.
//!
//! Samples live as flat files in one user-configurable directory, named
//! `<id>_<display name>.<ext>`. A sample id resolves to the first file whose
//! stem is the id itself or starts with `<id>_`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::SampleError;
use crate::sanitize;

/// A stored voice sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSample {
    pub id: String,
    pub display_name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

fn io_error(path: &Path, source: std::io::Error) -> SampleError {
    SampleError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_dir(dir: &Path) -> Result<(), SampleError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        debug!("Created voice sample directory {}", dir.display());
    }
    Ok(())
}

/// Top-level files of `dir`, ordered by file name.
fn sample_files(dir: &Path) -> Result<Vec<PathBuf>, SampleError> {
    ensure_dir(dir)?;
    let files = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    Ok(files)
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

fn matches_id(path: &Path, sample_id: &str) -> bool {
    file_stem(path)
        .map(|stem| {
            stem == sample_id
                || stem
                    .strip_prefix(sample_id)
                    .is_some_and(|rest| rest.starts_with('_'))
        })
        .unwrap_or(false)
}

fn is_audio_file(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.type_() == mime_guess::mime::AUDIO)
        .unwrap_or(false)
}

/// Splits a stem into `(id, display name)`.
fn split_stem(stem: &str) -> (&str, &str) {
    match stem.split_once('_') {
        Some((id, display)) if !id.is_empty() && !display.is_empty() => (id, display),
        _ => (stem, stem),
    }
}

fn validate_display_name(name: &str) -> Result<String, SampleError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.contains(['/', '\\'])
        || trimmed == "."
        || trimmed == ".."
    {
        return Err(SampleError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn describe(path: &Path) -> Result<VoiceSample, SampleError> {
    let stem = file_stem(path).ok_or_else(|| SampleError::InvalidName(path.display().to_string()))?;
    let (id, display_name) = split_stem(stem);
    let meta = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    Ok(VoiceSample {
        id: id.to_string(),
        display_name: display_name.to_string(),
        path: path.to_path_buf(),
        size: meta.len(),
        modified: DateTime::<Utc>::from(modified),
    })
}

/// Finds the file backing `sample_id` in `dir`.
pub fn resolve(sample_id: &str, dir: &Path) -> Result<PathBuf, SampleError> {
    if sample_id.trim().is_empty() {
        return Err(SampleError::NotFound(sample_id.to_string()));
    }
    sample_files(dir)?
        .into_iter()
        .find(|path| matches_id(path, sample_id))
        .ok_or_else(|| SampleError::NotFound(sample_id.to_string()))
}

/// Lists audio samples in `dir`, most recently modified first.
pub fn list(dir: &Path) -> Result<Vec<VoiceSample>, SampleError> {
    let mut samples = Vec::new();
    for path in sample_files(dir)? {
        if !is_audio_file(&path) {
            continue;
        }
        match describe(&path) {
            Ok(sample) => samples.push(sample),
            Err(e) => log::warn!("Skipping voice sample {}: {}", sanitize::redact_path(&path), e),
        }
    }
    samples.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(samples)
}

/// Stores a new sample and returns it with a freshly generated id.
pub fn add_sample(
    dir: &Path,
    display_name: &str,
    bytes: &[u8],
    extension: &str,
) -> Result<VoiceSample, SampleError> {
    let display_name = validate_display_name(display_name)?;
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() || extension.contains(['/', '\\']) {
        return Err(SampleError::InvalidName(format!("{}.{}", display_name, extension)));
    }

    ensure_dir(dir)?;
    let id = uuid::Uuid::new_v4().simple().to_string();
    let path = dir.join(format!("{}_{}.{}", id, display_name, extension));
    std::fs::write(&path, bytes).map_err(|e| io_error(&path, e))?;

    info!("Added voice sample {} ({} bytes)", id, bytes.len());
    describe(&path)
}

/// Changes the display name of a sample, keeping its id and extension.
pub fn rename_sample(dir: &Path, sample_id: &str, new_name: &str) -> Result<VoiceSample, SampleError> {
    let new_name = validate_display_name(new_name)?;
    let current = resolve(sample_id, dir)?;

    let mut file_name = format!("{}_{}", sample_id, new_name);
    if let Some(ext) = current.extension().and_then(|e| e.to_str()) {
        file_name.push('.');
        file_name.push_str(ext);
    }
    let target = dir.join(file_name);
    std::fs::rename(&current, &target).map_err(|e| io_error(&current, e))?;

    info!("Renamed voice sample {}", sample_id);
    describe(&target)
}

/// Removes the file backing `sample_id`.
pub fn delete_sample(dir: &Path, sample_id: &str) -> Result<(), SampleError> {
    let path = resolve(sample_id, dir)?;
    std::fs::remove_file(&path).map_err(|e| io_error(&path, e))?;
    info!("Deleted voice sample {}", sample_id);
    Ok(())
}
