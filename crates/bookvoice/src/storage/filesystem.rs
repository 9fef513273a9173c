use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::sanitize;

/// Extracted text written by the extractor.
pub const TEXT_FILE_NAME: &str = "pdf_result.md";
pub const METADATA_FILE_NAME: &str = "metadata.json";
pub const AUDIO_DIR_NAME: &str = "audio";
pub const FINAL_AUDIO_FILE_NAME: &str = "audiobook.wav";

/// Alignment outputs, by files-created role.
pub const ALIGNMENT_OUTPUTS: [(&str, &str); 4] = [
    ("text_mappings", "text_mappings.json"),
    ("text_mappings_words", "text_mappings_words.json"),
    ("text_mappings_sentences", "text_mappings_sentences.json"),
    ("transcription", "transcription.json"),
];

/// Listing record stored next to each book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    /// Name of the book's folder under the destination root.
    pub folder_id: String,
    pub created_at: DateTime<Utc>,
}

/// Paths of one book's output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLayout {
    pub folder_id: String,
    pub book_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub chunks_dir: PathBuf,
}

impl BookLayout {
    fn new(book_dir: PathBuf) -> Self {
        let folder_id = book_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let audio_dir = book_dir.join(AUDIO_DIR_NAME);
        let chunks_dir = audio_dir.join("chunks");
        Self {
            folder_id,
            book_dir,
            audio_dir,
            chunks_dir,
        }
    }

    pub fn text_path(&self) -> PathBuf {
        self.book_dir.join(TEXT_FILE_NAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.book_dir.join(METADATA_FILE_NAME)
    }

    /// Final, playable audiobook.
    pub fn final_audio_path(&self) -> PathBuf {
        self.audio_dir.join(FINAL_AUDIO_FILE_NAME)
    }

    /// Spliced audio before time-stretching.
    pub fn combined_audio_path(&self) -> PathBuf {
        self.audio_dir.join("combined.wav")
    }

    /// Synthesized audio of chunk `index`.
    pub fn fragment_path(&self, index: usize) -> PathBuf {
        self.chunks_dir.join(format!("chunk_{:04}.wav", index))
    }

    pub fn alignment_outputs(&self) -> Vec<(&'static str, PathBuf)> {
        ALIGNMENT_OUTPUTS
            .iter()
            .map(|(role, name)| (*role, self.book_dir.join(name)))
            .collect()
    }
}

/// Writes books under a destination root.
pub struct BookStorage {
    root: PathBuf,
}

impl BookStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh folder for `title` with its `audio/` subfolders.
    ///
    /// The folder name is the sanitized title. When it is taken, `_2`, `_3`,
    /// ... are appended, so a job never writes into another job's folder.
    pub fn prepare(&self, title: &str) -> Result<BookLayout, StorageError> {
        ensure_directory(&self.root)?;
        let base = sanitize::sanitize_title(title);

        for counter in 1..=1000 {
            let name = if counter == 1 {
                base.clone()
            } else {
                format!("{}_{}", base, counter)
            };
            let candidate = self.root.join(&name);

            // create_dir fails if the folder exists: atomic check-and-create.
            match std::fs::create_dir(&candidate) {
                Ok(()) => {
                    let layout = BookLayout::new(candidate);
                    ensure_directory(&layout.chunks_dir)?;
                    return Ok(layout);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::CreateDirectory {
                        path: candidate,
                        source: e,
                    })
                }
            }
        }

        Err(StorageError::FolderExists(self.root.join(base)))
    }

    /// Writes the submitted source file into the book folder.
    pub fn write_source(
        &self,
        layout: &BookLayout,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = layout.book_dir.join(file_name);
        write_file(&path, bytes)?;
        Ok(path)
    }

    pub fn write_metadata(
        &self,
        layout: &BookLayout,
        metadata: &BookMetadata,
    ) -> Result<PathBuf, StorageError> {
        let path = layout.metadata_path();
        let json = serde_json::to_vec_pretty(metadata).map_err(|e| StorageError::Metadata {
            path: path.clone(),
            source: e,
        })?;
        write_file(&path, &json)?;
        Ok(path)
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    std::fs::write(path, bytes).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn read_metadata(path: &Path) -> Result<BookMetadata, StorageError> {
    let bytes = read_file(path)?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::Metadata {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, StorageError> {
    std::fs::read(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Lists the books under `root`, newest first.
///
/// Folders without a readable metadata record are skipped.
pub fn list_books(root: &Path) -> Vec<BookMetadata> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut books: Vec<BookMetadata> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let path = e.path().join(METADATA_FILE_NAME);
            if !path.is_file() {
                return None;
            }
            match read_metadata(&path) {
                Ok(meta) => Some(meta),
                Err(err) => {
                    log::warn!("Skipping book folder: {}", err);
                    None
                }
            }
        })
        .collect();

    books.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    books
}
