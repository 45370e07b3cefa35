use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::container::EncodedContainer;
use crate::models::error::CaptureError;

/// Descriptive sidecar for an archived container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub id: Uuid,
    /// `recording`, `chunk` or `upload`.
    pub kind: String,
    pub sequence: Option<u64>,
    pub file_name: String,
    pub sample_rate: u32,
    pub sample_count: usize,
    pub duration: f64,
    /// SHA-256 of the WAV bytes, lowercase hex.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl ContainerMetadata {
    pub fn from_container(container: &EncodedContainer) -> Self {
        Self {
            id: container.id(),
            kind: container.kind().label().to_string(),
            sequence: container.sequence(),
            file_name: container.file_name(),
            sample_rate: container.sample_rate(),
            sample_count: container.sample_count(),
            duration: container.duration_secs(),
            checksum: container.checksum(),
            created_at: container.created_at(),
        }
    }
}

/// Keeps a local copy of every container handed to the analysis service.
///
/// Layout: `{dir}/{kind}_{id}.wav` plus `{kind}_{id}.metadata.json`.
#[derive(Debug, Clone)]
pub struct ContainerArchive {
    dir: PathBuf,
}

impl ContainerArchive {
    /// Creates the directory if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the WAV and its sidecar; returns the WAV path.
    pub fn save(&self, container: &EncodedContainer) -> Result<PathBuf, CaptureError> {
        let path = self
            .dir
            .join(format!("{}_{}.wav", container.kind().label(), container.id()));
        fs::write(&path, container.bytes())
            .map_err(|e| CaptureError::StorageError(format!("failed to write {}: {}", path.display(), e)))?;
        write_metadata(&ContainerMetadata::from_container(container), &path)?;
        log::debug!("Archived {} ({} samples)", path.display(), container.sample_count());
        Ok(path)
    }
}

/// Write metadata as `{wav_path stem}.metadata.json` next to the WAV.
pub fn write_metadata(metadata: &ContainerMetadata, wav_path: &Path) -> Result<(), CaptureError> {
    let metadata_path = wav_path.with_extension("metadata.json");
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&metadata_path, json)
        .map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

pub fn read_metadata(wav_path: &Path) -> Result<ContainerMetadata, CaptureError> {
    let metadata_path = wav_path.with_extension("metadata.json");
    let json = fs::read_to_string(&metadata_path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))
}
