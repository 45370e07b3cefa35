use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::CaptureError;
use crate::processing::wav_format::{self, WavHeader};

/// What produced an [`EncodedContainer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContainerKind {
    /// A whole one-shot recording.
    Recording,
    /// One fixed-length window of a continuous stream.
    Chunk { sequence: u64 },
    /// An existing WAV file supplied by the caller.
    Upload { file_name: String },
}

impl ContainerKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Chunk { .. } => "chunk",
            Self::Upload { .. } => "upload",
        }
    }
}

/// One complete, playable mono 16-bit WAV object.
///
/// Created once per encode call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedContainer {
    id: Uuid,
    kind: ContainerKind,
    sample_rate: u32,
    sample_count: usize,
    created_at: DateTime<Utc>,
    bytes: Vec<u8>,
}

impl EncodedContainer {
    /// Encode `samples` at `sample_rate` into a new container.
    pub fn encode(kind: ContainerKind, samples: &[f32], sample_rate: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            sample_rate,
            sample_count: samples.len(),
            created_at: Utc::now(),
            bytes: wav_format::encode_pcm16_mono(samples, sample_rate),
        }
    }

    /// Wrap an existing WAV file, validating its header.
    pub fn from_wav_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, CaptureError> {
        let header = WavHeader::parse(&bytes)?;
        let frame_bytes = header.block_align.max(1) as usize;
        let payload = bytes.len().saturating_sub(wav_format::WAV_HEADER_SIZE);
        let data_len = (header.data_size as usize).min(payload);
        Ok(Self {
            id: Uuid::new_v4(),
            kind: ContainerKind::Upload {
                file_name: file_name.into(),
            },
            sample_rate: header.sample_rate,
            sample_count: data_len / frame_bytes,
            created_at: Utc::now(),
            bytes,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &ContainerKind {
        &self.kind
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &'static str {
        wav_format::WAV_MEDIA_TYPE
    }

    /// File name used when the container is uploaded.
    pub fn file_name(&self) -> String {
        match &self.kind {
            ContainerKind::Recording => "recording.wav".into(),
            ContainerKind::Chunk { .. } => "chunk.wav".into(),
            ContainerKind::Upload { file_name } => file_name.clone(),
        }
    }

    pub fn sequence(&self) -> Option<u64> {
        match self.kind {
            ContainerKind::Chunk { sequence } => Some(sequence),
            _ => None,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / self.sample_rate as f64
    }

    /// Hex SHA-256 of the container bytes.
    pub fn checksum(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn chunk_container_metadata() {
        let samples = vec![0.0f32; 22050];
        let container = EncodedContainer::encode(ContainerKind::Chunk { sequence: 3 }, &samples, 44100);

        assert_eq!(container.media_type(), "audio/wav");
        assert_eq!(container.file_name(), "chunk.wav");
        assert_eq!(container.sequence(), Some(3));
        assert_eq!(container.bytes().len(), 44 + 2 * 22050);
        assert_relative_eq!(container.duration_secs(), 0.5);
    }

    #[test]
    fn checksum_is_sha256_hex() {
        let container = EncodedContainer::encode(ContainerKind::Recording, &[0.25, -0.25], 16000);
        let checksum = container.checksum();
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));

        let again = EncodedContainer::encode(ContainerKind::Recording, &[0.25, -0.25], 16000);
        assert_eq!(again.checksum(), checksum);
        assert_ne!(again.id(), container.id());
    }

    #[test]
    fn upload_keeps_bytes_and_reads_header() {
        let encoded = wav_format::encode_pcm16_mono(&[0.1; 480], 48000);
        let container = EncodedContainer::from_wav_bytes("clip.wav", encoded.clone()).unwrap();

        assert_eq!(container.file_name(), "clip.wav");
        assert_eq!(container.sample_rate(), 48000);
        assert_eq!(container.sample_count(), 480);
        assert_eq!(container.bytes(), encoded.as_slice());
    }

    #[test]
    fn upload_rejects_non_wav() {
        let err = EncodedContainer::from_wav_bytes("notes.txt", b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidContainer(_)));
    }
}
