//! WAV container utilities.
//!
//! Generates and parses the canonical 44-byte RIFF header and quantizes
//! normalized float samples into 16-bit little-endian PCM.

use crate::models::error::CaptureError;

/// Size of the canonical WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Media type tag of every encoded container.
pub const WAV_MEDIA_TYPE: &str = "audio/wav";

const PCM_FORMAT_CODE: u16 = 1;

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (36 + data_size)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let block_align = channels * bit_depth / 8;
    let byte_rate = sample_rate.wrapping_mul(block_align as u32);
    let chunk_size = 36u32.saturating_add(data_size);

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&PCM_FORMAT_CODE.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Quantize one normalized sample to signed 16-bit.
///
/// Negative values scale by 32768 and non-negative by 32767 so both ends
/// of `[-1, 1]` land exactly on `i16::MIN` and `i16::MAX`. NaN maps to 0.
pub fn quantize_sample(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled.round() as i16
}

/// Encode mono samples as a complete 16-bit PCM WAV byte sequence.
///
/// Pure: the same input always yields byte-identical output.
pub fn encode_pcm16_mono(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_size = u32::try_from(samples.len() * 2).unwrap_or(u32::MAX);

    let mut bytes = Vec::with_capacity(WAV_HEADER_SIZE + samples.len() * 2);
    bytes.extend_from_slice(&generate_wav_header(sample_rate, 16, 1, data_size));
    for &sample in samples {
        bytes.extend_from_slice(&quantize_sample(sample).to_le_bytes());
    }
    bytes
}

/// Decode a little-endian 16-bit PCM payload. A trailing odd byte is ignored.
pub fn decode_pcm16(payload: &[u8]) -> Vec<i16> {
    payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Decoded fields of a canonical 44-byte PCM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub chunk_size: u32,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bit_depth: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Parse and validate the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, CaptureError> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(CaptureError::InvalidContainer(format!(
                "need {} header bytes, got {}",
                WAV_HEADER_SIZE,
                bytes.len()
            )));
        }
        for (offset, tag) in [(0, b"RIFF"), (8, b"WAVE"), (12, b"fmt "), (36, b"data")] {
            if &bytes[offset..offset + 4] != tag {
                return Err(CaptureError::InvalidContainer(format!(
                    "missing {:?} tag at offset {}",
                    String::from_utf8_lossy(tag),
                    offset
                )));
            }
        }

        let format = read_u16(bytes, 20);
        if format != PCM_FORMAT_CODE {
            return Err(CaptureError::InvalidContainer(format!("unsupported format code {}", format)));
        }

        Ok(Self {
            chunk_size: read_u32(bytes, 4),
            channels: read_u16(bytes, 22),
            sample_rate: read_u32(bytes, 24),
            byte_rate: read_u32(bytes, 28),
            block_align: read_u16(bytes, 32),
            bit_depth: read_u16(bytes, 34),
            data_size: read_u32(bytes, 40),
        })
    }

    /// Total file size the header declares.
    pub fn declared_file_size(&self) -> u64 {
        self.chunk_size as u64 + 8
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / channels;
    let scale = 1.0 / channels as f32;
    let mut mono = Vec::with_capacity(frame_count);
    for frame in samples.chunks_exact(channels) {
        mono.push(frame.iter().sum::<f32>() * scale);
    }
    mono
}
