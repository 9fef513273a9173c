//! RIFF/WAVE container parser and header writer.
//!
//! Only the container structure is interpreted: the `fmt ` chunk is decoded
//! into a [`WaveFormat`] and the `data` chunk is located, never decoded.
//! Every chunk boundary is checked against the buffer before any offset
//! derived from it is trusted.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::AudioError;

pub const RIFF_MAGIC: &[u8; 4] = b"RIFF";
pub const WAVE_MAGIC: &[u8; 4] = b"WAVE";
pub const FMT_CHUNK_ID: &[u8; 4] = b"fmt ";
pub const DATA_CHUNK_ID: &[u8; 4] = b"data";

/// Offset of the first chunk record: `RIFF` + size + `WAVE`.
pub const FIRST_CHUNK_OFFSET: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const MIN_FMT_LEN: usize = 16;

/// Format descriptor every fragment of one job must share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl fmt::Display for WaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tag {:#06x}, {} ch, {} Hz, {}-bit",
            self.format_tag, self.channels, self.sample_rate, self.bits_per_sample
        )
    }
}

/// One chunk record located inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub id: [u8; 4],
    pub size: u32,
    /// Offset of the first body byte.
    pub body_offset: usize,
}

impl ChunkRecord {
    fn body_end(&self) -> usize {
        self.body_offset + self.size as usize
    }

    /// Offset of the next record, honoring the even-byte padding rule.
    fn next_offset(&self) -> usize {
        self.body_end() + (self.size as usize & 1)
    }
}

/// Parsed layout of a WAVE container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavLayout {
    pub format: WaveFormat,
    /// Raw `fmt ` chunk body, reused verbatim when writing a new header.
    pub fmt_body: Vec<u8>,
    pub data_offset: usize,
    pub data_len: usize,
    pub chunks: Vec<ChunkRecord>,
}

fn format_error(path: &Path, reason: impl Into<String>) -> AudioError {
    AudioError::Format {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Walks the chunk records after the RIFF/WAVE preamble.
///
/// `path` is only used for error context.
pub fn read_chunks(path: &Path, bytes: &[u8]) -> Result<Vec<ChunkRecord>, AudioError> {
    if bytes.len() < FIRST_CHUNK_OFFSET {
        return Err(format_error(path, "file shorter than RIFF preamble"));
    }
    if &bytes[0..4] != RIFF_MAGIC {
        return Err(format_error(path, "missing RIFF marker"));
    }
    if &bytes[8..12] != WAVE_MAGIC {
        return Err(format_error(path, "missing WAVE marker"));
    }

    let mut chunks = Vec::new();
    let mut offset = FIRST_CHUNK_OFFSET;

    // A trailing fragment shorter than a record header is ignored.
    while offset + CHUNK_HEADER_LEN <= bytes.len() {
        let mut id = [0u8; 4];
        id.copy_from_slice(&bytes[offset..offset + 4]);
        let record = ChunkRecord {
            id,
            size: read_u32(bytes, offset + 4),
            body_offset: offset + CHUNK_HEADER_LEN,
        };

        if record.body_end() > bytes.len() {
            return Err(format_error(
                path,
                format!(
                    "chunk '{}' at offset {} declares {} bytes but only {} remain",
                    String::from_utf8_lossy(&record.id),
                    offset,
                    record.size,
                    bytes.len() - record.body_offset
                ),
            ));
        }

        offset = record.next_offset();
        chunks.push(record);
    }

    Ok(chunks)
}

/// Parses a complete WAVE container held in memory.
pub fn parse_wav(path: &Path, bytes: &[u8]) -> Result<WavLayout, AudioError> {
    let chunks = read_chunks(path, bytes)?;

    let fmt_chunk = chunks
        .iter()
        .find(|c| &c.id == FMT_CHUNK_ID)
        .ok_or_else(|| format_error(path, "missing 'fmt ' chunk"))?;
    if (fmt_chunk.size as usize) < MIN_FMT_LEN {
        return Err(format_error(
            path,
            format!("'fmt ' chunk too short ({} bytes)", fmt_chunk.size),
        ));
    }

    let data_chunk = chunks
        .iter()
        .find(|c| &c.id == DATA_CHUNK_ID)
        .ok_or_else(|| format_error(path, "missing 'data' chunk"))?;

    let at = fmt_chunk.body_offset;
    let format = WaveFormat {
        format_tag: read_u16(bytes, at),
        channels: read_u16(bytes, at + 2),
        sample_rate: read_u32(bytes, at + 4),
        bits_per_sample: read_u16(bytes, at + 14),
    };
    if format.channels == 0 || format.sample_rate == 0 || format.bits_per_sample == 0 {
        return Err(format_error(path, format!("degenerate format ({})", format)));
    }

    Ok(WavLayout {
        format,
        fmt_body: bytes[fmt_chunk.body_offset..fmt_chunk.body_end()].to_vec(),
        data_offset: data_chunk.body_offset,
        data_len: data_chunk.size as usize,
        chunks: chunks.clone(),
    })
}

/// Reads and parses a WAVE file from disk.
pub fn read_wav_layout(path: &Path) -> Result<WavLayout, AudioError> {
    let bytes = std::fs::read(path).map_err(|e| AudioError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_wav(path, &bytes)
}

/// Size of the RIFF body for a `fmt ` body and payload of the given lengths:
/// `4 ("WAVE") + (8 + fmt) + (8 + data [+ pad])`.
pub fn riff_size(fmt_len: usize, data_len: usize) -> u64 {
    4 + (CHUNK_HEADER_LEN + fmt_len + (fmt_len & 1)) as u64
        + (CHUNK_HEADER_LEN + data_len + (data_len & 1)) as u64
}

/// Builds the header bytes (everything up to the first payload byte).
///
/// The caller writes `data_len` payload bytes afterwards, plus one zero pad
/// byte when `data_len` is odd.
pub fn build_header(
    path: &Path,
    fmt_body: &[u8],
    data_len: usize,
) -> Result<Vec<u8>, AudioError> {
    let total = riff_size(fmt_body.len(), data_len);
    let riff_size = u32::try_from(total)
        .map_err(|_| format_error(path, format!("combined payload too large ({} bytes)", total)))?;
    let data_size = u32::try_from(data_len)
        .map_err(|_| format_error(path, format!("combined payload too large ({} bytes)", data_len)))?;
    let fmt_size = u32::try_from(fmt_body.len())
        .map_err(|_| format_error(path, "'fmt ' chunk too large"))?;

    let mut header = Vec::with_capacity(FIRST_CHUNK_OFFSET + 2 * CHUNK_HEADER_LEN + fmt_body.len() + 1);
    header.extend_from_slice(RIFF_MAGIC);
    header.extend_from_slice(&riff_size.to_le_bytes());
    header.extend_from_slice(WAVE_MAGIC);
    header.extend_from_slice(FMT_CHUNK_ID);
    header.extend_from_slice(&fmt_size.to_le_bytes());
    header.extend_from_slice(fmt_body);
    if fmt_body.len() & 1 == 1 {
        header.push(0);
    }
    header.extend_from_slice(DATA_CHUNK_ID);
    header.extend_from_slice(&data_size.to_le_bytes());
    Ok(header)
}
