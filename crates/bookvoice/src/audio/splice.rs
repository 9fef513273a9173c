//! Splices per-chunk WAVE fragments into one container.
//!
//! A straight byte splice: payloads are concatenated in input order under a
//! freshly computed header. No resampling or cross-fade happens, so every
//! fragment must share the first fragment's [`WaveFormat`].

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::AudioError;
use crate::sanitize;

use super::wav::{self, WavLayout, WaveFormat};

/// Outcome of a successful splice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpliceSummary {
    pub output_path: PathBuf,
    pub format: WaveFormat,
    pub fragment_count: usize,
    pub payload_len: u64,
}

struct ValidatedFragment<'a> {
    path: &'a Path,
    layout: WavLayout,
}

fn io_error(path: &Path, source: std::io::Error) -> AudioError {
    AudioError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Parses every fragment and checks format compatibility.
///
/// Nothing is written if any fragment is malformed or mismatched.
fn validate_fragments(fragments: &[PathBuf]) -> Result<Vec<ValidatedFragment<'_>>, AudioError> {
    let mut validated: Vec<ValidatedFragment<'_>> = Vec::with_capacity(fragments.len());

    for (index, path) in fragments.iter().enumerate() {
        let layout = wav::read_wav_layout(path)?;

        if let Some(first) = validated.first() {
            if layout.format != first.layout.format {
                return Err(AudioError::FormatMismatch {
                    index,
                    path: path.clone(),
                    expected: first.layout.format.to_string(),
                    found: layout.format.to_string(),
                });
            }
        }

        validated.push(ValidatedFragment { path, layout });
    }

    Ok(validated)
}

/// Concatenates `fragments` into a single WAVE file at `output`.
///
/// The output is first written next to its final location and renamed into
/// place once complete, so a failed splice never leaves a partial container
/// under the output name.
pub fn splice_fragments(fragments: &[PathBuf], output: &Path) -> Result<SpliceSummary, AudioError> {
    if fragments.is_empty() {
        return Err(AudioError::NoFragments);
    }

    let validated = validate_fragments(fragments)?;
    let first = &validated[0].layout;
    let payload_len: usize = validated.iter().map(|f| f.layout.data_len).sum();

    let header = wav::build_header(output, &first.fmt_body, payload_len)?;

    let partial = output.with_extension("wav.part");
    write_spliced(&partial, &header, &validated, payload_len).inspect_err(|_| {
        let _ = std::fs::remove_file(&partial);
    })?;
    std::fs::rename(&partial, output).map_err(|e| io_error(output, e))?;

    debug!(
        "Spliced {} fragments into {} ({} payload bytes)",
        validated.len(),
        sanitize::redact_path(output),
        payload_len
    );

    Ok(SpliceSummary {
        output_path: output.to_path_buf(),
        format: first.format,
        fragment_count: validated.len(),
        payload_len: payload_len as u64,
    })
}

fn write_spliced(
    target: &Path,
    header: &[u8],
    fragments: &[ValidatedFragment<'_>],
    payload_len: usize,
) -> Result<(), AudioError> {
    let file = File::create(target).map_err(|e| io_error(target, e))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(header).map_err(|e| io_error(target, e))?;

    for fragment in fragments {
        let mut source = File::open(fragment.path).map_err(|e| io_error(fragment.path, e))?;
        source
            .seek(SeekFrom::Start(fragment.layout.data_offset as u64))
            .map_err(|e| io_error(fragment.path, e))?;
        let mut payload = source.take(fragment.layout.data_len as u64);
        let copied =
            std::io::copy(&mut payload, &mut writer).map_err(|e| io_error(fragment.path, e))?;

        if copied != fragment.layout.data_len as u64 {
            return Err(AudioError::Format {
                path: fragment.path.to_path_buf(),
                reason: format!(
                    "payload shrank while splicing ({} of {} bytes)",
                    copied, fragment.layout.data_len
                ),
            });
        }
    }

    if payload_len & 1 == 1 {
        writer.write_all(&[0]).map_err(|e| io_error(target, e))?;
    }
    writer.flush().map_err(|e| io_error(target, e))?;
    Ok(())
}

/// Removes fragment files after a successful splice.
///
/// Failures are logged and otherwise ignored.
pub fn remove_fragments(fragments: &[PathBuf]) {
    for path in fragments {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!(
                "Failed to remove audio fragment {}: {}",
                sanitize::redact_path(path),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::test_support::pcm_wav;
    use tempfile::TempDir;

    fn write_fragment(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_splice_two_fragments_sums_payload() {
        let tmp = TempDir::new().unwrap();
        let a = write_fragment(tmp.path(), "a.wav", &pcm_wav(1, 22050, 16, 1000));
        let b = write_fragment(tmp.path(), "b.wav", &pcm_wav(1, 22050, 16, 2000));
        let out = tmp.path().join("out.wav");

        let summary = splice_fragments(&[a.clone(), b.clone()], &out).unwrap();
        assert_eq!(summary.payload_len, 3000);
        assert_eq!(summary.fragment_count, 2);

        let bytes = std::fs::read(&out).unwrap();
        let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(declared, 4 + (8 + 16) + (8 + 3000));

        let reparsed = wav::parse_wav(&out, &bytes).unwrap();
        assert_eq!(reparsed.data_len, 3000);
        assert_eq!(reparsed.format, summary.format);

        // Payload order is preserved.
        let a_bytes = std::fs::read(&a).unwrap();
        let b_bytes = std::fs::read(&b).unwrap();
        let data = &bytes[reparsed.data_offset..reparsed.data_offset + 3000];
        assert_eq!(&data[..1000], &a_bytes[44..1044]);
        assert_eq!(&data[1000..], &b_bytes[44..2044]);
    }

    #[test]
    fn test_single_fragment_round_trip() {
        let tmp = TempDir::new().unwrap();
        let a = write_fragment(tmp.path(), "a.wav", &pcm_wav(1, 24000, 16, 512));
        let out = tmp.path().join("out.wav");

        let summary = splice_fragments(&[a], &out).unwrap();
        assert_eq!(summary.payload_len, 512);
        assert_eq!(wav::read_wav_layout(&out).unwrap().data_len, 512);
    }

    #[test]
    fn test_sample_rate_mismatch_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let a = write_fragment(tmp.path(), "a.wav", &pcm_wav(1, 22050, 16, 100));
        let b = write_fragment(tmp.path(), "b.wav", &pcm_wav(1, 44100, 16, 100));
        let out = tmp.path().join("out.wav");

        let err = splice_fragments(&[a, b], &out).unwrap_err();
        match err {
            AudioError::FormatMismatch { index, .. } => assert_eq!(index, 1),
            other => panic!("expected FormatMismatch, got {:?}", other),
        }
        assert!(!out.exists());
        assert!(!out.with_extension("wav.part").exists());
    }

    #[test]
    fn test_malformed_fragment_fails() {
        let tmp = TempDir::new().unwrap();
        let a = write_fragment(tmp.path(), "a.wav", &pcm_wav(1, 22050, 16, 100));
        let b = write_fragment(tmp.path(), "b.wav", b"not a wav file at all");
        let out = tmp.path().join("out.wav");

        let err = splice_fragments(&[a, b], &out).unwrap_err();
        assert!(matches!(err, AudioError::Format { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_errors_name_fragment_without_directory() {
        let tmp = TempDir::new().unwrap();
        let a = write_fragment(tmp.path(), "a.wav", &pcm_wav(1, 22050, 16, 100));
        let b = write_fragment(tmp.path(), "b.wav", &pcm_wav(2, 22050, 16, 100));
        let c = write_fragment(tmp.path(), "c.wav", b"RIFF");
        let out = tmp.path().join("out.wav");
        let dir = tmp.path().display().to_string();

        let mismatch = splice_fragments(&[a.clone(), b], &out).unwrap_err().to_string();
        assert!(mismatch.contains("'b.wav'"), "{}", mismatch);
        assert!(!mismatch.contains(&dir), "{}", mismatch);

        let malformed = splice_fragments(&[a, c], &out).unwrap_err().to_string();
        assert!(malformed.contains("'c.wav'"), "{}", malformed);
        assert!(!malformed.contains(&dir), "{}", malformed);

        let missing = splice_fragments(&[tmp.path().join("gone.wav")], &out)
            .unwrap_err()
            .to_string();
        assert!(missing.contains("'gone.wav'"), "{}", missing);
        assert!(!missing.contains(&dir), "{}", missing);
    }

    #[test]
    fn test_no_fragments() {
        let tmp = TempDir::new().unwrap();
        let err = splice_fragments(&[], &tmp.path().join("out.wav")).unwrap_err();
        assert!(matches!(err, AudioError::NoFragments));
    }

    #[test]
    fn test_odd_total_payload_is_padded() {
        let tmp = TempDir::new().unwrap();
        let a = write_fragment(tmp.path(), "a.wav", &pcm_wav(1, 8000, 8, 3));
        let b = write_fragment(tmp.path(), "b.wav", &pcm_wav(1, 8000, 8, 4));
        let out = tmp.path().join("out.wav");

        splice_fragments(&[a, b], &out).unwrap();
        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(bytes.len(), 44 + 7 + 1);
        assert_eq!(wav::parse_wav(&out, &bytes).unwrap().data_len, 7);
    }

    #[test]
    fn test_output_readable_by_hound() {
        let tmp = TempDir::new().unwrap();
        let a = write_fragment(tmp.path(), "a.wav", &pcm_wav(1, 22050, 16, 200));
        let b = write_fragment(tmp.path(), "b.wav", &pcm_wav(1, 22050, 16, 300));
        let out = tmp.path().join("out.wav");
        splice_fragments(&[a, b], &out).unwrap();

        let reader = hound::WavReader::open(&out).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.len(), 250);
    }

    #[test]
    fn test_remove_fragments() {
        let tmp = TempDir::new().unwrap();
        let a = write_fragment(tmp.path(), "a.wav", &pcm_wav(1, 22050, 16, 10));
        remove_fragments(&[a.clone(), tmp.path().join("missing.wav")]);
        assert!(!a.exists());
    }
}
