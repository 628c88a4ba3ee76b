//! PCM WAV reading and writing
//!
//! Decoding keeps the file's sample rate and channel layout untouched; no
//! resampling happens here.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::codec::buffer::{SampleBuffer, MAX_CHANNELS};
use crate::codec::Encoded;
use crate::error::{Result, VoxError};

/// Bit depths accepted for encoding
pub const SUPPORTED_BIT_DEPTHS: [u16; 3] = [16, 24, 32];

/// Decode a PCM WAV byte stream
///
/// # Errors
/// * `UnsupportedFormat` - If the RIFF/WAVE header cannot be parsed, the
///   channel count exceeds two, or the sample encoding is unsupported
/// * `CorruptAudio` - If the sample data is shorter than the header declares
pub fn decode_wav(bytes: &[u8]) -> Result<SampleBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| VoxError::UnsupportedFormat {
        format: "wav".to_string(),
        reason: format!("failed to parse WAV header: {}", e),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    if channels == 0 || channels > MAX_CHANNELS {
        return Err(VoxError::UnsupportedFormat {
            format: "wav".to_string(),
            reason: format!("{}-channel audio (only mono/stereo supported)", channels),
        });
    }

    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;

    // Sample data is counted in whole frames; a dangling partial frame means
    // the data chunk was cut mid-frame.
    if samples.len() % channels != 0 {
        return Err(VoxError::CorruptAudio {
            reason: format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            ),
            source: None,
        });
    }

    SampleBuffer::from_interleaved(&samples, channels, spec.sample_rate)
}

/// Encode a buffer as PCM WAV at the given bit depth
///
/// Samples outside [-1.0, 1.0] are clipped to the nearest bound and reported
/// once in the returned warnings.
pub fn encode_wav(buffer: &SampleBuffer, bit_depth: u16) -> Result<Encoded> {
    if !SUPPORTED_BIT_DEPTHS.contains(&bit_depth) {
        return Err(VoxError::UnsupportedFormat {
            format: "wav".to_string(),
            reason: format!("{}-bit output (only 16, 24, 32 supported)", bit_depth),
        });
    }

    let mut interleaved = buffer.interleaved();
    let clipped = clip_in_place(&mut interleaved);

    let mut warnings = Vec::new();
    if clipped > 0 {
        tracing::warn!(clipped, "clipping samples outside [-1.0, 1.0] during encode");
        warnings.push(format!(
            "{} sample(s) exceeded [-1.0, 1.0] and were clipped during encoding",
            clipped
        ));
    }

    let spec = WavSpec {
        channels: buffer.channel_count() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let mut cursor = Cursor::new(Vec::with_capacity(
        interleaved.len() * (bit_depth as usize / 8) + 44,
    ));
    write_samples(&mut cursor, spec, &interleaved).map_err(|e| VoxError::ProcessingFailure {
        reason: format!("WAV encoding failed: {}", e),
    })?;

    Ok(Encoded {
        bytes: cursor.into_inner(),
        warnings,
    })
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Clamp every sample to [-1.0, 1.0], returning how many were out of range
fn clip_in_place(samples: &mut [f32]) -> usize {
    let mut clipped = 0;
    for sample in samples.iter_mut() {
        if sample.is_nan() {
            *sample = 0.0;
            clipped += 1;
        } else if sample.abs() > 1.0 {
            *sample = sample.clamp(-1.0, 1.0);
            clipped += 1;
        }
    }
    clipped
}

fn write_samples(
    cursor: &mut Cursor<Vec<u8>>,
    spec: WavSpec,
    interleaved: &[f32],
) -> std::result::Result<(), hound::Error> {
    let mut writer = WavWriter::new(cursor, spec)?;

    match spec.bits_per_sample {
        16 => {
            for &sample in interleaved {
                writer.write_sample((sample * 32767.0).round() as i16)?;
            }
        }
        24 => {
            // 24-bit stored as i32 in hound
            for &sample in interleaved {
                writer.write_sample((sample * 8388607.0).round() as i32)?;
            }
        }
        _ => {
            for &sample in interleaved {
                writer.write_sample(sample)?;
            }
        }
    }

    writer.finalize()
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let declared = reader.len() as usize;

    let collected = match (sample_format, bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>(),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect(),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect(),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect(),
        (format, bits) => {
            return Err(VoxError::UnsupportedFormat {
                format: "wav".to_string(),
                reason: format!("{}-bit {:?} samples", bits, format),
            })
        }
    };

    collected.map_err(|e| VoxError::CorruptAudio {
        reason: format!("sample data shorter than the declared {} samples: {}", declared, e),
        source: Some(Box::new(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    #[test_case(16, 1e-4 ; "16-bit")]
    #[test_case(24, 1e-6 ; "24-bit")]
    #[test_case(32, 1e-7 ; "32-bit float")]
    fn test_identity_roundtrip_within_quantization(bit_depth: u16, tolerance: f32) {
        let original = SampleBuffer::sine_stereo(440.0, 880.0, 0.25, 22050, 0.8);

        let encoded = encode_wav(&original, bit_depth).unwrap();
        assert!(encoded.warnings.is_empty());

        let decoded = decode_wav(&encoded.bytes).unwrap();
        assert_eq!(decoded.sample_rate(), 22050);
        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.num_frames(), original.num_frames());

        for ch in 0..2 {
            for (a, b) in original.channel(ch).iter().zip(decoded.channel(ch)) {
                assert_abs_diff_eq!(*a, *b, epsilon = tolerance);
            }
        }
    }

    #[test]
    fn test_encode_clips_instead_of_wrapping() {
        let buffer = SampleBuffer::new(vec![vec![1.5, -2.0, 0.25]], 8000).unwrap();
        let encoded = encode_wav(&buffer, 16).unwrap();

        assert_eq!(encoded.warnings.len(), 1);
        assert!(encoded.warnings[0].starts_with("2 sample(s)"));

        let decoded = decode_wav(&encoded.bytes).unwrap();
        let samples = decoded.channel(0);
        assert!(samples[0] > 0.99);
        assert!(samples[1] < -0.99);
        assert_abs_diff_eq!(samples[2], 0.25, epsilon = 1e-4);
    }

    #[test]
    fn test_decode_rejects_non_riff() {
        let result = decode_wav(b"definitely not a wave file");
        assert!(matches!(result, Err(VoxError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_decode_truncated_data_is_corrupt() {
        let buffer = SampleBuffer::sine(440.0, 0.1, 8000, 0.5);
        let encoded = encode_wav(&buffer, 16).unwrap();
        let truncated = &encoded.bytes[..encoded.bytes.len() - 101];

        let result = decode_wav(truncated);
        assert!(
            matches!(result, Err(VoxError::CorruptAudio { .. })),
            "expected CorruptAudio, got {:?}",
            result
        );
    }

    #[test]
    fn test_decode_preserves_rate_and_channels() {
        let buffer = SampleBuffer::sine(300.0, 0.05, 11025, 0.3);
        let encoded = encode_wav(&buffer, 24).unwrap();
        let decoded = decode_wav(&encoded.bytes).unwrap();

        assert_eq!(decoded.sample_rate(), 11025);
        assert_eq!(decoded.channel_count(), 1);
    }

    #[test]
    fn test_encode_rejects_unsupported_bit_depth() {
        let buffer = SampleBuffer::sine(300.0, 0.01, 8000, 0.3);
        assert!(encode_wav(&buffer, 12).is_err());
    }
}
