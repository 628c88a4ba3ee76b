//! Codec Adapter
//!
//! Converts between container bytes and [`SampleBuffer`]s:
//! - PCM WAV (decode + encode, via hound)
//! - MPEG audio (decode only, via symphonia)
//!
//! The container is chosen from the declared extension; bytes are never
//! sniffed.

pub mod buffer;
mod mp3;
mod wav;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use buffer::SampleBuffer;
pub use mp3::decode_mp3;
pub use wav::{decode_wav, encode_wav, SUPPORTED_BIT_DEPTHS};

use crate::error::{Result, VoxError};

/// The recognized audio containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Uncompressed PCM WAV
    Wav,
    /// MPEG audio (layer III)
    Mp3,
}

impl AudioFormat {
    /// Resolve a declared extension (`"wav"`, `".MP3"`, ...) to a format
    ///
    /// # Errors
    /// * `UnsupportedFormat` - For any extension outside the allow-list
    pub fn from_extension(extension: &str) -> Result<Self> {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            _ => Err(VoxError::UnsupportedFormat {
                format: extension.to_string(),
                reason: "only .wav and .mp3 containers are recognized".to_string(),
            }),
        }
    }

    /// Resolve the format of a filename from its extension
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(extension)
    }

    /// Canonical file extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    /// True if buffers can be encoded into this container
    pub fn can_encode(&self) -> bool {
        matches!(self, AudioFormat::Wav)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Output of an encode: the container bytes plus non-fatal warnings
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Decode container bytes into a sample buffer
///
/// The declared extension selects the container. Sample rate and channel
/// count are preserved exactly.
pub fn decode(bytes: &[u8], declared_extension: &str) -> Result<SampleBuffer> {
    let format = AudioFormat::from_extension(declared_extension)?;
    let buffer = match format {
        AudioFormat::Wav => decode_wav(bytes)?,
        AudioFormat::Mp3 => decode_mp3(bytes)?,
    };

    tracing::debug!(
        %format,
        sample_rate = buffer.sample_rate(),
        channels = buffer.channel_count(),
        frames = buffer.num_frames(),
        "decoded audio"
    );

    Ok(buffer)
}

/// Encode a sample buffer into the target container
///
/// # Errors
/// * `UnsupportedFormat` - For containers without an encoder (MP3) or an
///   unsupported bit depth
pub fn encode(buffer: &SampleBuffer, target: AudioFormat, bit_depth: u16) -> Result<Encoded> {
    match target {
        AudioFormat::Wav => encode_wav(buffer, bit_depth),
        AudioFormat::Mp3 => Err(VoxError::UnsupportedFormat {
            format: target.to_string(),
            reason: "MPEG encoding is not available; derived artifacts are written as WAV"
                .to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("wav", AudioFormat::Wav)]
    #[test_case(".WAV", AudioFormat::Wav)]
    #[test_case("mp3", AudioFormat::Mp3)]
    #[test_case(".Mp3", AudioFormat::Mp3)]
    fn test_from_extension(extension: &str, expected: AudioFormat) {
        assert_eq!(AudioFormat::from_extension(extension).unwrap(), expected);
    }

    #[test_case("flac")]
    #[test_case("ogg")]
    #[test_case("")]
    fn test_from_extension_rejects(extension: &str) {
        let err = AudioFormat::from_extension(extension).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_from_filename() {
        assert_eq!(
            AudioFormat::from_filename("clip_robotic.wav").unwrap(),
            AudioFormat::Wav
        );
        assert!(AudioFormat::from_filename("notes.txt").is_err());
    }

    #[test]
    fn test_decode_dispatches_on_declared_extension() {
        let buffer = SampleBuffer::sine(440.0, 0.05, 8000, 0.5);
        let encoded = encode(&buffer, AudioFormat::Wav, 16).unwrap();

        assert!(decode(&encoded.bytes, "wav").is_ok());
        // WAV bytes declared as something else are not sniffed into WAV
        assert!(decode(&encoded.bytes, "flac").is_err());
    }

    #[test]
    fn test_encode_mp3_is_unsupported() {
        let buffer = SampleBuffer::sine(440.0, 0.05, 8000, 0.5);
        assert!(!AudioFormat::Mp3.can_encode());
        assert!(encode(&buffer, AudioFormat::Mp3, 16).is_err());
    }
}
