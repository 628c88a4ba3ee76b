//! MPEG audio decoding via symphonia
//!
//! MP3 is accepted as an upload container only; derived artifacts are always
//! written as WAV.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer as PacketBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::codec::buffer::{SampleBuffer, MAX_CHANNELS};
use crate::error::{Result, VoxError};

/// Frames a stream may fall short of its declared length before it counts as truncated
const DECLARED_LENGTH_SLACK: u64 = 2304;

fn unsupported(reason: String) -> VoxError {
    VoxError::UnsupportedFormat {
        format: "mp3".to_string(),
        reason,
    }
}

/// Decode an MPEG audio byte stream
///
/// # Errors
/// * `UnsupportedFormat` - If no MPEG audio track can be probed or no decoder
///   accepts it
/// * `CorruptAudio` - If the stream yields no audio, or ends well before the
///   frame count its header declares
pub fn decode_mp3(bytes: &[u8]) -> Result<SampleBuffer> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| unsupported(format!("failed to probe MPEG stream: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unsupported("no audio track found".to_string()))?;
    let track_id = track.id;
    let declared_frames = track.codec_params.n_frames;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| unsupported(format!("no decoder for track: {}", e)))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channel_count = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(VoxError::CorruptAudio {
                    reason: format!("failed to read MPEG packet: {}", e),
                    source: Some(Box::new(e)),
                })
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channel_count = spec.channels.count();

                let mut packet_buffer = PacketBuffer::<f32>::new(decoded.capacity() as u64, spec);
                packet_buffer.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(packet_buffer.samples());
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                // A bad frame is dropped; the stream continues with the next one
                skipped_packets += 1;
                tracing::debug!(reason, "skipping undecodable MPEG frame");
            }
            Err(e) => {
                return Err(VoxError::CorruptAudio {
                    reason: format!("MPEG decoding failed: {}", e),
                    source: Some(Box::new(e)),
                })
            }
        }
    }

    if channel_count == 0 || channel_count > MAX_CHANNELS {
        return Err(unsupported(format!(
            "{}-channel audio (only mono/stereo supported)",
            channel_count
        )));
    }

    if interleaved.is_empty() {
        return Err(VoxError::CorruptAudio {
            reason: format!(
                "MPEG stream contained no decodable audio ({} bad frame(s))",
                skipped_packets
            ),
            source: None,
        });
    }

    let decoded_frames = (interleaved.len() / channel_count) as u64;
    if let Some(declared) = declared_frames {
        if decoded_frames + DECLARED_LENGTH_SLACK < declared {
            return Err(VoxError::CorruptAudio {
                reason: format!(
                    "stream truncated: decoded {} of {} declared frames",
                    decoded_frames, declared
                ),
                source: None,
            });
        }
    }

    if skipped_packets > 0 {
        tracing::warn!(skipped_packets, "dropped undecodable MPEG frames");
    }

    SampleBuffer::from_interleaved(&interleaved, channel_count, sample_rate)
}
