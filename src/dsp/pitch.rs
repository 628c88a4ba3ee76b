//! Pitch shifting
//!
//! Two stages:
//! 1. Resample by `2^(semitones / 12)`: pitch and duration both change.
//! 2. Overlap-add time stretch to the wanted duration: the input duration
//!    for [`PitchShifter`], or the input duration times `stretch_ratio` for
//!    [`PitchShiftCompressor`].

use crate::codec::SampleBuffer;
use crate::dsp::resample::resample;
use crate::dsp::stretch::TimeStretcher;
use crate::dsp::transform::Transform;
use crate::error::{Result, VoxError};

/// Frequency ratio for a shift in semitones
#[inline]
pub fn semitone_ratio(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Resampling factor for `semitones` at `sample_rate`
///
/// # Errors
/// * `InvalidParameters` - If the virtual rate `sample_rate * 2^(s/12)`
///   is not a positive, finite rate of at least 1 Hz
pub fn shift_factor(semitones: f64, sample_rate: u32) -> Result<f64> {
    let factor = semitone_ratio(semitones);
    let virtual_rate = sample_rate as f64 * factor;

    if !factor.is_finite() || !virtual_rate.is_finite() || virtual_rate < 1.0 {
        return Err(VoxError::InvalidParameters {
            reason: format!(
                "a shift of {} semitones needs an output rate of {} Hz",
                semitones, virtual_rate
            ),
        });
    }

    Ok(factor)
}

/// Pitch shift that keeps the input duration (male / female voices)
#[derive(Debug, Clone)]
pub struct PitchShifter {
    semitones: f64,
    stretcher: TimeStretcher,
}

impl PitchShifter {
    pub fn new(semitones: f64, stretcher: TimeStretcher) -> Self {
        Self {
            semitones,
            stretcher,
        }
    }

    pub fn semitones(&self) -> f64 {
        self.semitones
    }
}

impl Transform for PitchShifter {
    fn name(&self) -> &'static str {
        "pitch_shift"
    }

    fn apply(&self, buffer: &SampleBuffer) -> Result<SampleBuffer> {
        let factor = shift_factor(self.semitones, buffer.sample_rate())?;

        let channels = buffer
            .channels()
            .iter()
            .map(|channel| {
                let shifted = resample(channel, factor);
                self.stretcher.stretch_to_length(&shifted, channel.len())
            })
            .collect();

        SampleBuffer::new(channels, buffer.sample_rate())
    }
}

/// Pitch shift whose output runs `stretch_ratio` times as long as the input
/// (the baby voice: higher and faster)
#[derive(Debug, Clone)]
pub struct PitchShiftCompressor {
    semitones: f64,
    stretch_ratio: f64,
    stretcher: TimeStretcher,
}

impl PitchShiftCompressor {
    pub fn new(semitones: f64, stretch_ratio: f64, stretcher: TimeStretcher) -> Self {
        Self {
            semitones,
            stretch_ratio,
            stretcher,
        }
    }

    /// Output length for an input of `input_len` samples
    pub fn target_len(&self, input_len: usize) -> usize {
        (input_len as f64 * self.stretch_ratio).round() as usize
    }
}

impl Transform for PitchShiftCompressor {
    fn name(&self) -> &'static str {
        "pitch_shift_compress"
    }

    fn apply(&self, buffer: &SampleBuffer) -> Result<SampleBuffer> {
        let factor = shift_factor(self.semitones, buffer.sample_rate())?;
        let target = self.target_len(buffer.num_frames());
        if target == 0 {
            return Err(VoxError::InvalidParameters {
                reason: format!(
                    "stretch ratio {} leaves no samples of a {}-sample input",
                    self.stretch_ratio,
                    buffer.num_frames()
                ),
            });
        }

        let channels = buffer
            .channels()
            .iter()
            .map(|channel| {
                let shifted = resample(channel, factor);
                // Resampling alone may already land on the target duration
                if shifted.len() == target {
                    shifted
                } else {
                    self.stretcher.stretch_to_length(&shifted, target)
                }
            })
            .collect();

        SampleBuffer::new(channels, buffer.sample_rate())
    }
}
